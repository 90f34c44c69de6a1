//! Chunk sources.
//!
//! A chunk stream yields text chunks in order; `None` is end of stream and
//! an `Err` item is an upstream failure. Byte sources are decoded as UTF-8
//! incrementally so a character split across reads is never corrupted.

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use super::error::UpstreamError;

/// Ordered text chunks from the upstream producer.
pub type ChunkStream = BoxStream<'static, Result<String, UpstreamError>>;

/// Default read buffer for byte sources.
pub const DEFAULT_READ_BUFFER_BYTES: usize = 4096;

/// Stream over an in-memory list of chunks.
pub fn chunks_from_iter<I, S>(chunks: I) -> ChunkStream
where
    I: IntoIterator<Item = S>,
    I::IntoIter: Send + 'static,
    S: Into<String> + 'static,
{
    stream::iter(chunks.into_iter().map(|chunk| Ok(chunk.into()))).boxed()
}

/// Stream over a byte source, one chunk per successful read.
///
/// Reads that end inside a multi-byte character hold the partial bytes
/// back until the next read. Invalid bytes become U+FFFD. A read error is
/// yielded once and ends the stream.
pub fn chunks_from_reader<R>(reader: R, read_buffer_bytes: usize) -> ChunkStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let bytes = ReaderStream::with_capacity(reader, read_buffer_bytes.max(1));
    stream::unfold(
        Some((bytes, Utf8ChunkDecoder::new())),
        |state| async move {
            let Some((mut bytes, mut decoder)) = state else {
                return None;
            };
            loop {
                match bytes.next().await {
                    Some(Ok(buf)) => {
                        let text = decoder.decode(&buf);
                        if !text.is_empty() {
                            return Some((Ok(text), Some((bytes, decoder))));
                        }
                    }
                    Some(Err(err)) => return Some((Err(UpstreamError::io(&err)), None)),
                    None => {
                        let tail = decoder.finish();
                        return (!tail.is_empty()).then_some((Ok(tail), None));
                    }
                }
            }
        },
    )
    .boxed()
}

/// Re-splits every chunk into pieces of at most `max_chars` characters.
///
/// Useful for replaying a file as if it arrived token by token. Errors
/// pass through unchanged.
pub fn rechunk(chunks: ChunkStream, max_chars: usize) -> ChunkStream {
    let max_chars = max_chars.max(1);
    chunks
        .flat_map(move |item| {
            let pieces: Vec<Result<String, UpstreamError>> = match item {
                Ok(text) => split_chars(&text, max_chars).into_iter().map(Ok).collect(),
                Err(err) => vec![Err(err)],
            };
            stream::iter(pieces)
        })
        .boxed()
}

fn split_chars(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == max_chars {
            pieces.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Incremental UTF-8 decoder.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes as much of `pending + bytes` as possible.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                        // Incomplete character at the end; wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    /// Flushes bytes held back at end of input.
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}
