//! Character-level fence scanner.
//!
//! Consumes chunks in arrival order and classifies every character as
//! plain text, part of a fence, part of an opening language tag, or block
//! content. Backtick runs are grouped greedily in windows of exactly three:
//! four backticks are one fence followed by a fresh pending backtick.
//!
//! The block opens as soon as the third backtick arrives. Letters that
//! follow extend the language tag, even when they arrive in a later chunk,
//! so a preview taken mid-tag shows a partial label while the closed block
//! is the same for every chunking. A single newline right after the tag is
//! consumed.

use serde::{Deserialize, Serialize};

use super::block::Closure;

const BACKTICK: char = '`';

/// Scanner state. Exactly one holds at any time.
///
/// The open block's language and content live in the accumulator; the
/// scanner only tracks whether the tag is still being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    /// Outside any fence or block.
    #[default]
    Plain,
    /// Outside a block, the last 1 or 2 characters were backticks.
    PendingFence(u8),
    /// Inside an open block.
    InBlock {
        /// Letters still extend the language tag.
        reading_tag: bool,
    },
    /// Inside a block, the last 1 or 2 characters were backticks.
    InBlockPendingFence(u8),
}

impl ScanState {
    pub fn in_block(self) -> bool {
        matches!(
            self,
            ScanState::InBlock { .. } | ScanState::InBlockPendingFence(_)
        )
    }
}

/// Output of the scanner, in strict input order.
///
/// Adjacent events of the same kind produced by one `feed` call are
/// coalesced (text runs, language fragments).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// Plain-text delta for the message draft.
    Text(String),
    /// A fence opened a new block.
    BlockOpened {
        sequence: u64,
        language: Option<String>,
    },
    /// More letters of the opening language tag arrived.
    LanguageExtended { sequence: u64, fragment: String },
    /// Text appended to the open block.
    BlockAppended { sequence: u64, text: String },
    /// The open block was sealed.
    BlockClosed { sequence: u64, closure: Closure },
    /// The open block was dropped at end of stream.
    BlockDiscarded { sequence: u64 },
}

/// What to do with 1–2 unresolved backticks when the stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingBackticks {
    /// Emit them as text (or block content).
    #[default]
    Flush,
    /// Drop them silently.
    Drop,
}

/// What to do with a block still open when the stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnterminatedBlocks {
    /// Seal it with whatever content accumulated.
    #[default]
    Seal,
    /// Drop it from the collection.
    Discard,
}

/// End-of-stream policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EndOfStreamPolicy {
    pub trailing_backticks: TrailingBackticks,
    pub unterminated_blocks: UnterminatedBlocks,
}

/// Fence scanner for one conversation. Sequence numbers keep increasing
/// across streams.
#[derive(Debug, Clone)]
pub struct Scanner {
    state: ScanState,
    next_sequence: u64,
    open_sequence: Option<u64>,
    /// Index in the caller's buffer where the current call's events begin.
    batch_start: usize,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates a scanner whose first block gets `first_sequence`.
    pub fn starting_at(first_sequence: u64) -> Self {
        Self {
            state: ScanState::Plain,
            next_sequence: first_sequence,
            open_sequence: None,
            batch_start: 0,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Sequence number the next opened block will get.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Processes one chunk, appending the resulting events.
    ///
    /// Events already in `events` are left untouched; coalescing only
    /// merges events produced by this call.
    pub fn feed(&mut self, chunk: &str, events: &mut Vec<ScanEvent>) {
        self.batch_start = events.len();
        for ch in chunk.chars() {
            self.process_char(ch, events);
        }
    }

    /// Resolves whatever is pending at end of stream and returns to `Plain`.
    pub fn finish(&mut self, policy: EndOfStreamPolicy, events: &mut Vec<ScanEvent>) {
        self.batch_start = events.len();
        let flush = policy.trailing_backticks == TrailingBackticks::Flush;
        match self.state {
            ScanState::Plain => {}
            ScanState::PendingFence(n) => {
                if flush {
                    self.push_text(events, backticks(n));
                }
            }
            ScanState::InBlock { .. } => self.close_unterminated(policy, events),
            ScanState::InBlockPendingFence(n) => {
                if flush {
                    self.append(events, backticks(n));
                }
                self.close_unterminated(policy, events);
            }
        }
        self.state = ScanState::Plain;
    }

    fn process_char(&mut self, ch: char, events: &mut Vec<ScanEvent>) {
        match self.state {
            ScanState::Plain => {
                if ch == BACKTICK {
                    self.state = ScanState::PendingFence(1);
                } else {
                    self.push_text(events, ch.encode_utf8(&mut [0; 4]));
                }
            }
            ScanState::PendingFence(n) => {
                if ch != BACKTICK {
                    self.push_text(events, backticks(n));
                    self.push_text(events, ch.encode_utf8(&mut [0; 4]));
                    self.state = ScanState::Plain;
                } else if n < 2 {
                    self.state = ScanState::PendingFence(n + 1);
                } else {
                    self.open_block(events);
                }
            }
            ScanState::InBlock { reading_tag: true } => {
                if ch.is_ascii_alphabetic() {
                    self.extend_language(events, ch);
                    return;
                }
                self.state = ScanState::InBlock { reading_tag: false };
                if ch != '\n' {
                    self.process_char(ch, events);
                }
            }
            ScanState::InBlock { reading_tag: false } => {
                if ch == BACKTICK {
                    self.state = ScanState::InBlockPendingFence(1);
                } else {
                    self.append(events, ch.encode_utf8(&mut [0; 4]));
                }
            }
            ScanState::InBlockPendingFence(n) => {
                if ch != BACKTICK {
                    self.append(events, backticks(n));
                    self.append(events, ch.encode_utf8(&mut [0; 4]));
                    self.state = ScanState::InBlock { reading_tag: false };
                } else if n < 2 {
                    self.state = ScanState::InBlockPendingFence(n + 1);
                } else {
                    self.close(events, Closure::Fence);
                    self.state = ScanState::Plain;
                }
            }
        }
    }

    fn open_block(&mut self, events: &mut Vec<ScanEvent>) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.open_sequence = Some(sequence);
        events.push(ScanEvent::BlockOpened {
            sequence,
            language: None,
        });
        self.state = ScanState::InBlock { reading_tag: true };
    }

    fn extend_language(&self, events: &mut Vec<ScanEvent>, ch: char) {
        let Some(sequence) = self.open_sequence else {
            return;
        };
        match events[self.batch_start..].last_mut() {
            Some(ScanEvent::BlockOpened {
                sequence: open,
                language,
            }) if *open == sequence => {
                language.get_or_insert_with(String::new).push(ch);
            }
            Some(ScanEvent::LanguageExtended {
                sequence: open,
                fragment,
            }) if *open == sequence => fragment.push(ch),
            _ => events.push(ScanEvent::LanguageExtended {
                sequence,
                fragment: ch.to_string(),
            }),
        }
    }

    fn append(&self, events: &mut Vec<ScanEvent>, text: &str) {
        let Some(sequence) = self.open_sequence else {
            return;
        };
        match events[self.batch_start..].last_mut() {
            Some(ScanEvent::BlockAppended {
                sequence: open,
                text: run,
            }) if *open == sequence => run.push_str(text),
            _ => events.push(ScanEvent::BlockAppended {
                sequence,
                text: text.to_string(),
            }),
        }
    }

    fn push_text(&self, events: &mut Vec<ScanEvent>, text: &str) {
        if let Some(ScanEvent::Text(run)) = events[self.batch_start..].last_mut() {
            run.push_str(text);
        } else {
            events.push(ScanEvent::Text(text.to_string()));
        }
    }

    fn close(&mut self, events: &mut Vec<ScanEvent>, closure: Closure) {
        if let Some(sequence) = self.open_sequence.take() {
            events.push(ScanEvent::BlockClosed { sequence, closure });
        }
    }

    fn close_unterminated(&mut self, policy: EndOfStreamPolicy, events: &mut Vec<ScanEvent>) {
        match policy.unterminated_blocks {
            UnterminatedBlocks::Seal => self.close(events, Closure::EndOfStream),
            UnterminatedBlocks::Discard => {
                if let Some(sequence) = self.open_sequence.take() {
                    events.push(ScanEvent::BlockDiscarded { sequence });
                }
            }
        }
    }
}

fn backticks(n: u8) -> &'static str {
    if n >= 2 { "``" } else { "`" }
}
