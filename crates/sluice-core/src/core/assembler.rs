//! Stream assembler.
//!
//! Drives the scanner and the accumulator for one stream at a time, grows
//! the message draft, collects closed blocks, and queues a
//! [`StreamUpdate`] for every change. Work per chunk is proportional to the
//! chunk; nothing is rebuilt.

use tracing::{debug, warn};

use super::accumulator::BlockAccumulator;
use super::block::{Block, BlockCollection, Closure};
use super::error::StreamError;
use super::events::StreamUpdate;
use super::scanner::{EndOfStreamPolicy, ScanEvent, ScanState, Scanner};

/// Result of finalizing a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedStream {
    /// Immutable message text (plain text only).
    pub text: String,
    /// Blocks closed during the stream, in open order.
    pub blocks: Vec<Block>,
    /// Sequence the next stream's first block will get.
    pub next_sequence: u64,
}

#[derive(Debug)]
pub struct StreamAssembler {
    scanner: Scanner,
    accumulator: BlockAccumulator,
    draft: String,
    blocks: BlockCollection,
    policy: EndOfStreamPolicy,
    scan_events: Vec<ScanEvent>,
    updates: Vec<StreamUpdate>,
}

impl StreamAssembler {
    pub fn new(policy: EndOfStreamPolicy) -> Self {
        Self::with_first_sequence(1, policy)
    }

    /// Creates an assembler whose first block gets `first_sequence`.
    pub fn with_first_sequence(first_sequence: u64, policy: EndOfStreamPolicy) -> Self {
        Self {
            scanner: Scanner::starting_at(first_sequence),
            accumulator: BlockAccumulator::after(first_sequence.checked_sub(1)),
            draft: String::new(),
            blocks: BlockCollection::new(),
            policy,
            scan_events: Vec::new(),
            updates: Vec::new(),
        }
    }

    /// Feeds one chunk. Empty chunks are a no-op.
    ///
    /// # Errors
    /// Returns an ordering violation if the scanner and accumulator
    /// disagree, which never happens under correct use.
    pub fn feed(&mut self, chunk: &str) -> Result<(), StreamError> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.scanner.feed(chunk, &mut self.scan_events);
        self.apply_scanned()
    }

    /// Resolves pending state and hands back the finished text and blocks.
    ///
    /// The assembler is ready for the next stream afterwards; block
    /// sequences continue where this stream stopped.
    ///
    /// # Errors
    /// Returns an ordering violation from the final scanner events.
    pub fn finish(&mut self) -> Result<FinishedStream, StreamError> {
        self.scanner.finish(self.policy, &mut self.scan_events);
        self.apply_scanned()?;
        Ok(FinishedStream {
            text: std::mem::take(&mut self.draft),
            blocks: std::mem::take(&mut self.blocks).into_vec(),
            next_sequence: self.scanner.next_sequence(),
        })
    }

    /// Message draft so far.
    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Blocks closed during the current stream.
    pub fn blocks(&self) -> &BlockCollection {
        &self.blocks
    }

    pub fn live_block(&self) -> Option<&Block> {
        self.accumulator.live()
    }

    pub fn scan_state(&self) -> ScanState {
        self.scanner.state()
    }

    pub fn next_sequence(&self) -> u64 {
        self.scanner.next_sequence()
    }

    pub fn policy(&self) -> EndOfStreamPolicy {
        self.policy
    }

    /// Takes the updates queued since the last drain, in order.
    pub fn drain_updates(&mut self) -> Vec<StreamUpdate> {
        std::mem::take(&mut self.updates)
    }

    fn apply_scanned(&mut self) -> Result<(), StreamError> {
        let mut events = std::mem::take(&mut self.scan_events);
        let result = events.drain(..).try_for_each(|event| self.apply(event));
        self.scan_events = events;
        result
    }

    fn apply(&mut self, event: ScanEvent) -> Result<(), StreamError> {
        match event {
            ScanEvent::Text(text) => self.on_plain_delta(text),
            ScanEvent::BlockOpened { sequence, language } => {
                self.accumulator.open(sequence, language.clone())?;
                self.updates
                    .push(StreamUpdate::BlockOpened { sequence, language });
            }
            ScanEvent::LanguageExtended { sequence, fragment } => {
                let live = self.accumulator.extend_language(sequence, &fragment)?;
                let language = live.language().unwrap_or_default().to_string();
                self.updates
                    .push(StreamUpdate::BlockLanguage { sequence, language });
            }
            ScanEvent::BlockAppended { sequence, text } => {
                self.accumulator.append(sequence, &text)?;
                self.updates.push(StreamUpdate::BlockDelta { sequence, text });
            }
            ScanEvent::BlockClosed { sequence, closure } => {
                let block = self
                    .accumulator
                    .close(sequence, closure, &mut self.blocks)?
                    .clone();
                if closure == Closure::EndOfStream {
                    warn!(sequence, "block had no closing fence; sealed at end of stream");
                }
                self.on_block_closed(block);
            }
            ScanEvent::BlockDiscarded { sequence } => {
                let dropped = self.accumulator.discard(sequence)?;
                warn!(
                    sequence,
                    bytes = dropped.content().len(),
                    "block had no closing fence; discarded"
                );
                self.updates.push(StreamUpdate::BlockDiscarded { sequence });
            }
        }
        Ok(())
    }

    fn on_plain_delta(&mut self, text: String) {
        self.draft.push_str(&text);
        self.updates.push(StreamUpdate::DraftDelta { text });
    }

    fn on_block_closed(&mut self, block: Block) {
        debug!(
            sequence = block.sequence(),
            closed = self.blocks.len(),
            "block collection updated"
        );
        self.updates.push(StreamUpdate::BlockClosed { block });
    }
}
