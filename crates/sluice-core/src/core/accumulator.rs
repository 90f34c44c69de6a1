//! Owner of the single open block.
//!
//! The accumulator applies scanner events to the live block and moves it
//! into the block collection when it closes. Every mutation is visible
//! through [`BlockAccumulator::live`] immediately; nothing is buffered.

use tracing::debug;

use super::block::{Block, BlockCollection, Closure};
use super::error::StreamError;

#[derive(Debug, Default, Clone)]
pub struct BlockAccumulator {
    live: Option<Block>,
    last_sequence: Option<u64>,
}

impl BlockAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an accumulator that only accepts sequences above `last_sequence`.
    pub fn after(last_sequence: Option<u64>) -> Self {
        Self {
            live: None,
            last_sequence,
        }
    }

    /// The block currently accumulating, if any.
    pub fn live(&self) -> Option<&Block> {
        self.live.as_ref()
    }

    pub fn open(&mut self, sequence: u64, language: Option<String>) -> Result<&Block, StreamError> {
        if let Some(live) = &self.live {
            return Err(StreamError::ordering(format!(
                "block {sequence} opened while block {} is still open",
                live.sequence()
            )));
        }
        if let Some(last) = self.last_sequence
            && sequence <= last
        {
            return Err(StreamError::ordering(format!(
                "block {sequence} opened after block {last}"
            )));
        }
        debug!(sequence, language = ?language, "block opened");
        self.last_sequence = Some(sequence);
        Ok(self.live.insert(Block::open(sequence, language)))
    }

    pub fn extend_language(&mut self, sequence: u64, fragment: &str) -> Result<&Block, StreamError> {
        let live = self.live_mut(sequence, "language extended")?;
        live.push_language(fragment)?;
        Ok(live)
    }

    pub fn append(&mut self, sequence: u64, text: &str) -> Result<&Block, StreamError> {
        let live = self.live_mut(sequence, "append")?;
        live.push_content(text)?;
        Ok(live)
    }

    /// Seals the live block and moves it into `blocks`.
    pub fn close<'a>(
        &mut self,
        sequence: u64,
        closure: Closure,
        blocks: &'a mut BlockCollection,
    ) -> Result<&'a Block, StreamError> {
        self.live_mut(sequence, "close")?;
        let Some(live) = self.live.take() else {
            return Err(StreamError::ordering(format!(
                "close of block {sequence} with no live block"
            )));
        };
        let sealed = live.seal(closure);
        debug!(
            sequence,
            closure = ?closure,
            bytes = sealed.content().len(),
            "block closed"
        );
        blocks.push(sealed)
    }

    /// Drops the live block without adding it to any collection.
    pub fn discard(&mut self, sequence: u64) -> Result<Block, StreamError> {
        self.live_mut(sequence, "discard")?;
        self.live.take().ok_or_else(|| {
            StreamError::ordering(format!("discard of block {sequence} with no live block"))
        })
    }

    fn live_mut(&mut self, sequence: u64, action: &str) -> Result<&mut Block, StreamError> {
        match self.live.as_mut() {
            None => Err(StreamError::ordering(format!(
                "{action} for block {sequence} with no live block"
            ))),
            Some(live) if live.sequence() != sequence => Err(StreamError::ordering(format!(
                "{action} for block {sequence} but block {} is live",
                live.sequence()
            ))),
            Some(live) => Ok(live),
        }
    }
}
