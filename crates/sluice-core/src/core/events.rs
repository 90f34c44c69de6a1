//! Presentation updates emitted while a stream is split.
//!
//! Updates are serializable so the CLI can print them as JSON lines. They
//! arrive in strict input order; replaying them reproduces the draft and
//! the live block exactly.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::block::{Block, BlockCollection};
use super::error::{StreamError, UpstreamError};

/// Updates emitted by the stream assembler and the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamUpdate {
    /// A stream has started on a conversation.
    StreamStarted {
        conversation_id: String,
        stream_id: u64,
    },

    /// Plain text appended to the message draft.
    DraftDelta { text: String },

    /// A fence opened a new live block.
    BlockOpened {
        sequence: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },

    /// The live block's language tag grew. Carries the full tag so far.
    BlockLanguage { sequence: u64, language: String },

    /// Text appended to the live block.
    BlockDelta { sequence: u64, text: String },

    /// The live block was sealed and added to the collection.
    BlockClosed { block: Block },

    /// The live block was dropped at end of stream.
    BlockDiscarded { sequence: u64 },

    /// The stream was finalized.
    StreamFinished {
        /// Final message text.
        text: String,
        /// Blocks closed during this stream, in open order.
        blocks: Vec<Block>,
        termination: Termination,
    },
}

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
    /// The source signalled end of stream.
    Completed,
    /// The consumer cancelled the stream.
    Cancelled,
    /// The source failed or stalled.
    Upstream { error: UpstreamError },
}

impl Termination {
    /// True when the stream reached its natural end.
    pub fn is_clean(&self) -> bool {
        matches!(self, Termination::Completed)
    }

    /// Human-readable reason for an interrupted stream.
    pub fn reason(&self) -> Option<String> {
        match self {
            Termination::Completed => None,
            Termination::Cancelled => Some("cancelled".to_string()),
            Termination::Upstream { error } => Some(format!("upstream failure: {error}")),
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{reason}"),
            None => write!(f, "completed"),
        }
    }
}

/// Presentation state rebuilt purely from updates.
///
/// Consumers on the far side of the update channel use this to mirror the
/// draft, the live block, and the closed blocks without touching the
/// assembler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveView {
    draft: String,
    live: Option<Block>,
    blocks: BlockCollection,
}

impl LiveView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn live(&self) -> Option<&Block> {
        self.live.as_ref()
    }

    pub fn blocks(&self) -> &BlockCollection {
        &self.blocks
    }

    /// Applies one update.
    ///
    /// # Errors
    /// Returns an ordering violation when the update does not fit the
    /// current view (for example a delta for a block that is not live).
    pub fn apply(&mut self, update: &StreamUpdate) -> Result<(), StreamError> {
        match update {
            StreamUpdate::StreamStarted { .. } => {
                self.draft.clear();
                self.live = None;
            }
            StreamUpdate::DraftDelta { text } => self.draft.push_str(text),
            StreamUpdate::BlockOpened { sequence, language } => {
                if let Some(live) = &self.live {
                    return Err(StreamError::ordering(format!(
                        "view opened block {sequence} while block {} is live",
                        live.sequence()
                    )));
                }
                self.live = Some(Block::open(*sequence, language.clone()));
            }
            StreamUpdate::BlockLanguage { sequence, language } => {
                let live = self.live_mut(*sequence)?;
                let known = live.language().unwrap_or_default();
                let Some(fragment) = language.strip_prefix(known) else {
                    return Err(StreamError::ordering(format!(
                        "language of block {sequence} changed from {known:?} to {language:?}"
                    )));
                };
                let fragment = fragment.to_string();
                live.push_language(&fragment)?;
            }
            StreamUpdate::BlockDelta { sequence, text } => {
                self.live_mut(*sequence)?.push_content(text)?;
            }
            StreamUpdate::BlockClosed { block } => {
                self.live_mut(block.sequence())?;
                self.live = None;
                self.blocks.push(block.clone())?;
            }
            StreamUpdate::BlockDiscarded { sequence } => {
                self.live_mut(*sequence)?;
                self.live = None;
            }
            StreamUpdate::StreamFinished { .. } => {}
        }
        Ok(())
    }

    fn live_mut(&mut self, sequence: u64) -> Result<&mut Block, StreamError> {
        match self.live.as_mut() {
            Some(live) if live.sequence() == sequence => Ok(live),
            _ => Err(StreamError::ordering(format!(
                "view has no live block {sequence}"
            ))),
        }
    }
}
