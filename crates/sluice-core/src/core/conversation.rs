//! Conversations: the ordered message log plus one stream at a time.
//!
//! A conversation hands out a [`StreamHandle`] for each assistant stream.
//! Only one handle may be active; finishing it appends the assistant
//! message (and an `interrupted` entry when the stream did not end
//! cleanly) to the log and merges its blocks into the conversation's
//! block collection.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::assembler::StreamAssembler;
use super::block::{Block, BlockCollection};
use super::error::StreamError;
use super::events::{StreamUpdate, Termination};
use super::scanner::{EndOfStreamPolicy, ScanState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One record of the message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEntry {
    Message {
        role: Role,
        text: String,
        /// RFC 3339 timestamp
        ts: String,
    },
    /// The preceding assistant message was cut short.
    Interrupted { reason: String, ts: String },
}

impl LogEntry {
    pub fn message(role: Role, text: impl Into<String>) -> Self {
        LogEntry::Message {
            role,
            text: text.into(),
            ts: now(),
        }
    }

    pub fn interrupted(reason: impl Into<String>) -> Self {
        LogEntry::Interrupted {
            reason: reason.into(),
            ts: now(),
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            LogEntry::Message { role, .. } => Some(*role),
            LogEntry::Interrupted { .. } => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            LogEntry::Message { text, .. } => Some(text),
            LogEntry::Interrupted { .. } => None,
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Append-only ordered message log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageLog {
    entries: Vec<LogEntry>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug)]
pub struct Conversation {
    id: String,
    log: MessageLog,
    blocks: BlockCollection,
    next_sequence: u64,
    active_stream: Option<u64>,
    streams_started: u64,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            log: MessageLog::new(),
            blocks: BlockCollection::new(),
            next_sequence: 1,
            active_stream: None,
            streams_started: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Every block closed on this conversation, in open order.
    pub fn blocks(&self) -> &BlockCollection {
        &self.blocks
    }

    pub fn is_streaming(&self) -> bool {
        self.active_stream.is_some()
    }

    /// Records a user message.
    ///
    /// # Errors
    /// Returns an ordering violation while an assistant stream is active.
    pub fn push_user(&mut self, text: impl Into<String>) -> Result<(), StreamError> {
        if let Some(stream_id) = self.active_stream {
            return Err(StreamError::ordering(format!(
                "user message while stream {stream_id} is active"
            )));
        }
        self.log.append(LogEntry::message(Role::User, text));
        Ok(())
    }

    /// Starts a new assistant stream.
    ///
    /// # Errors
    /// Returns an ordering violation if the previous stream has not been
    /// finished.
    pub fn begin_stream(&mut self, policy: EndOfStreamPolicy) -> Result<StreamHandle, StreamError> {
        if let Some(stream_id) = self.active_stream {
            return Err(StreamError::ordering(format!(
                "stream started while stream {stream_id} has not finalized"
            )));
        }
        self.streams_started += 1;
        let stream_id = self.streams_started;
        self.active_stream = Some(stream_id);
        info!(conversation = %self.id, stream_id, "stream started");

        let mut handle = StreamHandle {
            conversation_id: self.id.clone(),
            stream_id,
            assembler: StreamAssembler::with_first_sequence(self.next_sequence, policy),
            started: Vec::new(),
        };
        handle.started.push(StreamUpdate::StreamStarted {
            conversation_id: self.id.clone(),
            stream_id,
        });
        Ok(handle)
    }

    /// Finalizes a stream: resolves pending scanner state, appends the
    /// assistant message to the log and merges closed blocks.
    ///
    /// # Errors
    /// Returns an ordering violation if `handle` does not belong to the
    /// active stream of this conversation.
    pub fn finish_stream(
        &mut self,
        mut handle: StreamHandle,
        termination: Termination,
    ) -> Result<StreamOutcome, StreamError> {
        if handle.conversation_id != self.id || self.active_stream != Some(handle.stream_id) {
            return Err(StreamError::ordering(format!(
                "stream {} is not the active stream of conversation {}",
                handle.stream_id, self.id
            )));
        }

        let finished = handle.assembler.finish()?;
        for block in &finished.blocks {
            self.blocks.push(block.clone())?;
        }
        self.next_sequence = finished.next_sequence;
        self.active_stream = None;

        self.log
            .append(LogEntry::message(Role::Assistant, finished.text.clone()));
        if let Some(reason) = termination.reason() {
            warn!(conversation = %self.id, stream_id = handle.stream_id, %reason, "stream interrupted");
            self.log.append(LogEntry::interrupted(reason));
        }
        info!(
            conversation = %self.id,
            stream_id = handle.stream_id,
            chars = finished.text.len(),
            blocks = finished.blocks.len(),
            %termination,
            "stream finalized"
        );

        let mut updates = handle.drain_updates();
        updates.push(StreamUpdate::StreamFinished {
            text: finished.text.clone(),
            blocks: finished.blocks.clone(),
            termination: termination.clone(),
        });

        Ok(StreamOutcome {
            stream_id: handle.stream_id,
            text: finished.text,
            blocks: finished.blocks,
            termination,
            updates,
        })
    }
}

/// An active assistant stream on a conversation.
#[derive(Debug)]
pub struct StreamHandle {
    conversation_id: String,
    stream_id: u64,
    assembler: StreamAssembler,
    started: Vec<StreamUpdate>,
}

impl StreamHandle {
    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Feeds one chunk.
    ///
    /// # Errors
    /// Returns an ordering violation if internal state is inconsistent.
    pub fn feed(&mut self, chunk: &str) -> Result<(), StreamError> {
        self.assembler.feed(chunk)
    }

    pub fn draft(&self) -> &str {
        self.assembler.draft()
    }

    /// Blocks closed during this stream.
    pub fn blocks(&self) -> &BlockCollection {
        self.assembler.blocks()
    }

    pub fn live_block(&self) -> Option<&Block> {
        self.assembler.live_block()
    }

    pub fn scan_state(&self) -> ScanState {
        self.assembler.scan_state()
    }

    /// Takes queued updates, starting with `StreamStarted` on first drain.
    pub fn drain_updates(&mut self) -> Vec<StreamUpdate> {
        let mut updates = std::mem::take(&mut self.started);
        updates.extend(self.assembler.drain_updates());
        updates
    }
}

/// A finalized stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub stream_id: u64,
    pub text: String,
    pub blocks: Vec<Block>,
    pub termination: Termination,
    /// Updates produced by finalizing, ending with `StreamFinished`.
    pub updates: Vec<StreamUpdate>,
}
