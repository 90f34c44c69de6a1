//! Async pipeline: pulls chunks from a source, feeds a conversation's
//! stream, and publishes updates over a bounded channel.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::conversation::{Conversation, StreamOutcome};
use super::error::{StreamError, UpstreamError};
use super::events::{StreamUpdate, Termination};
use super::input::ChunkStream;
use super::scanner::EndOfStreamPolicy;

/// Channel-based update sender (async, bounded).
///
/// Updates are wrapped in `Arc` so fan-out consumers can share them.
pub type UpdateTx = mpsc::Sender<Arc<StreamUpdate>>;

/// Channel-based update receiver (async, bounded).
pub type UpdateRx = mpsc::Receiver<Arc<StreamUpdate>>;

/// Default channel capacity for update streams.
pub const DEFAULT_UPDATE_CHANNEL_CAPACITY: usize = 128;

/// Creates a bounded update channel. A capacity of 0 is raised to 1.
pub fn create_update_channel(capacity: usize) -> (UpdateTx, UpdateRx) {
    mpsc::channel(capacity.max(1))
}

/// Update sender wrapper.
///
/// Every send awaits delivery: dropping a delta would make the consumer's
/// view diverge from the assembler.
#[derive(Clone)]
pub struct UpdateSender {
    tx: UpdateTx,
}

impl UpdateSender {
    pub fn new(tx: UpdateTx) -> Self {
        Self { tx }
    }

    /// Sends one update. A closed receiver is ignored.
    pub async fn send(&self, update: StreamUpdate) {
        let _ = self.tx.send(Arc::new(update)).await;
    }
}

/// Knobs for [`run_stream`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Longest wait for the next chunk before the stream counts as failed.
    pub idle_timeout: Option<Duration>,
    pub policy: EndOfStreamPolicy,
}

/// Runs one assistant stream on `conversation` to completion.
///
/// The stream is always finalized, even when it is cancelled or the source
/// fails: the forced-close policy runs, the assistant message is appended
/// to the log, and a final `StreamFinished` update is published.
///
/// # Errors
/// Returns an ordering violation if a stream is already active on the
/// conversation or internal state is inconsistent. The pipeline stops
/// without finalizing in the latter case.
pub async fn run_stream(
    conversation: &mut Conversation,
    mut chunks: ChunkStream,
    sender: Option<&UpdateSender>,
    cancel: &CancellationToken,
    options: &PipelineOptions,
) -> Result<StreamOutcome, StreamError> {
    let mut handle = conversation.begin_stream(options.policy)?;

    let termination = loop {
        publish(sender, handle.drain_updates()).await;

        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(stream_id = handle.stream_id(), "stream cancelled");
                break Termination::Cancelled;
            }
            next = next_chunk(&mut chunks, options.idle_timeout) => next,
        };

        match next {
            Some(Ok(chunk)) => handle.feed(&chunk)?,
            Some(Err(error)) => {
                warn!(stream_id = handle.stream_id(), %error, "upstream failed");
                break Termination::Upstream { error };
            }
            None => break Termination::Completed,
        }
    };

    let outcome = conversation.finish_stream(handle, termination)?;
    publish(sender, outcome.updates.clone()).await;
    Ok(outcome)
}

async fn next_chunk(
    chunks: &mut ChunkStream,
    idle_timeout: Option<Duration>,
) -> Option<Result<String, UpstreamError>> {
    let Some(limit) = idle_timeout else {
        return chunks.next().await;
    };
    match tokio::time::timeout(limit, chunks.next()).await {
        Ok(next) => next,
        Err(_elapsed) => Some(Err(UpstreamError::timeout(limit))),
    }
}

async fn publish(sender: Option<&UpdateSender>, updates: Vec<StreamUpdate>) {
    let Some(sender) = sender else {
        return;
    };
    for update in updates {
        sender.send(update).await;
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::core::conversation::{LogEntry, Role};
    use crate::core::error::UpstreamErrorKind;
    use crate::core::events::LiveView;
    use crate::core::input::chunks_from_iter;

    fn spawn_collector(mut rx: UpdateRx) -> JoinHandle<Vec<StreamUpdate>> {
        tokio::spawn(async move {
            let mut received = Vec::new();
            while let Some(update) = rx.recv().await {
                received.push((*update).clone());
            }
            received
        })
    }

    #[tokio::test]
    async fn test_completed_stream_publishes_every_update() {
        let mut conversation = Conversation::with_id("c");
        let (tx, rx) = create_update_channel(2);
        let collector = spawn_collector(rx);
        let sender = UpdateSender::new(tx);

        let chunks = chunks_from_iter(["a``", "`python\nprint(1)", "``", "`b"]);
        let outcome = run_stream(
            &mut conversation,
            chunks,
            Some(&sender),
            &CancellationToken::new(),
            &PipelineOptions::default(),
        )
        .await
        .unwrap();
        drop(sender);
        let updates = collector.await.unwrap();

        assert_eq!(outcome.termination, Termination::Completed);
        assert_eq!(outcome.text, "ab");
        assert_eq!(outcome.blocks[0].body(), "print(1)");
        assert!(matches!(updates[0], StreamUpdate::StreamStarted { .. }));
        assert!(matches!(
            updates.last(),
            Some(StreamUpdate::StreamFinished { termination: Termination::Completed, .. })
        ));

        let mut view = LiveView::new();
        for update in &updates {
            view.apply(update).unwrap();
        }
        assert_eq!(view.draft(), "ab");
        assert_eq!(view.blocks(), conversation.blocks());
        assert!(view.live().is_none());
    }

    #[tokio::test]
    async fn test_upstream_error_finalizes_partial_output() {
        let mut conversation = Conversation::new();
        let chunks = stream::iter(vec![
            Ok("partial ```rs\nfn".to_string()),
            Err(UpstreamError::source("connection reset")),
            Ok("never seen".to_string()),
        ])
        .boxed();

        let outcome = run_stream(
            &mut conversation,
            chunks,
            None,
            &CancellationToken::new(),
            &PipelineOptions::default(),
        )
        .await
        .unwrap();

        assert!(matches!(
            &outcome.termination,
            Termination::Upstream { error } if error.kind == UpstreamErrorKind::Source
        ));
        assert_eq!(outcome.text, "partial ");
        assert!(outcome.blocks[0].is_unterminated());
        assert_eq!(outcome.blocks[0].body(), "fn");
        assert!(matches!(
            conversation.log().last(),
            Some(LogEntry::Interrupted { .. })
        ));
        assert!(!conversation.is_streaming());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_runs_forced_close() {
        let mut conversation = Conversation::new();
        let chunks = stream::iter(vec![Ok("text ```sh\nls".to_string())])
            .chain(stream::pending())
            .boxed();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = run_stream(
            &mut conversation,
            chunks,
            None,
            &cancel,
            &PipelineOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.termination, Termination::Cancelled);
        assert_eq!(outcome.text, "text ");
        assert_eq!(outcome.blocks[0].body(), "ls");
        let entries = conversation.log().entries();
        assert_eq!(entries[0].role(), Some(Role::Assistant));
        assert!(matches!(
            &entries[1],
            LogEntry::Interrupted { reason, .. } if reason == "cancelled"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_is_upstream_failure() {
        let mut conversation = Conversation::new();
        let chunks = stream::iter(vec![Ok("slow".to_string())])
            .chain(stream::pending())
            .boxed();
        let options = PipelineOptions {
            idle_timeout: Some(Duration::from_secs(5)),
            ..PipelineOptions::default()
        };

        let outcome = run_stream(
            &mut conversation,
            chunks,
            None,
            &CancellationToken::new(),
            &options,
        )
        .await
        .unwrap();

        assert!(matches!(
            &outcome.termination,
            Termination::Upstream { error } if error.kind == UpstreamErrorKind::Timeout
        ));
        assert_eq!(outcome.text, "slow");
    }

    #[tokio::test]
    async fn test_stream_on_busy_conversation_is_rejected() {
        let mut conversation = Conversation::new();
        let _active = conversation
            .begin_stream(EndOfStreamPolicy::default())
            .unwrap();
        let err = run_stream(
            &mut conversation,
            chunks_from_iter(["x"]),
            None,
            &CancellationToken::new(),
            &PipelineOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StreamError::OrderingViolation(_)));
    }

    #[test]
    fn test_zero_capacity_channel_is_raised() {
        let (tx, _rx) = create_update_channel(0);
        assert_eq!(tx.max_capacity(), 1);
    }
}
