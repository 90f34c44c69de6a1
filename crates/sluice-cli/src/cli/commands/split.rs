//! Split command handler.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use sluice_core::config::Config;
use sluice_core::core::conversation::Conversation;
use sluice_core::core::events::Termination;
use sluice_core::core::input::{self, ChunkStream};
use sluice_core::core::interrupt::{self, InterruptedError};
use sluice_core::core::pipeline::{self, UpdateSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::modes::split::{OutputFormat, spawn_split_renderer_task};

pub struct SplitRunOptions<'a> {
    pub file: Option<&'a Path>,
    pub chunk_size: Option<usize>,
    pub format: OutputFormat,
    pub prompt: Option<&'a str>,
    pub config: &'a Config,
}

pub async fn run(options: SplitRunOptions<'_>) -> Result<()> {
    let stream_config = &options.config.stream;
    let chunks = open_chunks(
        options.file,
        options.chunk_size,
        stream_config.read_buffer_bytes,
    )
    .await?;

    let mut conversation = Conversation::new();
    if let Some(prompt) = options.prompt {
        conversation.push_user(prompt).context("record prompt")?;
    }

    let (tx, rx) = pipeline::create_update_channel(stream_config.update_channel_capacity);
    let renderer = spawn_split_renderer_task(rx, options.format);
    let sender = UpdateSender::new(tx);

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(interrupt::cancel_on_interrupt(cancel.clone()));

    let result = pipeline::run_stream(
        &mut conversation,
        chunks,
        Some(&sender),
        &cancel,
        &stream_config.pipeline_options(),
    )
    .await;

    // Stop the watcher and let the renderer drain before reporting.
    cancel.cancel();
    let watcher_joined = join_task(watcher, "interrupt watcher").await;
    drop(sender);
    let renderer_joined = join_task(renderer, "renderer").await;

    let outcome = result.context("split stream")?;
    renderer_joined?;
    watcher_joined?;
    debug!(
        conversation = conversation.id(),
        log_entries = conversation.log().len(),
        blocks = conversation.blocks().len(),
        "split finished"
    );

    match outcome.termination {
        Termination::Completed => Ok(()),
        Termination::Cancelled => Err(InterruptedError.into()),
        Termination::Upstream { error } => Err(anyhow!(error).context("read input")),
    }
}

async fn open_chunks(
    file: Option<&Path>,
    chunk_size: Option<usize>,
    read_buffer_bytes: usize,
) -> Result<ChunkStream> {
    let chunks = match file {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("open {}", path.display()))?;
            input::chunks_from_reader(file, read_buffer_bytes)
        }
        None => input::chunks_from_reader(tokio::io::stdin(), read_buffer_bytes),
    };

    Ok(match chunk_size {
        Some(size) => input::rechunk(chunks, size),
        None => chunks,
    })
}

/// Waits for a helper task; a panic or abort becomes an error.
async fn join_task(task: JoinHandle<()>, name: &str) -> Result<()> {
    task.await.with_context(|| format!("{name} task"))
}
