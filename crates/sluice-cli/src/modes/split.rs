//! Streamed rendering of split updates.
//!
//! # Output contract
//! - `text`: prose → stdout as it arrives; each block → stdout once it
//!   closes, framed by header and footer lines; stream problems → stderr
//! - `jsonl`: every update → stdout as one JSON object per line

use std::io::{Stderr, Stdout, Write, stderr, stdout};

use sluice_core::core::block::Block;
use sluice_core::core::events::{StreamUpdate, Termination};
use sluice_core::core::pipeline::UpdateRx;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Prose as it streams, blocks framed on close
    #[default]
    Text,
    /// One JSON update per line
    Jsonl,
}

/// Renderer that writes split updates to an output and an error stream.
pub struct SplitRenderer<O: Write, E: Write> {
    out: O,
    err: E,
    format: OutputFormat,
    /// Whether prose output ended without a newline.
    needs_newline: bool,
}

impl SplitRenderer<Stdout, Stderr> {
    pub fn stdio(format: OutputFormat) -> Self {
        Self::new(format, stdout(), stderr())
    }
}

impl<O: Write, E: Write> SplitRenderer<O, E> {
    pub fn new(format: OutputFormat, out: O, err: E) -> Self {
        Self {
            out,
            err,
            format,
            needs_newline: false,
        }
    }

    pub fn handle_update(&mut self, update: &StreamUpdate) {
        match self.format {
            OutputFormat::Jsonl => self.write_json(update),
            OutputFormat::Text => self.write_text(update),
        }
    }

    fn write_json(&mut self, update: &StreamUpdate) {
        match serde_json::to_string(update) {
            Ok(line) => {
                let _ = writeln!(self.out, "{line}");
                let _ = self.out.flush();
            }
            Err(e) => {
                let _ = writeln!(self.err, "Error: failed to encode update: {e}");
            }
        }
    }

    fn write_text(&mut self, update: &StreamUpdate) {
        match update {
            StreamUpdate::DraftDelta { text } => {
                if !text.is_empty() {
                    let _ = write!(self.out, "{text}");
                    let _ = self.out.flush();
                    self.needs_newline = !text.ends_with('\n');
                }
            }
            StreamUpdate::BlockClosed { block } => self.write_block(block),
            StreamUpdate::BlockDiscarded { sequence } => {
                let _ = writeln!(
                    self.err,
                    "Warning: block {sequence} had no closing fence and was discarded"
                );
            }
            StreamUpdate::StreamFinished { termination, .. } => {
                self.finish_line();
                match termination {
                    Termination::Completed => {}
                    Termination::Cancelled => {
                        let _ = writeln!(self.err, "^C Interrupted.");
                    }
                    Termination::Upstream { error } => {
                        let _ = writeln!(self.err, "Error [{}]: {}", error.kind, error.message);
                    }
                }
            }
            // Live block progress is only visible in jsonl mode.
            StreamUpdate::StreamStarted { .. }
            | StreamUpdate::BlockOpened { .. }
            | StreamUpdate::BlockLanguage { .. }
            | StreamUpdate::BlockDelta { .. } => {}
        }
    }

    fn write_block(&mut self, block: &Block) {
        self.finish_line();
        let mut header = format!("--- block {}", block.sequence());
        if let Some(language) = block.language() {
            header.push_str(&format!(" [{language}]"));
        }
        if block.is_unterminated() {
            header.push_str(" (unterminated)");
        }
        let _ = writeln!(self.out, "{header} ---");
        let body = block.body();
        let _ = write!(self.out, "{body}");
        if !body.is_empty() && !body.ends_with('\n') {
            let _ = writeln!(self.out);
        }
        let _ = writeln!(self.out, "--- end block {} ---", block.sequence());
        let _ = self.out.flush();
    }

    fn finish_line(&mut self) {
        if self.needs_newline {
            let _ = writeln!(self.out);
            let _ = self.out.flush();
            self.needs_newline = false;
        }
    }

    /// Ends a dangling prose line.
    pub fn finish(&mut self) {
        self.finish_line();
    }
}

/// Spawns a renderer task that consumes updates until the channel closes.
pub fn spawn_split_renderer_task(mut rx: UpdateRx, format: OutputFormat) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut renderer = SplitRenderer::stdio(format);

        while let Some(update) = rx.recv().await {
            renderer.handle_update(&update);
        }

        renderer.finish();
    })
}

#[cfg(test)]
mod tests {
    use sluice_core::core::conversation::Conversation;
    use sluice_core::core::error::UpstreamError;
    use sluice_core::core::scanner::EndOfStreamPolicy;

    use super::*;

    fn render(format: OutputFormat, chunks: &[&str], termination: Termination) -> (String, String) {
        let mut conversation = Conversation::with_id("test");
        let mut handle = conversation
            .begin_stream(EndOfStreamPolicy::default())
            .unwrap();
        let mut renderer = SplitRenderer::new(format, Vec::new(), Vec::new());
        for chunk in chunks {
            handle.feed(chunk).unwrap();
            for update in handle.drain_updates() {
                renderer.handle_update(&update);
            }
        }
        let outcome = conversation.finish_stream(handle, termination).unwrap();
        for update in &outcome.updates {
            renderer.handle_update(update);
        }
        renderer.finish();
        let SplitRenderer { out, err, .. } = renderer;
        (
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn test_text_mode_frames_closed_blocks() {
        let (out, err) = render(
            OutputFormat::Text,
            &["Try this:\n```py", "thon\nprint(1)\n```", "\nDone."],
            Termination::Completed,
        );
        assert_eq!(
            out,
            "Try this:\n--- block 1 [python] ---\nprint(1)\n--- end block 1 ---\n\nDone.\n"
        );
        assert!(err.is_empty());
    }

    #[test]
    fn test_text_mode_marks_unterminated_block() {
        let (out, _) = render(
            OutputFormat::Text,
            &["x ```sh\nls"],
            Termination::Completed,
        );
        assert!(out.contains("--- block 1 [sh] (unterminated) ---\nls\n"));
    }

    #[test]
    fn test_text_mode_reports_interruption_on_stderr() {
        let (_, err) = render(OutputFormat::Text, &["partial"], Termination::Cancelled);
        assert_eq!(err, "^C Interrupted.\n");

        let (_, err) = render(
            OutputFormat::Text,
            &["partial"],
            Termination::Upstream {
                error: UpstreamError::source("reset"),
            },
        );
        assert_eq!(err, "Error [source]: reset\n");
    }

    #[test]
    fn test_jsonl_mode_emits_one_object_per_line() {
        let (out, _) = render(OutputFormat::Jsonl, &["a```\nb```"], Termination::Completed);
        let types: Vec<String> = out
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["type"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(
            types,
            vec![
                "stream_started",
                "draft_delta",
                "block_opened",
                "block_delta",
                "block_closed",
                "stream_finished",
            ]
        );
    }
}
