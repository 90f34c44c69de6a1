//! Core module: UI-agnostic stream splitting domain and runtime.
//!
//! This module contains:
//! - `scanner`: Character-level fence state machine
//! - `block`: Block and ordered block collection types
//! - `accumulator`: Owner of the currently open (live) block
//! - `assembler`: Draft/block assembly for a single stream
//! - `conversation`: Append-only message log and stream ownership
//! - `events`: Presentation updates and the replayable live view
//! - `error`: Stream and upstream error types
//! - `input`: Chunk stream adapters (in-memory, `AsyncRead`)
//! - `pipeline`: Async driver tying a chunk stream to a conversation
//! - `interrupt`: Signal handling for graceful interruption

pub mod accumulator;
pub mod assembler;
pub mod block;
pub mod conversation;
pub mod error;
pub mod events;
pub mod input;
pub mod interrupt;
pub mod pipeline;
pub mod scanner;
