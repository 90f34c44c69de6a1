//! Core sluice library (stream scanner, block accumulator, assembler, config).

pub mod config;
pub mod core;
pub mod logging;
