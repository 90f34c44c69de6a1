//! Runtime output modes.
//!
//! - `split`: Streamed stdout/stderr rendering of split updates

pub mod split;
