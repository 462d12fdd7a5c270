//! Output module for streamed lines and run summaries
//!
//! This module handles:
//! - Serializing crawl events into the text lines a transport forwards
//! - Summarizing a run once its stream has ended

mod lines;
pub mod stats;

pub use lines::{format_event, parse_terminal_line, terminal_line, TERMINAL_PREFIX};
pub use stats::{print_summary, RunSummary};
