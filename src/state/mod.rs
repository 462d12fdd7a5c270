//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `RunStatus` / `EndReason`: lifecycle of a crawl run and why it ended
//! - `CrawlRun`: progress snapshot of one run
//! - `VisitedSet`: per-run dedup store for pages and images

mod run_state;
mod visited;

// Re-export main types
pub use run_state::{CrawlRun, EndReason, RunStatus};
pub use visited::VisitedSet;
