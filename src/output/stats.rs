//! End-of-run statistics
//!
//! Collected by the stream consumer while it drains a run, then printed
//! once the terminal event has arrived.

use crate::events::CrawlEvent;
use crate::state::{CrawlRun, EndReason, RunStatus};
use std::fmt::Write as _;

/// Summary of one finished crawl run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Images streamed to the consumer
    pub images_streamed: u64,

    /// Bytes written for the streamed images
    pub bytes_stored: u64,

    /// Reason carried by the terminal event
    pub end_reason: Option<EndReason>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts for one event taken off the stream
    pub fn record(&mut self, event: &CrawlEvent) {
        match event {
            CrawlEvent::ImageFound(record) => {
                self.images_streamed += 1;
                self.bytes_stored += record.size;
            }
            CrawlEvent::CrawlEnded { reason } => self.end_reason = Some(*reason),
        }
    }

    /// True when the run ended in a way the caller should treat as failure
    pub fn is_failure(&self) -> bool {
        matches!(self.end_reason, Some(EndReason::InternalError) | None)
    }

    /// Renders the summary next to the run's final progress snapshot
    pub fn render(&self, run: &CrawlRun) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "=== Crawl Summary ===\n");
        let _ = writeln!(out, "Run {}: {}", run.id, run.seed);
        let _ = writeln!(out, "  Status: {}", run.status);
        if let Some(reason) = self.end_reason.or(run.end_reason) {
            let _ = writeln!(out, "  End reason: {}", reason);
        }
        let _ = writeln!(out, "  Pages visited: {} / {}", run.pages_visited, run.page_cap);
        let _ = writeln!(out, "  Images stored: {}", self.images_streamed);
        let _ = writeln!(out, "  Bytes written: {}", format_bytes(self.bytes_stored));
        let _ = writeln!(out, "  Output: {}", run.output_dir.display());

        let seconds = run.elapsed().num_milliseconds() as f64 / 1000.0;
        if run.status != RunStatus::Idle {
            let _ = writeln!(out, "  Duration: {:.1}s", seconds);
        }
        if seconds > 0.0 && run.pages_visited > 0 {
            let _ = writeln!(
                out,
                "  Rate: {:.2} pages/sec",
                run.pages_visited as f64 / seconds
            );
        }

        out
    }
}

/// Prints the summary to stderr, keeping stdout for streamed lines
pub fn print_summary(summary: &RunSummary, run: &CrawlRun) {
    eprint!("{}", summary.render(run));
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
