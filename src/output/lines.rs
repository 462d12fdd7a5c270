//! Text-line serialization of crawl events
//!
//! The transport in front of the crawler forwards one line per event: the
//! served path of each stored image, then a single terminal line.

use crate::events::CrawlEvent;
use crate::state::EndReason;

/// Prefix marking the terminal line of a stream
pub const TERMINAL_PREFIX: &str = "[crawl-ended]";

/// Serializes one event as a line (without trailing newline)
///
/// # Examples
///
/// ```
/// use sumi_gleaner::output::format_event;
/// use sumi_gleaner::{CrawlEvent, EndReason};
///
/// let line = format_event(&CrawlEvent::CrawlEnded { reason: EndReason::QueueExhausted }, "/images");
/// assert_eq!(line, "[crawl-ended] queue_exhausted");
/// ```
pub fn format_event(event: &CrawlEvent, serve_path: &str) -> String {
    match event {
        CrawlEvent::ImageFound(record) => record.serve_path(serve_path),
        CrawlEvent::CrawlEnded { reason } => terminal_line(*reason),
    }
}

pub fn terminal_line(reason: EndReason) -> String {
    format!("{} {}", TERMINAL_PREFIX, reason)
}

/// Recovers the end reason from a terminal line
pub fn parse_terminal_line(line: &str) -> Option<EndReason> {
    line.strip_prefix(TERMINAL_PREFIX)
        .map(str::trim)
        .and_then(EndReason::from_str_opt)
}
