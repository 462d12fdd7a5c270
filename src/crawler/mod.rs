//! Crawler module: the crawl engine
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching of pages with per-request timeouts
//! - HTML parsing into page links and image references
//! - The breadth-first frontier and the scheduler that drives it
//! - Image downloading and storage
//! - The supervisor that owns the single active run

mod downloader;
mod fetcher;
mod frontier;
mod parser;
mod scheduler;
mod supervisor;

pub use downloader::{file_name_for, sanitize_file_name, DownloadError, ImageDownloader};
pub use fetcher::{build_http_client, fetch_page, user_agent_string, FetchResult};
pub use frontier::{Frontier, PendingPage};
pub use parser::{is_probable_icon, parse_html, ParsedPage};
pub use scheduler::Scheduler;
pub use supervisor::{stream_events, RunHandle, Supervisor};
