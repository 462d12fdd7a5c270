//! Event payloads streamed to the consumer of a run
//!
//! A run emits zero or more `ImageFound` events followed by exactly one
//! `CrawlEnded`.

use crate::state::EndReason;
use std::path::PathBuf;
use url::Url;

/// A downloaded image
///
/// Created by the downloader once the bytes are on disk; never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    /// Resolved source URL the image was fetched from
    pub source_url: Url,

    /// Where the bytes were written
    pub path: PathBuf,

    /// File name within the run directory
    pub file_name: String,

    /// Host subdirectory the file lives in (the seed's host)
    pub site_dir: String,

    /// Number of bytes written
    pub size: u64,
}

impl ImageRecord {
    /// Path under which the image is reachable through the static file server
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::PathBuf;
    /// use sumi_gleaner::ImageRecord;
    /// use url::Url;
    ///
    /// let record = ImageRecord {
    ///     source_url: Url::parse("https://example.com/a b.png").unwrap(),
    ///     path: PathBuf::from("/data/example.com/a b.png"),
    ///     file_name: "a b.png".to_string(),
    ///     site_dir: "example.com".to_string(),
    ///     size: 3,
    /// };
    /// assert_eq!(record.serve_path("/images/"), "/images/example.com/a%20b.png");
    /// ```
    pub fn serve_path(&self, base: &str) -> String {
        format!(
            "{}/{}/{}",
            base.trim_end_matches('/'),
            urlencoding::encode(&self.site_dir),
            urlencoding::encode(&self.file_name)
        )
    }
}

/// An event handed from the scheduler to the stream consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEvent {
    /// An image was downloaded and stored
    ImageFound(ImageRecord),

    /// The run is over; always the last event of a run
    CrawlEnded { reason: EndReason },
}

impl CrawlEvent {
    /// Returns true for `CrawlEnded`, the last event of every run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CrawlEnded { .. })
    }
}
