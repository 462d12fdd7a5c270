use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sumi-Gleaner
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum number of pages visited per crawl run
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Only follow links whose host matches the seed's host
    #[serde(rename = "same-origin-only")]
    pub same_origin_only: bool,

    /// Pause after each page (milliseconds)
    #[serde(rename = "request-delay-ms")]
    pub request_delay_ms: u64,

    /// Timeout for a single page fetch (seconds)
    #[serde(rename = "page-timeout-secs")]
    pub page_timeout_secs: u64,

    /// Timeout for a single image download (seconds)
    #[serde(rename = "image-timeout-secs")]
    pub image_timeout_secs: u64,

    /// Largest image body accepted (bytes)
    #[serde(rename = "max-image-bytes")]
    pub max_image_bytes: u64,

    /// Redirect hops followed before a page is skipped
    #[serde(rename = "max-redirects")]
    pub max_redirects: usize,

    /// Capacity of the event channel between crawler and consumer
    #[serde(rename = "event-buffer")]
    pub event_buffer: usize,

    /// Skip images whose URL looks like an icon, logo or spinner
    #[serde(rename = "skip-icons")]
    pub skip_icons: bool,

    /// Drop resizing query parameters from image URLs
    #[serde(rename = "strip-resize-params")]
    pub strip_resize_params: bool,

    /// How long a superseded run may take to wind down (seconds)
    #[serde(rename = "cancel-timeout-secs")]
    pub cancel_timeout_secs: u64,
}

impl CrawlerConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_secs(self.cancel_timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: 50,
            same_origin_only: true,
            request_delay_ms: 0,
            page_timeout_secs: 15,
            image_timeout_secs: 30,
            max_image_bytes: 20 * 1024 * 1024,
            max_redirects: 10,
            event_buffer: 64,
            skip_icons: true,
            strip_resize_params: true,
            cancel_timeout_secs: 10,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SumiGleaner".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/sumi-gleaner".to_string(),
            contact_email: "crawler@example.com".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory images are written to (one subdirectory per crawled host)
    #[serde(rename = "output-dir")]
    pub output_dir: PathBuf,

    /// HTTP path prefix the output directory is served under
    #[serde(rename = "serve-path")]
    pub serve_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./data"),
            serve_path: "/images".to_string(),
        }
    }
}
