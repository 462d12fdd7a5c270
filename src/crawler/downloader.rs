//! Image downloader
//!
//! Fetches image bytes with a per-request timeout and a size ceiling, names
//! the file after its URL (suffixing a counter on collisions), and writes it
//! into the run directory. Every failure is local to one image except losing
//! the run directory itself, which [`DownloadError::is_fatal`] reports.

use crate::events::ImageRecord;
use crate::GleanerError;
use reqwest::{Client, Response};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Longest file name kept from a URL before falling back to a hashed name
const MAX_FILE_NAME_LEN: usize = 150;

/// Why a single image was not stored
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Image {url} exceeds the {limit} byte limit")]
    TooLarge { url: String, limit: u64 },

    #[error("Image {url} has the same content as {existing}")]
    DuplicateContent { url: String, existing: String },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Output directory {path} is unavailable: {source}")]
    StorageUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl DownloadError {
    /// True if the run cannot store any further image
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }
}

/// Downloads images for one crawl run
#[derive(Debug)]
pub struct ImageDownloader {
    client: Client,
    run_dir: PathBuf,
    site_dir: String,
    timeout: Duration,
    max_bytes: u64,
    /// File names handed out during this run
    used_names: HashSet<String>,
    /// SHA-256 of stored content -> file name
    content_hashes: HashMap<String, String>,
}

impl ImageDownloader {
    /// Creates a downloader writing into `output_root/site_dir`
    pub fn new(
        client: Client,
        output_root: &Path,
        site_dir: impl Into<String>,
        timeout: Duration,
        max_bytes: u64,
    ) -> Self {
        let site_dir = site_dir.into();
        Self {
            client,
            run_dir: output_root.join(&site_dir),
            site_dir,
            timeout,
            max_bytes,
            used_names: HashSet::new(),
            content_hashes: HashMap::new(),
        }
    }

    /// Creates the run directory if absent
    pub async fn prepare(&self) -> Result<(), GleanerError> {
        tokio::fs::create_dir_all(&self.run_dir)
            .await
            .map_err(|source| GleanerError::Storage {
                path: self.run_dir.clone(),
                source,
            })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Number of images stored so far
    pub fn stored(&self) -> usize {
        self.content_hashes.len()
    }

    /// Fetches `url` and stores it in the run directory
    pub async fn download(&mut self, url: &Url) -> Result<ImageRecord, DownloadError> {
        let response = self
            .client
            .get(url.as_str())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(DownloadError::TooLarge {
                    url: url.to_string(),
                    limit: self.max_bytes,
                });
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        let bytes = read_limited(response, url, self.max_bytes).await?;

        let digest = hex::encode(Sha256::digest(&bytes));
        if let Some(existing) = self.content_hashes.get(&digest) {
            return Err(DownloadError::DuplicateContent {
                url: url.to_string(),
                existing: existing.clone(),
            });
        }

        let file_name = self.unique_name(&file_name_for(url, &content_type)).await;
        let path = self.run_dir.join(&file_name);

        if let Err(source) = tokio::fs::write(&path, &bytes).await {
            return Err(self.classify_write_error(path, source).await);
        }

        tracing::debug!("Saved {} -> {}", url, path.display());

        self.used_names.insert(file_name.clone());
        self.content_hashes.insert(digest, file_name.clone());

        Ok(ImageRecord {
            source_url: url.clone(),
            path,
            file_name,
            site_dir: self.site_dir.clone(),
            size: bytes.len() as u64,
        })
    }

    /// Appends `-1`, `-2`, ... to the stem until the name is unused in this
    /// run and absent on disk
    async fn unique_name(&self, candidate: &str) -> String {
        let (stem, ext) = split_extension(candidate);
        let mut name = candidate.to_string();
        let mut counter = 0u32;

        while self.used_names.contains(&name)
            || tokio::fs::metadata(self.run_dir.join(&name)).await.is_ok()
        {
            counter += 1;
            name = match ext {
                Some(ext) => format!("{}-{}.{}", stem, counter, ext),
                None => format!("{}-{}", stem, counter),
            };
        }

        name
    }

    async fn classify_write_error(&self, path: PathBuf, source: std::io::Error) -> DownloadError {
        match tokio::fs::metadata(&self.run_dir).await {
            Ok(meta) if meta.is_dir() && source.kind() != std::io::ErrorKind::PermissionDenied => {
                DownloadError::Write { path, source }
            }
            Ok(_) => DownloadError::StorageUnavailable {
                path: self.run_dir.clone(),
                source,
            },
            Err(dir_error) => DownloadError::StorageUnavailable {
                path: self.run_dir.clone(),
                source: dir_error,
            },
        }
    }
}

fn request_error(url: &Url, e: reqwest::Error) -> DownloadError {
    if e.is_timeout() {
        DownloadError::Timeout {
            url: url.to_string(),
        }
    } else {
        DownloadError::Http {
            url: url.to_string(),
            source: e,
        }
    }
}

/// Reads the body, giving up as soon as it grows past `max_bytes`
async fn read_limited(
    mut response: Response,
    url: &Url,
    max_bytes: u64,
) -> Result<Vec<u8>, DownloadError> {
    let mut bytes = Vec::new();

    while let Some(chunk) = response.chunk().await.map_err(|e| request_error(url, e))? {
        if (bytes.len() + chunk.len()) as u64 > max_bytes {
            return Err(DownloadError::TooLarge {
                url: url.to_string(),
                limit: max_bytes,
            });
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

/// Derives a file-system-safe name from the URL's last path segment
///
/// URLs without a usable `name.ext` segment get `image-<url hash>.<ext>`
/// with the extension taken from the content type.
pub fn file_name_for(url: &Url, content_type: &str) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    let sanitized = sanitize_file_name(&decoded);

    if sanitized.len() <= MAX_FILE_NAME_LEN && split_extension(&sanitized).1.is_some() {
        return sanitized;
    }

    let digest = hex::encode(Sha256::digest(url.as_str().as_bytes()));
    format!("image-{}.{}", &digest[..12], extension_for(content_type))
}

/// Replaces characters that are unsafe in file names with `_`
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

/// Splits `name.ext` into stem and extension; `None` when there is no
/// plausible extension
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            (stem, Some(ext))
        }
        _ => (name, None),
    }
}

fn extension_for(content_type: &str) -> &'static str {
    if content_type.contains("svg") {
        "svg"
    } else if content_type.contains("png") {
        "png"
    } else if content_type.contains("webp") {
        "webp"
    } else if content_type.contains("gif") {
        "gif"
    } else {
        "jpg"
    }
}
