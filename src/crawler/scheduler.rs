//! Crawl scheduler: the breadth-first loop behind one crawl run
//!
//! The scheduler owns everything mutable about a run (frontier, visited
//! sets, downloader, the `CrawlRun` record) and drives them page by page:
//!
//! 1. Pop the oldest pending page; skip it if already visited
//! 2. Fetch it; on HTML, extract links and images
//! 3. Enqueue new links while the page cap leaves room
//! 4. Download new images and push an `ImageFound` event for each
//! 5. Count the page, publish progress, check the cap and cancellation
//!
//! Whatever ends the loop, exactly one `CrawlEnded` event is sent.

use crate::config::CrawlerConfig;
use crate::crawler::downloader::ImageDownloader;
use crate::crawler::fetcher::{fetch_page, FetchResult};
use crate::crawler::frontier::{Frontier, PendingPage};
use crate::crawler::parser::{is_probable_icon, parse_html};
use crate::events::EventSender;
use crate::state::{CrawlRun, EndReason, RunStatus, VisitedSet};
use crate::url::{extract_domain, same_site, strip_resize_params};
use reqwest::Client;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Drives one crawl run to completion
pub struct Scheduler {
    client: Client,
    config: CrawlerConfig,
    run: CrawlRun,
    /// Site links are compared against; the seed's final URL after redirects
    origin: Url,
    frontier: Frontier,
    /// Links refused because the page cap left no room
    unqueued: Vec<Url>,
    visited: VisitedSet,
    downloader: ImageDownloader,
    events: EventSender,
    cancel: CancellationToken,
    progress: watch::Sender<CrawlRun>,
}

impl Scheduler {
    /// Creates a scheduler for `run`
    ///
    /// Images are written to `<run.output_dir>/<seed host>/`. The returned
    /// receiver observes a fresh `CrawlRun` snapshot after every page.
    pub fn new(
        run: CrawlRun,
        client: Client,
        config: &CrawlerConfig,
        events: EventSender,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<CrawlRun>) {
        let site_dir = extract_domain(&run.seed).unwrap_or_else(|| "site".to_string());
        let downloader = ImageDownloader::new(
            client.clone(),
            &run.output_dir,
            site_dir,
            config.image_timeout(),
            config.max_image_bytes,
        );
        let (progress, progress_rx) = watch::channel(run.clone());

        let scheduler = Self {
            client,
            config: config.clone(),
            origin: run.seed.clone(),
            run,
            frontier: Frontier::new(),
            unqueued: Vec::new(),
            visited: VisitedSet::new(),
            downloader,
            events,
            cancel,
            progress,
        };

        (scheduler, progress_rx)
    }

    /// Runs the crawl and returns the final run record
    pub async fn run(mut self) -> CrawlRun {
        self.run.transition(RunStatus::Running);
        self.publish();

        tracing::info!(
            "Run {}: crawling {} (page cap {})",
            self.run.id,
            self.run.seed,
            self.run.page_cap
        );

        let reason = self.crawl().await;
        self.run.finish(reason);
        self.publish();

        match reason {
            EndReason::InternalError => tracing::error!(
                "Run {} failed after {} pages, {} images",
                self.run.id,
                self.run.pages_visited,
                self.run.images_found
            ),
            _ => tracing::info!(
                "Run {} ended ({}): {} pages, {} images in {}s",
                self.run.id,
                reason,
                self.run.pages_visited,
                self.run.images_found,
                self.run.elapsed().num_seconds()
            ),
        }

        let Self { run, events, .. } = self;
        if let Err(e) = events.finish(reason).await {
            tracing::debug!("Run {}: terminal event not delivered: {}", run.id, e);
        }

        run
    }

    /// The breadth-first loop; returns why it stopped
    async fn crawl(&mut self) -> EndReason {
        if let Err(e) = self.downloader.prepare().await {
            tracing::error!("Run {}: {}", self.run.id, e);
            return EndReason::InternalError;
        }

        let seed = self.run.seed.clone();
        self.frontier.push(seed, 0);

        while let Some(page) = self.frontier.pop() {
            if self.cancel.is_cancelled() {
                return EndReason::Cancelled;
            }

            if !self.visited.mark_visited_page(&page.url) {
                tracing::debug!("Already visited: {}", page.url);
                continue;
            }

            if let Err(reason) = self.process_page(&page).await {
                return reason;
            }

            self.run.pages_visited += 1;
            self.publish();

            if self.run.pages_visited >= self.run.page_cap {
                return if self.has_unvisited_pages() {
                    EndReason::PageCapReached
                } else {
                    EndReason::QueueExhausted
                };
            }

            let delay = self.config.request_delay();
            if !delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => return EndReason::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        if self.cancel.is_cancelled() {
            EndReason::Cancelled
        } else {
            EndReason::QueueExhausted
        }
    }

    /// Fetches one page and handles what it links to
    ///
    /// Page-level failures are logged and absorbed; an `Err` carries a
    /// run-ending reason.
    async fn process_page(&mut self, page: &PendingPage) -> Result<(), EndReason> {
        tracing::info!(
            "Run {}: page {}/{} {} (depth {})",
            self.run.id,
            self.run.pages_visited + 1,
            self.run.page_cap,
            page.url,
            page.depth
        );

        match fetch_page(&self.client, &page.url, self.config.page_timeout()).await {
            FetchResult::Success { final_url, body, .. } => {
                if final_url != page.url {
                    self.visited.mark_visited_page(&final_url);
                    if page.depth == 0 {
                        self.origin = final_url.clone();
                    }
                }

                let (links, images) = parse_html(&body, &final_url).into_parts();
                tracing::debug!(
                    "{}: {} links, {} images",
                    final_url,
                    links.len(),
                    images.len()
                );

                self.enqueue_links(links, page.depth + 1);

                for image in images {
                    self.handle_image(image).await?;
                }
            }
            FetchResult::ContentMismatch { content_type } => {
                tracing::debug!("Skipping {}: not HTML ({})", page.url, content_type);
            }
            FetchResult::RedirectLimit => {
                tracing::debug!("Skipping {}: too many redirects", page.url);
            }
            FetchResult::HttpError { status_code } => {
                tracing::warn!("Fetch failed for {}: HTTP {}", page.url, status_code);
            }
            FetchResult::NetworkError { error, .. } => {
                tracing::warn!("Fetch failed for {}: {}", page.url, error);
            }
        }

        Ok(())
    }

    /// Queues links in discovery order while the page cap leaves room
    ///
    /// The frontier holds at most `page_cap - pages_visited` unvisited
    /// entries, counted before the current page. That is one more than can
    /// still be visited, which lets the run tell a cap stop from an exhausted
    /// queue. Entries already visited through a redirect take no room.
    fn enqueue_links(&mut self, links: Vec<Url>, depth: u32) {
        let room = self.run.page_cap.saturating_sub(self.run.pages_visited) as usize;
        let mut pending = self.frontier.unvisited_len(&self.visited);

        for link in links {
            if self.visited.contains_page(&link) || self.frontier.was_queued(&link) {
                continue;
            }

            if self.config.same_origin_only && !same_site(&self.origin, &link) {
                tracing::debug!("Off-site link ignored: {}", link);
                continue;
            }

            if pending >= room {
                tracing::debug!("Page cap leaves no room for {}", link);
                self.unqueued.push(link);
                continue;
            }

            if self.frontier.push(link, depth) {
                pending += 1;
            }
        }
    }

    /// Returns true if a discovered page is still waiting to be visited
    fn has_unvisited_pages(&self) -> bool {
        self.frontier.has_unvisited(&self.visited)
            || self
                .unqueued
                .iter()
                .any(|link| !self.visited.contains_page(link))
    }

    /// Downloads one image reference and emits its event
    async fn handle_image(&mut self, image: Url) -> Result<(), EndReason> {
        let image = if self.config.strip_resize_params {
            strip_resize_params(&image)
        } else {
            image
        };

        if self.config.skip_icons && is_probable_icon(&image) {
            tracing::debug!("Skipping probable icon: {}", image);
            return Ok(());
        }

        if !self.visited.mark_visited_image(&image) {
            return Ok(());
        }

        if self.cancel.is_cancelled() {
            return Err(EndReason::Cancelled);
        }

        let record = match self.downloader.download(&image).await {
            Ok(record) => record,
            Err(e) if e.is_fatal() => {
                tracing::error!("Run {}: {}", self.run.id, e);
                return Err(EndReason::InternalError);
            }
            Err(e) => {
                tracing::warn!("Download failed: {}", e);
                return Ok(());
            }
        };

        tracing::debug!("Image found: {} ({} bytes)", record.source_url, record.size);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(EndReason::Cancelled),
            sent = self.events.image_found(record) => {
                if let Err(e) = sent {
                    tracing::error!("Run {}: {}", self.run.id, e);
                    return Err(EndReason::InternalError);
                }
            }
        }

        self.run.images_found += 1;
        Ok(())
    }

    fn publish(&self) {
        self.progress.send_replace(self.run.clone());
    }
}
