//! Crawl run supervisor
//!
//! Holds at most one active run. Every start or cancel goes through the
//! same async mutex, so a new run is only spawned after the previous one
//! has reached a terminal state (or was aborted after the cancel timeout).

use crate::config::{validate, Config};
use crate::crawler::fetcher::build_http_client;
use crate::crawler::scheduler::Scheduler;
use crate::events::{event_channel, CrawlEvent, EventStream};
use crate::output::format_event;
use crate::state::CrawlRun;
use crate::url::normalize_url;
use crate::{ConfigError, GleanerError};
use futures::Stream;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// The supervisor's view of a running crawl
struct ActiveRun {
    id: u64,
    cancel: CancellationToken,
    task: JoinHandle<CrawlRun>,
    progress: watch::Receiver<CrawlRun>,
}

/// Starts, supersedes and cancels crawl runs
///
/// # Example
///
/// ```no_run
/// use sumi_gleaner::{Config, Supervisor};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let supervisor = Supervisor::new(Config::default())?;
/// let mut run = supervisor.start_crawl("https://example.com/", 20, "./data").await?;
/// while let Some(line) = run.next_line().await {
///     println!("{}", line);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Supervisor {
    config: Config,
    client: Client,
    next_id: AtomicU64,
    active: Mutex<Option<ActiveRun>>,
}

impl Supervisor {
    /// Validates the configuration and builds the shared HTTP client
    pub fn new(config: Config) -> Result<Self, GleanerError> {
        validate(&config)?;
        let client = build_http_client(&config.user_agent, &config.crawler)?;

        Ok(Self {
            config,
            client,
            next_id: AtomicU64::new(1),
            active: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Starts a crawl of `seed`, superseding any active run
    ///
    /// Fails without touching the active run if `seed` is not an absolute
    /// http(s) URL or `page_cap` is zero. Returns as soon as the new run's
    /// task is spawned.
    pub async fn start_crawl(
        &self,
        seed: &str,
        page_cap: u32,
        output_dir: impl Into<PathBuf>,
    ) -> Result<RunHandle, GleanerError> {
        let seed = normalize_url(seed)?;
        if page_cap == 0 {
            return Err(ConfigError::Validation("page cap must be at least 1".to_string()).into());
        }

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            self.stop(previous).await;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let run = CrawlRun::new(id, seed.clone(), page_cap, output_dir.into());
        let cancel = CancellationToken::new();
        let (events, stream) = event_channel(self.config.crawler.event_buffer);
        let (scheduler, progress) = Scheduler::new(
            run,
            self.client.clone(),
            &self.config.crawler,
            events,
            cancel.clone(),
        );

        let task = tokio::spawn(scheduler.run());
        tracing::info!("Started run {} for {}", id, seed);

        *active = Some(ActiveRun {
            id,
            cancel,
            task,
            progress: progress.clone(),
        });

        Ok(RunHandle {
            id,
            seed,
            serve_path: self.config.output.serve_path.clone(),
            events: stream,
            progress,
        })
    }

    /// Cancels the active run, if any, and returns its final snapshot
    pub async fn cancel_active(&self) -> Option<CrawlRun> {
        let mut active = self.active.lock().await;
        let previous = active.take()?;
        Some(self.stop(previous).await)
    }

    /// Latest progress snapshot of the active run
    pub async fn current_run(&self) -> Option<CrawlRun> {
        let active = self.active.lock().await;
        active.as_ref().map(|run| run.progress.borrow().clone())
    }

    /// Signals cancellation and waits for the run's task to finish
    ///
    /// A task that outlives the cancel timeout is aborted; its stream then
    /// ends with a synthesized `InternalError` terminal event.
    async fn stop(&self, mut previous: ActiveRun) -> CrawlRun {
        if !previous.task.is_finished() {
            tracing::info!("Cancelling run {}", previous.id);
        }
        previous.cancel.cancel();

        let timeout = self.config.crawler.cancel_timeout();
        match tokio::time::timeout(timeout, &mut previous.task).await {
            Ok(Ok(run)) => {
                tracing::debug!("Run {} stopped: {}", run.id, run.status);
                run
            }
            Ok(Err(e)) => {
                tracing::error!("Run {} task failed: {}", previous.id, e);
                let run = previous.progress.borrow().clone();
                run
            }
            Err(_) => {
                tracing::warn!(
                    "Run {} did not stop within {:?}; aborting",
                    previous.id,
                    timeout
                );
                previous.task.abort();
                let run = previous.progress.borrow().clone();
                run
            }
        }
    }
}

/// Consumer side of one crawl run
///
/// Dropping the handle closes the event channel; the run then ends with
/// `InternalError` at its next emitted image.
pub struct RunHandle {
    id: u64,
    seed: Url,
    serve_path: String,
    events: EventStream,
    progress: watch::Receiver<CrawlRun>,
}

impl RunHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn seed(&self) -> &Url {
        &self.seed
    }

    /// Latest progress snapshot published by the scheduler
    pub fn progress(&self) -> CrawlRun {
        self.progress.borrow().clone()
    }

    /// Waits for the next event; `None` once the terminal event was taken
    pub async fn next_event(&mut self) -> Option<CrawlEvent> {
        self.events.next_event().await
    }

    /// Waits for the next event and serializes it as a text line
    pub async fn next_line(&mut self) -> Option<String> {
        let event = self.next_event().await?;
        Some(format_event(&event, &self.serve_path))
    }

    /// Waits until the run's record is terminal and returns it
    pub async fn wait_finished(&mut self) -> CrawlRun {
        loop {
            if self.progress.borrow().is_terminal() {
                break;
            }
            if self.progress.changed().await.is_err() {
                break;
            }
        }
        self.progress.borrow().clone()
    }
}

/// Turns a run into a stream of text lines ending with the terminal line
pub fn stream_events(handle: RunHandle) -> impl Stream<Item = String> {
    futures::stream::unfold(handle, |mut handle| async move {
        let line = handle.next_line().await?;
        Some((line, handle))
    })
}
