/// Run state definitions for tracking crawl progress
///
/// This module defines the lifecycle of a crawl run and the reasons a run can end.
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Represents the current state of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    // ===== Active States =====
    /// Run has been created but its scheduler has not started
    Idle,

    /// Scheduler is traversing pages
    Running,

    // ===== Terminal States =====
    /// Queue exhausted or page cap reached
    Completed,

    /// Aborted by an unrecoverable condition
    Failed,

    /// Superseded by a newer run
    Cancelled,
}

impl RunStatus {
    /// Returns true if this is a terminal state (absorbing)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if this is an active state
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        match (self, next) {
            (Self::Idle, Self::Running) => true,
            (Self::Running, s) => s.is_terminal(),
            // A run cancelled or failed before its first page still ends cleanly
            (Self::Idle, s) => s.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a crawl run ended; carried by the terminal event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndReason {
    /// The page cap was hit while unvisited pages were still queued
    PageCapReached,

    /// No pages left to visit
    QueueExhausted,

    /// A newer run superseded this one
    Cancelled,

    /// The event channel broke or the output directory became unusable
    InternalError,
}

impl EndReason {
    /// The terminal run status this reason leads to
    pub fn status(&self) -> RunStatus {
        match self {
            Self::PageCapReached | Self::QueueExhausted => RunStatus::Completed,
            Self::Cancelled => RunStatus::Cancelled,
            Self::InternalError => RunStatus::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PageCapReached => "page_cap_reached",
            Self::QueueExhausted => "queue_exhausted",
            Self::Cancelled => "cancelled",
            Self::InternalError => "internal_error",
        }
    }

    /// Parses the string form produced by [`EndReason::as_str`]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "page_cap_reached" => Some(Self::PageCapReached),
            "queue_exhausted" => Some(Self::QueueExhausted),
            "cancelled" => Some(Self::Cancelled),
            "internal_error" => Some(Self::InternalError),
            _ => None,
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One crawl attempt
///
/// Snapshots of this struct are published by the scheduler after every page;
/// the scheduler is the only writer.
#[derive(Debug, Clone)]
pub struct CrawlRun {
    pub id: u64,
    pub seed: Url,
    pub page_cap: u32,
    /// Output root; images land in a subdirectory named after the seed host
    pub output_dir: PathBuf,
    pub status: RunStatus,
    pub pages_visited: u32,
    pub images_found: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub end_reason: Option<EndReason>,
}

impl CrawlRun {
    pub fn new(id: u64, seed: Url, page_cap: u32, output_dir: PathBuf) -> Self {
        Self {
            id,
            seed,
            page_cap,
            output_dir,
            status: RunStatus::Idle,
            pages_visited: 0,
            images_found: 0,
            started_at: Utc::now(),
            finished_at: None,
            end_reason: None,
        }
    }

    /// Moves the run to `next`, ignoring illegal transitions
    ///
    /// Returns whether the transition happened.
    pub fn transition(&mut self, next: RunStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                "Run {}: ignoring invalid transition {} -> {}",
                self.id,
                self.status,
                next
            );
            return false;
        }
        self.status = next;
        true
    }

    /// Records the terminal reason and moves to its terminal status
    pub fn finish(&mut self, reason: EndReason) {
        if self.transition(reason.status()) {
            self.end_reason = Some(reason);
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock duration of the run so far (or in total once finished)
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Utc::now) - self.started_at
    }
}
