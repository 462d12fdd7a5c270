//! Traversal queue for the breadth-first crawl
//!
//! Pages are visited strictly in discovery order; there is no priority or
//! depth weighting.

use crate::state::VisitedSet;
use std::collections::{HashSet, VecDeque};
use url::Url;

/// A URL waiting to be visited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPage {
    /// The page to fetch
    pub url: Url,

    /// Link distance from the seed (seed = 0)
    pub depth: u32,

    /// Position in discovery order across the run
    pub order: u64,
}

/// FIFO queue of pending pages
///
/// A URL is queued at most once per run, even after it has been popped.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<PendingPage>,
    seen: HashSet<String>,
    next_order: u64,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a URL to the back of the queue
    ///
    /// Returns false if the URL has been queued before.
    pub fn push(&mut self, url: Url, depth: u32) -> bool {
        if !self.seen.insert(url.as_str().to_owned()) {
            return false;
        }

        let order = self.next_order;
        self.next_order += 1;
        self.queue.push_back(PendingPage { url, depth, order });
        true
    }

    /// Removes the oldest pending page
    pub fn pop(&mut self) -> Option<PendingPage> {
        self.queue.pop_front()
    }

    /// Returns true if the URL was ever queued
    pub fn was_queued(&self, url: &Url) -> bool {
        self.seen.contains(url.as_str())
    }

    /// Returns true if a queued page has not been visited yet
    pub fn has_unvisited(&self, visited: &VisitedSet) -> bool {
        self.queue.iter().any(|page| !visited.contains_page(&page.url))
    }

    /// Counts queued pages that have not been visited yet
    ///
    /// A page can be marked visited while still queued, when an earlier fetch
    /// was redirected to it.
    pub fn unvisited_len(&self, visited: &VisitedSet) -> usize {
        self.queue
            .iter()
            .filter(|page| !visited.contains_page(&page.url))
            .count()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
