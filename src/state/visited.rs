use std::collections::HashSet;
use url::Url;

/// Per-run dedup store for pages and images
///
/// Both sets only grow during a run. Keys are normalized URL strings, so
/// callers must pass URLs produced by the URL normalizer.
#[derive(Debug, Default)]
pub struct VisitedSet {
    pages: HashSet<String>,
    images: HashSet<String>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a page as visited; returns true if it was not visited before
    pub fn mark_visited_page(&mut self, url: &Url) -> bool {
        self.pages.insert(url.as_str().to_owned())
    }

    /// Marks an image as seen; returns true if it was not seen before
    pub fn mark_visited_image(&mut self, url: &Url) -> bool {
        self.images.insert(url.as_str().to_owned())
    }

    pub fn contains_page(&self, url: &Url) -> bool {
        self.pages.contains(url.as_str())
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}
