//! HTML parser for extracting page links and image references
//!
//! This module handles parsing HTML content to extract:
//! - Links to follow (from `<a>` and `<area>` tags)
//! - Images, from `<img>`/`<source>` attributes (including common lazy-load
//!   attributes and `srcset`) and from inline `style` background images
//!
//! Extraction is best-effort: anything that cannot be resolved is dropped and
//! the rest of the page is still returned.

use crate::url::resolve_url;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use url::Url;

/// Extracted information from an HTML page
///
/// Holds owned, already-resolved URLs: the parsed DOM is not `Send`, so it is
/// dropped before the scheduler awaits anything.
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    links: Vec<Url>,
    images: Vec<Url>,
}

impl ParsedPage {
    /// Absolute page links in document order
    pub fn links(&self) -> impl Iterator<Item = &Url> + '_ {
        self.links.iter()
    }

    /// Absolute image URLs in document order (duplicates preserved)
    pub fn images(&self) -> impl Iterator<Item = &Url> + '_ {
        self.images.iter()
    }

    pub fn into_parts(self) -> (Vec<Url>, Vec<Url>) {
        (self.links, self.images)
    }
}

/// Where an image rule reads its candidate from
#[derive(Debug, Clone, Copy)]
enum Source {
    /// A plain URL attribute
    Attr(&'static str),
    /// A `srcset`-style attribute; the last candidate is taken
    Srcset(&'static str),
    /// A `srcset` attribute only when it holds a single bare URL
    SingleSrcset(&'static str),
}

/// One extraction rule: elements named `element` may yield a candidate from `source`
#[derive(Debug, Clone, Copy)]
struct ImageRule {
    element: &'static str,
    source: Source,
}

impl ImageRule {
    const fn new(element: &'static str, source: Source) -> Self {
        Self { element, source }
    }
}

/// Attribute rules in priority order; the first rule that yields a candidate
/// for an element wins
const IMAGE_RULES: &[ImageRule] = &[
    ImageRule::new("img", Source::Attr("src")),
    ImageRule::new("img", Source::Attr("data-src")),
    ImageRule::new("img", Source::Attr("data-lazy-src")),
    ImageRule::new("img", Source::Attr("data-original")),
    ImageRule::new("img", Source::Srcset("srcset")),
    ImageRule::new("img", Source::Srcset("data-srcset")),
    ImageRule::new("source", Source::SingleSrcset("srcset")),
];

/// Elements any rule can apply to, in one selector so matches come back in
/// document order
const IMAGE_SELECTOR: &str = "img, source, [style]";

/// File types that are downloads rather than pages
const NON_PAGE_EXTENSIONS: &[&str] = &[
    "pdf", "zip", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "exe", "dmg", "pkg", "gz", "rar",
];

fn style_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).expect("valid style url regex")
    })
}

fn icon_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)/icons?/|/social/|/nav/|favicon|logo|spinner|loader|rating|cart|search|user|account|menu|arrow|/flags/",
        )
        .expect("valid icon regex")
    })
}

/// Parses HTML content and extracts page links and image URLs
///
/// # Link Extraction Rules
///
/// **Include:** `<a href>` and `<area href>`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:`, `data:` references
/// - Fragment-only references (same page anchors)
/// - Links to downloadable documents and archives (`.pdf`, `.zip`, ...)
///
/// # Image Extraction Rules
///
/// Elements are visited in document order. For each element the attribute
/// rules are tried in priority order (`src`, `data-src`, `data-lazy-src`,
/// `data-original`, `srcset`, `data-srcset`; single-URL `srcset` on
/// `<source>`); independently, every `url(...)` in an inline `style` is taken.
///
/// # Example
///
/// ```
/// use sumi_gleaner::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<body><img src="/a.png"><a href="/next">Next</a></body>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url);
/// assert_eq!(parsed.images().next().unwrap().as_str(), "https://example.com/a.png");
/// assert_eq!(parsed.links().next().unwrap().as_str(), "https://example.com/next");
/// ```
pub fn parse_html(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        links: extract_links(&document, base_url),
        images: extract_images(&document, base_url),
    }
}

/// Extracts all followable links from the HTML document
fn extract_links(document: &Html, base_url: &Url) -> Vec<Url> {
    let mut links = Vec::new();

    let Ok(selector) = Selector::parse("a[href], area[href]") else {
        return links;
    };

    for element in document.select(&selector) {
        if element.value().attr("download").is_some() {
            continue;
        }

        let Some(href) = element.value().attr("href") else {
            continue;
        };

        if href.trim_start().starts_with('#') {
            continue;
        }

        match resolve_url(base_url, href) {
            Ok(url) if !is_document_download(&url) => links.push(url),
            Ok(url) => tracing::trace!("Skipping download link {}", url),
            Err(e) => tracing::trace!("Skipping link {:?}: {}", href, e),
        }
    }

    links
}

/// Extracts all image references from the HTML document
fn extract_images(document: &Html, base_url: &Url) -> Vec<Url> {
    let mut images = Vec::new();

    let Ok(selector) = Selector::parse(IMAGE_SELECTOR) else {
        return images;
    };

    for element in document.select(&selector) {
        if let Some(raw) = first_rule_match(&element) {
            push_image(&mut images, base_url, &raw);
        }

        if let Some(style) = element.value().attr("style") {
            for captures in style_url_regex().captures_iter(style) {
                if let Some(raw) = captures.get(1) {
                    push_image(&mut images, base_url, raw.as_str());
                }
            }
        }
    }

    images
}

fn first_rule_match(element: &ElementRef<'_>) -> Option<String> {
    let name = element.value().name();

    IMAGE_RULES
        .iter()
        .filter(|rule| rule.element == name)
        .find_map(|rule| apply_rule(element, rule.source))
}

fn apply_rule(element: &ElementRef<'_>, source: Source) -> Option<String> {
    let candidate = match source {
        Source::Attr(attr) => element.value().attr(attr).map(str::trim)?.to_string(),
        Source::Srcset(attr) => last_srcset_candidate(element.value().attr(attr)?)?,
        Source::SingleSrcset(attr) => {
            let srcset = element.value().attr(attr)?.trim();
            if srcset.contains(',') || srcset.contains(char::is_whitespace) {
                return None;
            }
            srcset.to_string()
        }
    };

    if candidate.is_empty() || candidate.to_ascii_lowercase().starts_with("data:") {
        return None;
    }

    Some(candidate)
}

/// Picks the last `srcset` candidate, usually the largest rendition
fn last_srcset_candidate(srcset: &str) -> Option<String> {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .last()
        .map(str::to_string)
}

fn push_image(images: &mut Vec<Url>, base_url: &Url, raw: &str) {
    match resolve_url(base_url, raw) {
        Ok(url) => images.push(url),
        Err(e) => tracing::trace!("Skipping image reference {:?}: {}", raw, e),
    }
}

fn is_document_download(url: &Url) -> bool {
    url.path()
        .rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, ext)| {
            NON_PAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Returns true if the image URL looks like an icon, logo, spinner or other
/// page chrome rather than content
pub fn is_probable_icon(url: &Url) -> bool {
    icon_regex().is_match(url.as_str())
}
