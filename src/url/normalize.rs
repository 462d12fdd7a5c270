use crate::UrlError;
use url::Url;

/// Query parameters that only select a rendition of an image
///
/// Compared case-insensitively.
const RESIZE_PARAMS: &[&str] = &[
    "width",
    "height",
    "w",
    "h",
    "size",
    "quality",
    "q",
    "fit",
    "crop",
    "maxwidth",
    "maxheight",
    "scale",
    "res",
    "resize",
    "fm",
    "format",
    "auto",
    "dpr",
];

/// References that never point at a crawlable resource
const NON_HTTP_PREFIXES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

/// Normalizes an absolute URL
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or relative
/// 2. Accept only `http` and `https`
/// 3. Require a host
/// 4. Lowercase scheme and host, drop the scheme's default port, give a bare
///    host the root path `/`, and resolve `.`/`..` segments (all performed by
///    the WHATWG parser)
/// 5. Remove the fragment
/// 6. Remove an empty query string (trailing `?`)
///
/// Normalizing an already-normalized URL returns it unchanged.
///
/// # Examples
///
/// ```
/// use sumi_gleaner::url::normalize_url;
///
/// let url = normalize_url("HTTP://Example.COM:80#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url_str = url_str.trim();
    if url_str.is_empty() {
        return Err(UrlError::Empty);
    }

    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(format!("{}: {}", url_str, e)))?;
    normalize_parsed(url)
}

/// Resolves a possibly relative reference against `base` and normalizes it
///
/// Handles path-relative (`img/a.png`), root-relative (`/a.png`) and
/// scheme-relative (`//cdn.example.com/a.png`) references. `javascript:`,
/// `mailto:`, `tel:` and `data:` references are rejected with
/// [`UrlError::InvalidScheme`].
///
/// # Examples
///
/// ```
/// use sumi_gleaner::url::resolve_url;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/gallery/index.html").unwrap();
/// let url = resolve_url(&base, "../img/cat.png#zoom").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/img/cat.png");
/// ```
pub fn resolve_url(base: &Url, raw: &str) -> Result<Url, UrlError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(UrlError::Empty);
    }

    let lowered = raw.to_ascii_lowercase();
    if let Some(prefix) = NON_HTTP_PREFIXES.iter().find(|p| lowered.starts_with(**p)) {
        return Err(UrlError::InvalidScheme(
            prefix.trim_end_matches(':').to_string(),
        ));
    }

    let joined = base
        .join(raw)
        .map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;
    normalize_parsed(joined)
}

fn normalize_parsed(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingDomain),
    }

    url.set_fragment(None);

    if url.query() == Some("") {
        url.set_query(None);
    }

    Ok(url)
}

/// Removes image-resizing query parameters so different renditions of the
/// same image collapse onto one URL
///
/// SVG URLs are returned unchanged.
///
/// # Examples
///
/// ```
/// use sumi_gleaner::url::strip_resize_params;
/// use url::Url;
///
/// let url = Url::parse("https://cdn.example.com/a.jpg?w=300&id=7&Quality=80").unwrap();
/// assert_eq!(strip_resize_params(&url).as_str(), "https://cdn.example.com/a.jpg?id=7");
/// ```
pub fn strip_resize_params(url: &Url) -> Url {
    let query = match url.query() {
        Some(query) if !is_svg(url) => query,
        _ => return url.clone(),
    };

    // Kept pieces stay byte-for-byte as they were; only the keys are decoded
    let pieces: Vec<&str> = query.split('&').filter(|piece| !piece.is_empty()).collect();
    let kept: Vec<&str> = pieces
        .iter()
        .copied()
        .filter(|piece| !is_resize_param(piece))
        .collect();

    if kept.len() == pieces.len() {
        return url.clone();
    }

    let mut cleaned = url.clone();
    if kept.is_empty() {
        cleaned.set_query(None);
    } else {
        cleaned.set_query(Some(&kept.join("&")));
    }

    tracing::trace!("Cleaned image URL: {} -> {}", url, cleaned);
    cleaned
}

/// Checks the key of one raw `key=value` query piece
fn is_resize_param(piece: &str) -> bool {
    let raw_key = piece.split('=').next().unwrap_or(piece);
    let key = urlencoding::decode(raw_key)
        .map(|key| key.into_owned())
        .unwrap_or_else(|_| raw_key.to_string());

    RESIZE_PARAMS
        .iter()
        .any(|param| param.eq_ignore_ascii_case(&key))
}

fn is_svg(url: &Url) -> bool {
    url.path().to_ascii_lowercase().ends_with(".svg")
}
