//! URL handling module for Sumi-Gleaner
//!
//! This module provides URL normalization, relative reference resolution,
//! image URL cleaning and host comparison. Every URL that reaches the dedup
//! store has passed through [`normalize_url`] or [`resolve_url`].

mod domain;
mod normalize;

pub use domain::{extract_domain, same_site};
pub use normalize::{normalize_url, resolve_url, strip_resize_params};
