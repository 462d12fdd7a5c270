//! Configuration module for Sumi-Gleaner
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! plus the `MAX_PAGES` / `OUTPUT_DIR` environment overrides.
//!
//! # Example
//!
//! ```no_run
//! use sumi_gleaner::config::load_config;
//! use std::path::Path;
//!
//! let mut config = load_config(Path::new("gleaner.toml")).unwrap();
//! config.apply_env_overrides().unwrap();
//! println!("Crawler will visit at most {} pages", config.crawler.max_pages);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, OutputConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, ENV_MAX_PAGES, ENV_OUTPUT_DIR,
};
pub use validation::validate;
