//! Configuration module for Catalog-Ingest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use catalog_ingest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("ingest.toml")).unwrap();
//! println!("Collection: {}", config.storage.collection);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{ApiConfig, Config, InputConfig, OutputConfig, PipelineConfig, StorageConfig};

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
