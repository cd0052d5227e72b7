//! Configuration loading and validation
//!
//! Configuration lives in a TOML file; `load_config_with_hash` returns the
//! parsed config together with a SHA-256 hash of the file content, which is
//! recorded on every crawl run for traceability.

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use types::{Config, CrawlerConfig, StorageConfig, UserAgentConfig};
pub use validation::validate;
