//! CLI-specific functionality for the submission runner
//!
//! This module contains argument parsing and configuration discovery.

pub mod args;
pub mod config;

pub use args::Args;
pub use config::{ConfigDiscovery, ConfigError, Credentials, StorageCredentials};
