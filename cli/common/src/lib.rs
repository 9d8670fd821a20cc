//! Shared utilities for tierflow CLI binaries.
//!
//! This crate provides the log level argument, logging initialization and
//! human-readable number formatting used by `tf-migrate`.

pub mod args;
pub mod format;
pub mod logging;

pub use args::LogLevel;
pub use format::{format_number, format_tib};
pub use logging::init_logging;
