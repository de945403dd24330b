//! Core shared library for the Segline workspace.
//!
//! This crate exposes the primitives every other Segline crate depends on:
//! the canonical error type, settings loading, database pool handling and
//! logging setup.

pub mod config;
pub mod db;
pub mod errors;
pub mod logging;

pub use config::{PreviousOnDelete, SegmentSettings};
pub use errors::{ConfigError, Result as CoreResult, SegmentError};
