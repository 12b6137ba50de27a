//! Core types and configuration for the candle archive.
//!
//! This crate provides shared types used across all other crates:
//! - Resolutions, columns and candle rows
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
