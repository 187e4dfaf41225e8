//! # pipescan Common Library
//!
//! Shared code for the pipescan crates:
//! - Error types
//! - Bootstrap configuration (TOML, environment, compiled defaults)
//! - Root folder resolution and initialization

pub mod config;
pub mod error;

pub use error::{Error, Result};
