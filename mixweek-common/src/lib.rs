//! # Mixweek Common Library
//!
//! Shared code for the weekly playlist bot:
//! - Error type used by configuration and startup code
//! - Settings resolution (environment with TOML fallback)
//! - Calendar-week window math
//! - Snowflake pagination-cursor derivation

pub mod config;
pub mod error;
pub mod snowflake;
pub mod week;

pub use error::{Error, Result};
