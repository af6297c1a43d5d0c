//! mixweek-bot library interface
//!
//! Exposes the pipeline stages for integration testing

pub mod links;
pub mod pipeline;
pub mod selection;
pub mod services;
pub mod tracks;

pub use pipeline::{PipelineError, RunOutcome, WeeklyPlaylistBot};
