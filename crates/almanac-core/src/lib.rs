//! Shared settings, logging bootstrap and error types for the almanac engine.

pub mod config;
pub mod error;
pub mod logging;
