//! Command implementations for the CLI
//!
//! This module contains the implementation of all CLI commands:
//! - start: Start sampling and the HTTP server
//! - check: Inspect or repair the log file
//! - query: Print logged rows
//! - reset: Delete the log file
//! - config: Configuration display and validation

pub mod check;
pub mod config;
pub mod query;
pub mod reset;
pub mod start;
