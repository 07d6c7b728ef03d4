//! Subcommand implementations.

pub mod build;
pub mod common;
pub mod config;
pub mod coverage;
pub mod search;
pub mod status;
