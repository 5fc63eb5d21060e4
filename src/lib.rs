//! Bilt - Monorepo build orchestrator
//!
//! This library builds the packages of a monorepo in dependency order,
//! narrows each run to the packages whose sources changed since the last
//! successful build, and resumes builds a previous process left unfinished.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Business logic: build order, change scope, execution, jobs
//! - [`infra`] - Infrastructure layer (filesystem, git, processes, job runtime)
//! - [`config`] - Configuration constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
