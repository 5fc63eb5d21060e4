//! Core business logic module
//!
//! Build ordering, change scoping, build execution and the job lifecycle.
//! Collaborators doing I/O are reached through traits implemented in
//! [`crate::infra`].
//!
//! # Submodules
//!
//! - [`manifest`] - Configuration (bilt.toml) parsing and validation
//! - [`package`] - Packages and the package set
//! - [`resolver`] - Build order calculation
//! - [`change_scope`] - Packages to rebuild since the last build
//! - [`executor`] - Cascading build execution
//! - [`job`] - Jobs and the dispatcher contract
//! - [`events`] - Job lifecycle event bus
//! - [`completion`] - Waiting for dispatched jobs to end
//! - [`orchestrator`] - Top-level run decision

pub mod change_scope;
pub mod completion;
pub mod events;
pub mod executor;
pub mod job;
pub mod manifest;
pub mod orchestrator;
pub mod package;
pub mod resolver;
