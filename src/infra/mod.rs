//! Infrastructure layer
//!
//! Handles all I/O operations: filesystem, git, external processes and
//! the in-process job runtime.

pub mod dirs;
pub mod dispatcher;
pub mod filesystem;
pub mod git;
pub mod job_store;
pub mod runner;
pub mod working_tree;
