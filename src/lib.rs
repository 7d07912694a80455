//! Dependency sweep library.
//!
//! This crate refreshes the npm dependencies of many git repositories:
//! - Discovering repository roots below a directory
//! - Deciding per repository whether it may be touched (root, default branch, ignore flag)
//! - Resolving commit author and message from CLI, config, git and manifest
//! - Pulling, reinstalling, bumping, committing and pushing, one repository at a time

pub mod cli;
pub mod config;
pub mod constants;
pub mod git;
pub mod manifest;
pub mod npm;
pub mod output;
pub mod policy;
pub mod repo;
pub mod runner;
pub mod workspace;
