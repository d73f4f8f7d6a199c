//! Workstation provisioning engine.
//!
//! Idempotent, declarative setup of a Debian/Ubuntu development machine:
//! packages, toolchains, install scripts, plugin clones, symlinks, rendered
//! config files, shell profile blocks, and SSH/Git credentials, all declared
//! in a TOML manifest (`conf/provision.toml`).
//!
//! The public API is organised into layers:
//!
//! - **[`config`]**: parse, dedupe and validate the manifest
//! - **[`resources`]**: side-effect-free state checks plus converging applies
//! - **[`steps`]**: probe/apply units built from the manifest
//! - **[`engine`]**: dependency ordering and the run loop
//! - **[`report`]**: final summary as text or JSON
//! - **[`commands`]**: top-level subcommand orchestration (`run`, `list`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod exec;
pub mod logging;
pub mod model;
pub mod outcome;
pub mod report;
pub mod resolver;
pub mod resources;
pub mod steps;
pub mod template;
