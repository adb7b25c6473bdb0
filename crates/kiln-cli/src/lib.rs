#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(
    missing_docs,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::redundant_pub_crate)]

//! Command-line front end for provisioning tasks and artifact builds.
//!
//! Layout:
//! - `cli.rs`: argument parsing, logging setup, and command dispatch
//! - `commands/`: command handlers (`provision`, `status`, `build`)
//! - `hooks.rs`: task hooks wired from command-line flags
//! - `error.rs`: CLI error type and exit codes
//! - `events.rs`: live capture of the run's event bus
//! - `output.rs`: renderers and formatting helpers
//! - `main.rs`: thin entrypoint delegating to `run()`

pub(crate) mod cli;
pub(crate) mod commands;
pub(crate) mod error;
pub(crate) mod events;
pub(crate) mod hooks;
pub(crate) mod output;

pub use cli::run;
