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

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (temp trees, file writers, mtime control, tree snapshots).

pub mod fixtures;

pub use fixtures::{TreeEntry, set_mtime, temp_workspace, tree_snapshot, write_file};
