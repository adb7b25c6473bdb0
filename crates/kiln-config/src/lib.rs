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
#![allow(clippy::module_name_repetitions)]

//! Declarative descriptions consumed by the provisioning engine and build worker.
//!
//! Layout: `model.rs` (typed task/project/manifest models), `loader.rs` (JSON
//! loading), `validate.rs` (structural validation), `error.rs` (error type).

pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_app_manifest, load_project, load_task, parse_project, parse_task};
pub use model::{
    AppBinManifest, DEFAULT_LOG_LEVEL, ProjectConfig, ResourceKind, ResourceSpec, RootsConfig,
    SubtaskSpec, TaskSpec, TelemetryConfig,
};
pub use validate::{validate_app_manifest, validate_project, validate_task};
