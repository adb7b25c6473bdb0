//! Incremental artifact builds: tree checksums, stamps, descriptors, and the
//! background build worker.
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

//! Layout: `checksum.rs` (directory tree checksum), `stamp.rs` (persisted
//! artifact checksums), `descriptor.rs` (build descriptor set), `generate.rs`
//! (artifact generators), `worker.rs` (background worker), `error.rs`.

pub mod checksum;
pub mod descriptor;
pub mod error;
pub mod generate;
pub mod stamp;
pub mod worker;

pub use checksum::{
    ChecksumOptions, FileTreeChecksum, MANIFEST_FILE, SkipFilter, TraversalOrder, compute,
    compute_all, source_files,
};
pub use descriptor::{
    APP_DIR_PREFIX, APP_MANIFEST, ARTIFACT_DIR, ArtifactKind, ArtifactSource, BuildDescriptor,
    BuildDescriptorSet, DATA_BIN, GUI_BIN, LANGUAGE_BIN, SourceDir,
};
pub use error::{BuildError, BuildResult};
pub use generate::{ArtifactGenerator, ZipGenerator};
pub use stamp::{STAMP_SUFFIX, read_stamp, stamp_path, write_stamp};
pub use worker::{
    BatchSummary, BuildHandle, BuildNotice, BuildObserver, BuildWorker, CancelToken,
};
