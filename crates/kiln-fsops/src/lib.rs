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

//! Transactional filesystem provisioning with rollback.
//!
//! Layout: `alias.rs` (path alias table, search paths), `resource.rs`
//! (resource descriptors), `journal.rs` (rollback journal), `subtask/`
//! (copy, remove, rename), `task.rs` (orchestration), `hooks.rs` (task
//! extension points), `walk.rs` (directory visitor), `error.rs`.

pub mod alias;
pub mod error;
pub mod hooks;
pub mod journal;
pub mod resource;
pub mod subtask;
pub mod task;
pub mod walk;

pub use alias::{
    ALIAS_APP_RES, ALIAS_APP_SRC, ALIAS_APP_SRC2, ALIAS_RES, ALIAS_SRC, ALIAS_SRC2, ALIAS_USER,
    AliasTableBuilder, PathAliasTable, SearchPaths, SearchSnapshot,
};
pub use error::{FsOpsError, FsOpsResult};
pub use hooks::{NoopHooks, Replacement, TaskHooks};
pub use journal::{Journal, JournalAction, JournalEntry, ReplayReport};
pub use resource::{ResourceDescriptor, ResourceKind};
pub use subtask::{
    CopySubtask, RemoveSubtask, RenameSubtask, RollbackOutcome, Subtask, SubtaskContext,
    SubtaskState,
};
pub use task::{RollbackEntry, RollbackStatus, Task, TaskBuilder, TaskOutcome, TaskReport};
pub use walk::{WalkEntry, walk_dir};
