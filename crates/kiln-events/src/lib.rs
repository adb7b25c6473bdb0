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

//! Event bus for provisioning tasks and artifact builds.
//!
//! Events carry sequential identifiers and a bounded replay buffer so late
//! subscribers (a CLI progress view, for example) can catch up on what they
//! missed. Internally it uses `tokio::broadcast`; on overflow the oldest
//! events are dropped.

pub mod payloads;
pub mod routing;

pub use payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};
pub use routing::{EventBus, EventStream};
