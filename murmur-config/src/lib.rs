//! # murmur-config
//!
//! The config synchronization cache: merge-capable config objects, the group
//! Info/Members/Keys triple, and the store that orchestrates merges, pushes,
//! dumps, and observed events.
//!
//! ## Ownership discipline
//!
//! A [`ConfigObject`]'s internals are not thread-safe. All mutation is routed
//! through [`ConfigStore`], which serializes access per account behind a
//! `tokio::sync::Mutex`. Nothing in this crate hands out a live object
//! reference that outlives the store's lock.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod delta;
mod error;
mod event;
mod group;
mod object;
mod persist;
mod store;
mod value;

pub use delta::{ConfigDelta, IncomingConfigMessage};
pub use error::ConfigError;
pub use event::ObservedEvent;
pub use group::GroupConfigTriple;
pub use object::{ContactEntry, ConfigObject, MergeOutcome, PendingPush};
pub use persist::{CommitBatch, ConfigPersistence, LocalMutation, MemoryPersistence};
pub use store::{
    ConfigSink, ConfigStore, GroupCreationToken, MutationOptions, PushResult,
};
pub use value::{ConfigValue, VersionedField};
