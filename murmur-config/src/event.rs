//! Observed events: semantic change notifications buffered with their cause.
//!
//! Events are produced while a config object merges or mutates, buffered on
//! the object, and flushed only inside the [`CommitBatch`] that durably
//! commits the change. A change that never commits never emits, and a change
//! that commits emits exactly once.
//!
//! [`CommitBatch`]: crate::persist::CommitBatch

use crate::value::ConfigValue;

/// One semantic change: "this key now has this value".
///
/// Keys follow the object's field naming, e.g.
/// `contact.<account>.blocked` or `set.members+<account>` for set inserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedEvent {
    /// The changed key.
    pub key: String,
    /// The new effective value.
    pub value: ConfigValue,
}

impl ObservedEvent {
    /// Create an event.
    pub fn new(key: impl Into<String>, value: ConfigValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}
