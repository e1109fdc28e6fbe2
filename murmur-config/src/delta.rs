//! Config deltas: the wire form of one config message.

use crate::error::ConfigError;
use crate::value::VersionedField;
use murmur_types::{ConfigVariant, MessageHash, Namespace};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One config message as pushed to / fetched from the swarm.
///
/// A delta is a full-state snapshot at a sequence number: versioned scalar
/// fields plus set inserts. Merging is commutative, so devices can apply
/// deltas in any arrival order within a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDelta {
    /// The variant this delta belongs to.
    pub variant: ConfigVariant,
    /// The pushing device's sequence number for this snapshot.
    pub seqno: u64,
    /// Versioned scalar fields.
    pub fields: BTreeMap<String, VersionedField>,
    /// Set-union inserts, keyed by set name.
    pub set_inserts: BTreeMap<String, BTreeSet<String>>,
}

impl ConfigDelta {
    /// Encode to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        rmp_serde::to_vec(self).map_err(|e| ConfigError::Serialization(e.to_string()))
    }

    /// Decode from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        rmp_serde::from_slice(bytes).map_err(|e| ConfigError::Serialization(e.to_string()))
    }
}

/// An undecoded config message as it leaves the poll result path.
///
/// The store decodes `data` into a [`ConfigDelta`] during merge; decode
/// failures drop the single message, not the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingConfigMessage {
    /// The namespace the item was stored in.
    pub namespace: Namespace,
    /// The swarm hash of the item (merge idempotence key).
    pub hash: MessageHash,
    /// Decrypted delta bytes.
    pub data: Vec<u8>,
    /// Server storage timestamp, milliseconds.
    pub server_timestamp_ms: u64,
}
