//! Poll wire types and the durable config dump record.

use crate::ids::{AccountId, MessageHash, SwarmTarget};
use crate::namespace::Namespace;
use crate::variant::ConfigVariant;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One encrypted item returned by a swarm node.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSwarmItem {
    /// The swarm-assigned hash of the stored item.
    pub hash: MessageHash,
    /// The encrypted payload bytes.
    pub data: Vec<u8>,
    /// Server-side storage timestamp, milliseconds since epoch.
    pub timestamp_ms: u64,
}

impl fmt::Debug for RawSwarmItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawSwarmItem")
            .field("hash", &self.hash)
            .field("data", &format!("[{} bytes]", self.data.len()))
            .field("timestamp_ms", &self.timestamp_ms)
            .finish()
    }
}

/// The items one namespace returned for a poll, plus the updated cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceBatch {
    /// Which namespace these items came from.
    pub namespace: Namespace,
    /// New items since the request cursor (may include replicated duplicates).
    pub items: Vec<RawSwarmItem>,
    /// Opaque cursor to resume from on the next poll.
    pub cursor: Option<MessageHash>,
}

/// A single authenticated batch poll against one swarm node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollRequest {
    /// What is being polled and how the request is signed.
    pub target: SwarmTarget,
    /// Per-namespace "last hash" cursors; absent namespaces fetch from the start.
    pub cursors: HashMap<Namespace, MessageHash>,
    /// Total response byte budget.
    pub max_response_bytes: usize,
    /// The total budget split across the queried namespaces, per
    /// [`crate::allocate_response_budget`].
    pub namespace_budgets: HashMap<Namespace, usize>,
}

/// The per-namespace results of one batch poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PollResponse {
    /// One batch per queried namespace.
    pub batches: Vec<NamespaceBatch>,
}

/// A decoded, authenticated, decrypted message ready for dispatch.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEnvelope {
    /// Logical conversation the message belongs to.
    pub conversation: String,
    /// The sending account.
    pub sender: AccountId,
    /// Namespace the item was stored in.
    pub namespace: Namespace,
    /// The swarm hash of the originating item.
    pub hash: MessageHash,
    /// Decrypted message body.
    pub payload: Vec<u8>,
    /// Sender timestamp, milliseconds since epoch.
    pub timestamp_ms: u64,
}

impl fmt::Debug for DecodedEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedEnvelope")
            .field("conversation", &self.conversation)
            .field("sender", &self.sender)
            .field("namespace", &self.namespace)
            .field("hash", &self.hash)
            .field("payload", &format!("[{} bytes REDACTED]", self.payload.len()))
            .field("timestamp_ms", &self.timestamp_ms)
            .finish()
    }
}

/// A serialized snapshot of a config object: the sole durable recovery
/// format for the merge engine's state.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDumpRecord {
    /// Which variant this dump belongs to.
    pub variant: ConfigVariant,
    /// The owning account.
    pub account: AccountId,
    /// Opaque serialized object state.
    pub data: Vec<u8>,
    /// When the dump was created, milliseconds since epoch.
    pub timestamp_ms: u64,
}

impl fmt::Debug for ConfigDumpRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigDumpRecord")
            .field("variant", &self.variant)
            .field("account", &self.account)
            .field("data", &format!("[{} bytes]", self.data.len()))
            .field("timestamp_ms", &self.timestamp_ms)
            .finish()
    }
}
