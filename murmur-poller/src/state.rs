//! Per-target poll state, owned by exactly one poller.

use murmur_types::{MessageHash, Namespace, SwarmNode};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

/// Upper bound on tracked hashes; the oldest record is evicted past this.
/// An evicted hash re-classifies as new, which at worst re-dispatches one
/// old message.
const MAX_TRACKED_HASHES: usize = 8_192;

/// Milliseconds since the unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// What seeing a hash again tells us about cursor freshness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashFreshness {
    /// Never seen before.
    New,
    /// Already seen, served again by the same node: the node may be replaying
    /// past our cursor.
    DuplicateSameNode,
    /// Already seen, but a different node served it: normal swarm
    /// replication, and evidence our cursor is still valid.
    DuplicateFromNewNode,
}

/// Which nodes have served each message hash. Bounded: the oldest hash is
/// forgotten past [`MAX_TRACKED_HASHES`].
#[derive(Debug, Default)]
pub struct SeenRecords {
    seen: HashMap<MessageHash, HashSet<String>>,
    order: VecDeque<MessageHash>,
}

impl SeenRecords {
    /// Classify a sighting without recording it.
    pub fn classify(&self, hash: &MessageHash, node: &str) -> HashFreshness {
        match self.seen.get(hash) {
            None => HashFreshness::New,
            Some(nodes) if nodes.contains(node) => HashFreshness::DuplicateSameNode,
            Some(_) => HashFreshness::DuplicateFromNewNode,
        }
    }

    /// Record that `node` served `hash` and classify the sighting.
    pub fn record(&mut self, hash: &MessageHash, node: &str) -> HashFreshness {
        let freshness = match self.seen.get_mut(hash) {
            None => {
                self.seen
                    .insert(hash.clone(), HashSet::from([node.to_string()]));
                self.order.push_back(hash.clone());
                HashFreshness::New
            }
            Some(nodes) => {
                if nodes.insert(node.to_string()) {
                    HashFreshness::DuplicateFromNewNode
                } else {
                    HashFreshness::DuplicateSameNode
                }
            }
        };
        while self.seen.len() > MAX_TRACKED_HASHES {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            } else {
                break;
            }
        }
        freshness
    }

    /// Number of distinct hashes seen.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Mutable state for one polled target.
///
/// Created when polling starts, destroyed when it stops. Only the owning
/// poller mutates it, always behind that poller's lock.
#[derive(Debug, Default)]
pub struct PollState {
    /// Whether the target is actively polled. Checked before results are
    /// applied; a result arriving after stop is discarded.
    pub is_polling: bool,
    /// The node the last poll used, kept until rotation.
    pub current_node: Option<SwarmNode>,
    /// Consecutive successful polls against `current_node`.
    pub polls_on_current_node: u32,
    /// Consecutive failed cycles; drives backoff.
    pub failure_count: u32,
    /// When the most recent cycle started, milliseconds since epoch.
    pub last_poll_started_ms: u64,
    /// Per-namespace resume cursors from the last successful poll.
    pub cursors: HashMap<Namespace, MessageHash>,
    /// Dedup records for item hashes.
    pub seen: SeenRecords,
    /// Set when a capability repair has been fired for the current failure
    /// streak; cleared on the next successful cycle.
    pub capability_repair_attempted: bool,
}

impl PollState {
    /// Fresh state for a target that is not yet polling.
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to a new node, resetting the per-node poll counter.
    pub fn rotate_to(&mut self, node: SwarmNode) {
        self.current_node = Some(node);
        self.polls_on_current_node = 0;
    }

    /// Forget the current node so the next cycle selects a fresh one.
    pub fn drop_node(&mut self) {
        self.current_node = None;
        self.polls_on_current_node = 0;
    }
}
