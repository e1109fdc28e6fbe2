//! Shared poll-result processing.
//!
//! Every concrete poller funnels its responses through here: per-item
//! decode/classify, config-vs-message partitioning, conversation grouping,
//! dedup, and the cursor bookkeeping rules.

use crate::crypto::EnvelopeCrypto;
use crate::state::{HashFreshness, PollState};
use murmur_config::{ConfigError, ConfigSink, IncomingConfigMessage};
use murmur_types::{
    DecodedEnvelope, JobDispatcher, MessageHash, Namespace, SwarmNode, SwarmTarget, SyncJob,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Summary of one processed poll response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Items seen for the first time.
    pub new_items: usize,
    /// Items dropped as duplicates.
    pub duplicate_items: usize,
    /// Namespaces whose cursor was invalidated because a node replayed only
    /// already-seen items.
    pub invalidated_cursors: Vec<Namespace>,
}

/// Turns raw poll responses into config merges and dispatched message jobs.
pub struct ResultProcessor {
    crypto: Arc<dyn EnvelopeCrypto>,
    config_sink: Arc<dyn ConfigSink>,
    dispatcher: Arc<dyn JobDispatcher>,
}

impl ResultProcessor {
    /// Wire the processor to its collaborators.
    pub fn new(
        crypto: Arc<dyn EnvelopeCrypto>,
        config_sink: Arc<dyn ConfigSink>,
        dispatcher: Arc<dyn JobDispatcher>,
    ) -> Self {
        Self {
            crypto,
            config_sink,
            dispatcher,
        }
    }

    /// Process one poll response for a target, updating the target's state.
    ///
    /// Cursor rules, per namespace:
    /// - new items, duplicates served by a node we had not seen them from,
    ///   and this device's own echoed sends all record the response cursor;
    /// - items that were all same-node duplicates invalidate the stored
    ///   cursor, forcing the next poll to re-fetch from earlier;
    /// - an empty batch mutates nothing (steady state).
    ///
    /// A successful pass resets the failure count and clears the capability
    /// repair latch. Errors from the config sink abort the pass before any
    /// cursor or dedup record is applied, so a re-fetch of the same items
    /// classifies them exactly as this pass did.
    pub async fn process(
        &self,
        target: &SwarmTarget,
        node: &SwarmNode,
        response: murmur_types::PollResponse,
        state: &mut PollState,
    ) -> Result<ProcessOutcome, ConfigError> {
        let mut outcome = ProcessOutcome::default();
        let mut config_messages = Vec::new();
        let mut conversations: BTreeMap<String, Vec<DecodedEnvelope>> = BTreeMap::new();
        // Cursor moves and dedup sightings are staged and applied only after
        // the config sink commit succeeds.
        let mut cursor_updates = Vec::new();
        let mut staged_seen: HashMap<MessageHash, HashSet<String>> = HashMap::new();

        for batch in response.batches {
            let had_items = !batch.items.is_empty();
            let mut new_in_namespace = 0usize;
            let mut cursor_confirmed = false;

            for item in batch.items {
                let freshness = match staged_seen.get(&item.hash) {
                    Some(nodes) if nodes.contains(&node.address) => {
                        HashFreshness::DuplicateSameNode
                    }
                    Some(_) => match state.seen.classify(&item.hash, &node.address) {
                        HashFreshness::DuplicateSameNode => HashFreshness::DuplicateSameNode,
                        _ => HashFreshness::DuplicateFromNewNode,
                    },
                    None => state.seen.classify(&item.hash, &node.address),
                };
                staged_seen
                    .entry(item.hash.clone())
                    .or_default()
                    .insert(node.address.clone());

                match freshness {
                    HashFreshness::DuplicateSameNode => {
                        outcome.duplicate_items += 1;
                        continue;
                    }
                    HashFreshness::DuplicateFromNewNode => {
                        // Normal replication; proof the cursor is still good.
                        outcome.duplicate_items += 1;
                        cursor_confirmed = true;
                        continue;
                    }
                    HashFreshness::New => {}
                }

                match self.crypto.open(&target.account, batch.namespace, &item) {
                    Ok(envelope) => {
                        new_in_namespace += 1;
                        if batch.namespace.is_config() {
                            config_messages.push(IncomingConfigMessage {
                                namespace: batch.namespace,
                                hash: envelope.hash,
                                data: envelope.payload,
                                server_timestamp_ms: item.timestamp_ms,
                            });
                        } else {
                            conversations
                                .entry(envelope.conversation.clone())
                                .or_default()
                                .push(envelope);
                        }
                    }
                    Err(e) if e.is_expected_noise() => {
                        // Our own echoes and known duplicates are expected
                        // steady-state traffic, not evidence of node replay.
                        outcome.duplicate_items += 1;
                        cursor_confirmed = true;
                    }
                    Err(e) => {
                        warn!(hash = ?item.hash, namespace = ?batch.namespace, "dropping undecodable item: {e}");
                    }
                }
            }

            outcome.new_items += new_in_namespace;
            if new_in_namespace > 0 || cursor_confirmed {
                if let Some(cursor) = batch.cursor {
                    cursor_updates.push((batch.namespace, Some(cursor)));
                }
            } else if had_items {
                // Everything the node sent was something it already sent us:
                // its cursor handling is suspect, re-fetch from earlier.
                cursor_updates.push((batch.namespace, None));
                outcome.invalidated_cursors.push(batch.namespace);
            }
        }

        if !config_messages.is_empty() {
            self.config_sink
                .handle_config_messages(&target.account, config_messages)
                .await?;
        }

        for (hash, nodes) in staged_seen {
            for served_by in nodes {
                state.seen.record(&hash, &served_by);
            }
        }

        for (conversation, envelopes) in conversations {
            self.dispatcher.dispatch(
                SyncJob::ProcessMessages {
                    conversation,
                    envelopes,
                },
                true,
            );
        }

        for (namespace, cursor) in cursor_updates {
            match cursor {
                Some(cursor) => {
                    state.cursors.insert(namespace, cursor);
                }
                None => {
                    state.cursors.remove(&namespace);
                }
            }
        }
        if state.failure_count != 0 {
            state.failure_count = 0;
        }
        state.capability_repair_attempted = false;

        debug!(
            account = ?target.account,
            new_items = outcome.new_items,
            duplicates = outcome.duplicate_items,
            "processed poll response"
        );
        Ok(outcome)
    }
}
