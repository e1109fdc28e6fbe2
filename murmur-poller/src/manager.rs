//! The poller manager: one live poller per polled target.
//!
//! The bookkeeping map is the only shared structure; poll cycles run outside
//! it. Removal always stops the poller first, so no poller is ever
//! reachable-but-stopped or removed-but-still-running.

use crate::community::CommunityPollerSpec;
use crate::group::GroupPollerSpec;
use crate::poller::{Poller, PollerSpec};
use crate::results::ResultProcessor;
use crate::swarm::SwarmClient;
use crate::tuning::PollTuning;
use crate::user::UserPollerSpec;
use async_trait::async_trait;
use dashmap::DashMap;
use murmur_types::{AccountId, SwarmTarget};
use std::sync::Arc;
use tracing::info;

/// Object-safe view of a poller, whatever its spec type.
#[async_trait]
pub trait ManagedPoller: Send + Sync {
    /// The spec's short name.
    fn name(&self) -> &'static str;
    /// The polled target.
    fn target(&self) -> &SwarmTarget;
    /// Start polling; no-op if already polling.
    async fn start_if_needed(&self);
    /// Stop polling and discard in-flight results.
    async fn stop(&self);
    /// Whether the target is actively polled.
    async fn is_polling(&self) -> bool;
}

#[async_trait]
impl<S: PollerSpec> ManagedPoller for Poller<S> {
    fn name(&self) -> &'static str {
        Poller::name(self)
    }

    fn target(&self) -> &SwarmTarget {
        Poller::target(self)
    }

    async fn start_if_needed(&self) {
        Poller::start_if_needed(self).await;
    }

    async fn stop(&self) {
        Poller::stop(self).await;
    }

    async fn is_polling(&self) -> bool {
        Poller::is_polling(self).await
    }
}

/// Owns the set of active pollers, keyed by target identifier.
pub struct PollerManager {
    client: Arc<dyn SwarmClient>,
    processor: Arc<ResultProcessor>,
    tuning: PollTuning,
    pollers: DashMap<String, Arc<dyn ManagedPoller>>,
}

impl PollerManager {
    /// Create a manager over the shared client, processor, and tuning.
    pub fn new(
        client: Arc<dyn SwarmClient>,
        processor: Arc<ResultProcessor>,
        tuning: PollTuning,
    ) -> Self {
        Self {
            client,
            processor,
            tuning,
            pollers: DashMap::new(),
        }
    }

    /// Get the poller for a target, creating one if absent. Idempotent:
    /// concurrent callers for the same target get the same instance.
    pub fn get_or_create(&self, target: SwarmTarget) -> Arc<dyn ManagedPoller> {
        match self.pollers.entry(target.key()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Arc::clone(entry.get()),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let poller = self.build(target);
                info!(poller = poller.name(), account = ?poller.target().account, "created poller");
                slot.insert(Arc::clone(&poller));
                poller
            }
        }
    }

    /// Get-or-create the poller for a target and start it.
    pub async fn start_polling(&self, target: SwarmTarget) -> Arc<dyn ManagedPoller> {
        let poller = self.get_or_create(target);
        poller.start_if_needed().await;
        poller
    }

    /// Stop a target's poller, then remove it from the map.
    pub async fn stop_and_remove(&self, account: &AccountId) {
        let key = account.as_str().to_string();
        let Some(poller) = self.pollers.get(&key).map(|e| Arc::clone(e.value())) else {
            return;
        };
        poller.stop().await;
        self.pollers.remove(&key);
    }

    /// Stop every poller, then clear the map.
    pub async fn stop_all(&self) {
        let pollers: Vec<_> = self
            .pollers
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        for poller in pollers {
            poller.stop().await;
        }
        self.pollers.clear();
    }

    /// Snapshot of the currently polled targets. Read-only; does not block
    /// poll cycles or map mutation beyond the per-shard read locks.
    pub fn polled_targets(&self) -> Vec<SwarmTarget> {
        self.pollers
            .iter()
            .map(|e| e.value().target().clone())
            .collect()
    }

    fn build(&self, target: SwarmTarget) -> Arc<dyn ManagedPoller> {
        let tuning = self.tuning.clone();
        let client = Arc::clone(&self.client);
        let processor = Arc::clone(&self.processor);
        if target.account.is_group() {
            Arc::new(Poller::new(
                GroupPollerSpec::new(tuning),
                target,
                client,
                processor,
            ))
        } else if target.account.is_community() {
            Arc::new(Poller::new(
                CommunityPollerSpec::new(tuning),
                target,
                client,
                processor,
            ))
        } else {
            Arc::new(Poller::new(
                UserPollerSpec::new(tuning),
                target,
                client,
                processor,
            ))
        }
    }
}
