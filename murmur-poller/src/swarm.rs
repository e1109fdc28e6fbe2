//! The swarm request/response seam.
//!
//! The poller never talks to the network directly; it goes through
//! [`SwarmClient`], which a real build implements over onion-routed HTTP and
//! tests implement with [`MockSwarm`].

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use murmur_types::{
    AccountId, MessageHash, PollRequest, PollResponse, SwarmError, SwarmNode, SwarmTarget,
};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Batch poll access to a replicated storage swarm.
#[async_trait]
pub trait SwarmClient: Send + Sync {
    /// The current set of storage nodes holding an account's data.
    async fn get_swarm(&self, account: &AccountId) -> Result<Vec<SwarmNode>, SwarmError>;

    /// One authenticated batch poll against a specific node.
    async fn poll(&self, node: &SwarmNode, request: PollRequest)
        -> Result<PollResponse, SwarmError>;

    /// Re-negotiate authentication capabilities for a target (community
    /// blinded-auth repair).
    async fn refresh_capabilities(&self, target: &SwarmTarget) -> Result<(), SwarmError>;
}

/// Deterministic mock hash for a payload, shaped like a swarm hash.
pub fn mock_hash(data: &[u8]) -> MessageHash {
    MessageHash::new(BASE64.encode(Sha256::digest(data)))
}

/// Mock swarm client for testing.
///
/// Allows seeding the swarm node list, queueing poll responses, capturing
/// issued polls, and forcing the next call to fail.
#[derive(Debug, Default)]
pub struct MockSwarm {
    inner: Arc<Mutex<MockSwarmInner>>,
}

#[derive(Debug, Default)]
struct MockSwarmInner {
    swarm: Vec<SwarmNode>,
    response_queue: VecDeque<PollResponse>,
    polled: Vec<(SwarmNode, PollRequest)>,
    refreshed: Vec<SwarmTarget>,
    fail_next_get_swarm: Option<SwarmError>,
    fail_next_poll: Option<SwarmError>,
    fail_next_refresh: Option<SwarmError>,
    gate: Option<Arc<Notify>>,
}

impl MockSwarm {
    /// Create a mock with no nodes and no queued responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the node list returned by `get_swarm`.
    pub fn set_swarm(&self, nodes: Vec<SwarmNode>) {
        self.inner.lock().unwrap().swarm = nodes;
    }

    /// Queue a response for the next `poll()` call.
    pub fn queue_response(&self, response: PollResponse) {
        self.inner.lock().unwrap().response_queue.push_back(response);
    }

    /// All polls issued so far, with the node each went to.
    pub fn polls(&self) -> Vec<(SwarmNode, PollRequest)> {
        self.inner.lock().unwrap().polled.clone()
    }

    /// Number of polls issued so far.
    pub fn poll_count(&self) -> usize {
        self.inner.lock().unwrap().polled.len()
    }

    /// Targets for which a capability refresh was requested.
    pub fn refreshed_targets(&self) -> Vec<SwarmTarget> {
        self.inner.lock().unwrap().refreshed.clone()
    }

    /// Cause the next `get_swarm()` to fail with the given error.
    pub fn fail_next_get_swarm(&self, error: SwarmError) {
        self.inner.lock().unwrap().fail_next_get_swarm = Some(error);
    }

    /// Cause the next `poll()` to fail with the given error.
    pub fn fail_next_poll(&self, error: SwarmError) {
        self.inner.lock().unwrap().fail_next_poll = Some(error);
    }

    /// Cause the next `refresh_capabilities()` to fail with the given error.
    pub fn fail_next_refresh(&self, error: SwarmError) {
        self.inner.lock().unwrap().fail_next_refresh = Some(error);
    }

    /// Make the next `poll()` wait until the returned handle is notified.
    /// Lets tests freeze a poller between "request sent" and "response
    /// applied".
    pub fn hold_next_poll(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.inner.lock().unwrap().gate = Some(Arc::clone(&notify));
        notify
    }

    /// Clear all state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockSwarmInner::default();
    }
}

impl Clone for MockSwarm {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl SwarmClient for MockSwarm {
    async fn get_swarm(&self, account: &AccountId) -> Result<Vec<SwarmNode>, SwarmError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_get_swarm.take() {
            return Err(error);
        }
        if inner.swarm.is_empty() {
            return Err(SwarmError::NoSwarmNodes(account.as_str().to_string()));
        }
        Ok(inner.swarm.clone())
    }

    async fn poll(
        &self,
        node: &SwarmNode,
        request: PollRequest,
    ) -> Result<PollResponse, SwarmError> {
        let gate = self.inner.lock().unwrap().gate.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_poll.take() {
            return Err(error);
        }
        inner.polled.push((node.clone(), request));
        Ok(inner.response_queue.pop_front().unwrap_or_default())
    }

    async fn refresh_capabilities(&self, target: &SwarmTarget) -> Result<(), SwarmError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_refresh.take() {
            return Err(error);
        }
        inner.refreshed.push(target.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_types::{AuthMethod, Namespace, NamespaceBatch};
    use std::collections::HashMap;

    fn account() -> AccountId {
        AccountId::new(&format!("05{}", "ab".repeat(32))).unwrap()
    }

    fn request() -> PollRequest {
        PollRequest {
            target: SwarmTarget::new(account(), AuthMethod::AccountKey, vec![Namespace::Default]),
            cursors: HashMap::new(),
            max_response_bytes: 65_536,
            namespace_budgets: HashMap::from([(Namespace::Default, 65_536)]),
        }
    }

    #[tokio::test]
    async fn empty_swarm_is_an_error() {
        let swarm = MockSwarm::new();
        assert!(matches!(
            swarm.get_swarm(&account()).await,
            Err(SwarmError::NoSwarmNodes(_))
        ));

        swarm.set_swarm(vec![SwarmNode::new("1.2.3.4:1234", "aa")]);
        assert_eq!(swarm.get_swarm(&account()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn poll_returns_queued_responses_and_records_requests() {
        let swarm = MockSwarm::new();
        swarm.queue_response(PollResponse {
            batches: vec![NamespaceBatch {
                namespace: Namespace::Default,
                items: vec![],
                cursor: Some(MessageHash::new("c1")),
            }],
        });

        let node = SwarmNode::new("1.2.3.4:1234", "aa");
        let response = swarm.poll(&node, request()).await.unwrap();
        assert_eq!(response.batches.len(), 1);

        // Queue exhausted: empty response, not an error.
        let response = swarm.poll(&node, request()).await.unwrap();
        assert!(response.batches.is_empty());

        assert_eq!(swarm.poll_count(), 2);
        assert_eq!(swarm.polls()[0].0, node);
    }

    #[tokio::test]
    async fn forced_poll_failure_applies_once() {
        let swarm = MockSwarm::new();
        swarm.fail_next_poll(SwarmError::RateLimited);

        let node = SwarmNode::new("1.2.3.4:1234", "aa");
        assert!(matches!(
            swarm.poll(&node, request()).await,
            Err(SwarmError::RateLimited)
        ));
        assert!(swarm.poll(&node, request()).await.is_ok());
    }

    #[tokio::test]
    async fn held_poll_waits_for_release() {
        let swarm = MockSwarm::new();
        let release = swarm.hold_next_poll();

        let pending = {
            let swarm = swarm.clone();
            tokio::spawn(async move {
                swarm
                    .poll(&SwarmNode::new("1.2.3.4:1234", "aa"), request())
                    .await
            })
        };
        assert_eq!(swarm.poll_count(), 0);

        release.notify_one();
        pending.await.unwrap().unwrap();
        assert_eq!(swarm.poll_count(), 1);
    }

    #[test]
    fn mock_hash_is_deterministic() {
        assert_eq!(mock_hash(b"payload"), mock_hash(b"payload"));
        assert_ne!(mock_hash(b"payload"), mock_hash(b"other"));
    }
}
