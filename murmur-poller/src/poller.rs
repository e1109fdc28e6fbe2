//! The generic per-target polling state machine.
//!
//! Cycle shape: select a node (sticky until the rotation cap, or per the
//! spec's policy), issue one authenticated batch poll, hand results to the
//! shared processor, then sleep for the spec-computed delay. Stop is
//! flag-based: an in-flight request is not aborted, its result is discarded
//! when the flag is seen down.

use crate::results::ResultProcessor;
use crate::state::{now_ms, PollState};
use crate::swarm::SwarmClient;
use crate::tuning::PollTuning;
use murmur_types::{
    allocate_response_budget, Namespace, PollRequest, SwarmError, SwarmNode, SwarmTarget,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What to do after a failed poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDirective {
    /// Back off and retry against the same node.
    Retry,
    /// Back off and pick a fresh node for the next cycle.
    RotateNode,
    /// Fire the one-shot capability repair, then back off.
    RepairCapabilities,
    /// Log loudly and back off; the request must not be retried as-is.
    Escalate,
}

/// Per-target polling policy. Concrete pollers (user, group, community)
/// implement this; the engine in [`Poller`] does everything else.
pub trait PollerSpec: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// The tuning knobs this poller runs under.
    fn tuning(&self) -> &PollTuning;

    /// Namespaces to include in each poll for a target.
    fn namespaces(&self, target: &SwarmTarget) -> Vec<Namespace>;

    /// Consecutive successful polls against one node before forced rotation.
    /// Rotation on success defends against a node that answers happily
    /// without being reachable from the rest of the swarm.
    fn max_node_poll_count(&self) -> u32 {
        self.tuning().max_node_poll_count
    }

    /// Delay before the next cycle given the consecutive failure count.
    fn next_poll_delay(&self, failure_count: u32) -> Duration {
        self.tuning().next_poll_delay(failure_count)
    }

    /// Pick a node from the target's swarm when none is held or rotation is
    /// due.
    fn select_node(&self, swarm: &[SwarmNode], state: &PollState) -> Option<SwarmNode>;

    /// Classify a failed cycle into a recovery directive.
    fn handle_poll_error(&self, error: &SwarmError, state: &PollState) -> ErrorDirective {
        let _ = state;
        if error.is_fatal_for_cycle() {
            ErrorDirective::Escalate
        } else if error.is_retryable() {
            ErrorDirective::Retry
        } else {
            // Unauthorized / missing capability: default pollers cannot
            // repair auth, only escalate. The community poller overrides.
            ErrorDirective::Escalate
        }
    }
}

struct PollerInner<S: PollerSpec> {
    spec: S,
    target: SwarmTarget,
    client: Arc<dyn SwarmClient>,
    processor: Arc<ResultProcessor>,
    state: Mutex<PollState>,
}

/// A recurring poll loop for one target.
pub struct Poller<S: PollerSpec> {
    inner: Arc<PollerInner<S>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S: PollerSpec> Poller<S> {
    /// Build a poller; it does nothing until [`Self::start_if_needed`].
    pub fn new(
        spec: S,
        target: SwarmTarget,
        client: Arc<dyn SwarmClient>,
        processor: Arc<ResultProcessor>,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                spec,
                target,
                client,
                processor,
                state: Mutex::new(PollState::new()),
            }),
            task: Mutex::new(None),
        }
    }

    /// The polled target.
    pub fn target(&self) -> &SwarmTarget {
        &self.inner.target
    }

    /// The spec's short name (used in logs and observability).
    pub fn name(&self) -> &'static str {
        self.inner.spec.name()
    }

    /// Whether the target is actively polled.
    pub async fn is_polling(&self) -> bool {
        self.inner.state.lock().await.is_polling
    }

    /// Start the poll loop. A no-op if already polling: redundant and
    /// concurrent callers never produce a second loop.
    pub async fn start_if_needed(&self) {
        {
            let mut state = self.inner.state.lock().await;
            if state.is_polling {
                return;
            }
            state.is_polling = true;
        }
        info!(poller = self.inner.spec.name(), account = ?self.inner.target.account, "starting poll loop");
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            while let Some(delay) = inner.poll_once().await {
                tokio::time::sleep(delay).await;
            }
        });
        *self.task.lock().await = Some(handle);
    }

    /// Stop polling: flag down, pending timer cancelled, in-flight results
    /// discarded when they land.
    pub async fn stop(&self) {
        {
            let mut state = self.inner.state.lock().await;
            if !state.is_polling {
                return;
            }
            state.is_polling = false;
        }
        info!(poller = self.inner.spec.name(), account = ?self.inner.target.account, "stopping poll loop");
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
    }

    /// Run exactly one poll cycle and return the delay the loop would sleep,
    /// or `None` if the poller is (or was just) stopped. Public so tests can
    /// drive cycles deterministically.
    pub async fn poll_once(&self) -> Option<Duration> {
        self.inner.poll_once().await
    }

    #[cfg(test)]
    pub(crate) fn state_for_tests(&self) -> &Mutex<PollState> {
        &self.inner.state
    }
}

impl<S: PollerSpec> PollerInner<S> {
    async fn poll_once(&self) -> Option<Duration> {
        // Phase 1: snapshot what the request needs; no lock across awaits.
        let (held_node, cursors) = {
            let mut state = self.state.lock().await;
            if !state.is_polling {
                return None;
            }
            state.last_poll_started_ms = now_ms();
            let rotation_due =
                state.polls_on_current_node >= self.spec.max_node_poll_count();
            if rotation_due && state.current_node.is_some() {
                debug!(poller = self.spec.name(), "forced node rotation after poll cap");
                state.drop_node();
            }
            (state.current_node.clone(), state.cursors.clone())
        };

        // Phase 2: ensure we hold a node.
        let node = match held_node {
            Some(node) => node,
            None => {
                let swarm = match self.client.get_swarm(&self.target.account).await {
                    Ok(swarm) => swarm,
                    Err(e) => return self.after_failure(e).await,
                };
                let mut state = self.state.lock().await;
                if !state.is_polling {
                    return None;
                }
                let Some(node) = self.spec.select_node(&swarm, &state) else {
                    drop(state);
                    return self
                        .after_failure(SwarmError::NoSwarmNodes(
                            self.target.account.as_str().to_string(),
                        ))
                        .await;
                };
                state.rotate_to(node.clone());
                node
            }
        };

        // Phase 3: the batch request itself.
        let namespaces = self.spec.namespaces(&self.target);
        let budget = self.spec.tuning().response_budget_bytes;
        let request = PollRequest {
            target: SwarmTarget {
                account: self.target.account.clone(),
                auth: self.target.auth.clone(),
                namespaces: namespaces.clone(),
            },
            cursors,
            max_response_bytes: budget,
            namespace_budgets: allocate_response_budget(&namespaces, budget),
        };
        let response = match self.client.poll(&node, request).await {
            Ok(response) => response,
            Err(e) => return self.after_failure(e).await,
        };

        // Phase 4: apply results, unless stop won the race.
        let mut state = self.state.lock().await;
        if !state.is_polling {
            debug!(poller = self.spec.name(), "discarding poll result after stop");
            return None;
        }
        match self
            .processor
            .process(&self.target, &node, response, &mut state)
            .await
        {
            Ok(_) => {
                state.polls_on_current_node += 1;
                Some(self.spec.next_poll_delay(state.failure_count))
            }
            Err(e) => {
                error!(poller = self.spec.name(), account = ?self.target.account, "failed to apply poll results: {e}");
                state.failure_count += 1;
                Some(self.spec.next_poll_delay(state.failure_count))
            }
        }
    }

    async fn after_failure(&self, error: SwarmError) -> Option<Duration> {
        let mut repair = false;
        let delay = {
            let mut state = self.state.lock().await;
            if !state.is_polling {
                return None;
            }
            state.failure_count += 1;
            let directive = self.spec.handle_poll_error(&error, &state);
            match directive {
                ErrorDirective::Retry => {
                    debug!(poller = self.spec.name(), failures = state.failure_count, "poll failed, retrying: {error}");
                }
                ErrorDirective::RotateNode => {
                    debug!(poller = self.spec.name(), failures = state.failure_count, "poll failed, rotating node: {error}");
                    state.drop_node();
                }
                ErrorDirective::RepairCapabilities => {
                    if state.capability_repair_attempted {
                        warn!(poller = self.spec.name(), "capability still missing after repair: {error}");
                    } else {
                        state.capability_repair_attempted = true;
                        repair = true;
                    }
                }
                ErrorDirective::Escalate => {
                    // Clock skew points at persistent local misconfiguration.
                    if matches!(error, SwarmError::ClockOutOfSync) {
                        error!(poller = self.spec.name(), account = ?self.target.account, "aborting cycle: {error}");
                    } else {
                        warn!(poller = self.spec.name(), account = ?self.target.account, "aborting cycle: {error}");
                    }
                }
            }
            self.spec.next_poll_delay(state.failure_count)
        };

        if repair {
            info!(poller = self.spec.name(), account = ?self.target.account, "requesting capability refresh");
            if let Err(e) = self.client.refresh_capabilities(&self.target).await {
                warn!(poller = self.spec.name(), "capability refresh failed: {e}");
            }
        }
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::MockCrypto;
    use crate::swarm::MockSwarm;
    use async_trait::async_trait;
    use murmur_config::{ConfigError, ConfigSink, IncomingConfigMessage};
    use murmur_types::{AccountId, AuthMethod, ConfigVariant, JobDispatcher, SyncJob};
    use std::collections::BTreeMap;

    struct NullSink;

    #[async_trait]
    impl ConfigSink for NullSink {
        async fn handle_config_messages(
            &self,
            _account: &AccountId,
            _messages: Vec<IncomingConfigMessage>,
        ) -> Result<BTreeMap<ConfigVariant, u64>, ConfigError> {
            Ok(BTreeMap::new())
        }
    }

    struct NullDispatcher;

    impl JobDispatcher for NullDispatcher {
        fn dispatch(&self, _job: SyncJob, _durable: bool) {}
    }

    struct FirstNodeSpec {
        tuning: PollTuning,
    }

    impl PollerSpec for FirstNodeSpec {
        fn name(&self) -> &'static str {
            "test"
        }

        fn tuning(&self) -> &PollTuning {
            &self.tuning
        }

        fn namespaces(&self, _target: &SwarmTarget) -> Vec<Namespace> {
            vec![Namespace::Default]
        }

        fn select_node(&self, swarm: &[SwarmNode], _state: &PollState) -> Option<SwarmNode> {
            swarm.first().cloned()
        }
    }

    fn account() -> AccountId {
        AccountId::new(&format!("05{}", "ab".repeat(32))).unwrap()
    }

    fn target() -> SwarmTarget {
        SwarmTarget::new(account(), AuthMethod::AccountKey, vec![Namespace::Default])
    }

    fn processor() -> Arc<ResultProcessor> {
        Arc::new(ResultProcessor::new(
            Arc::new(MockCrypto::new()),
            Arc::new(NullSink),
            Arc::new(NullDispatcher),
        ))
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn poller_with(swarm: &MockSwarm, tuning: PollTuning) -> Poller<FirstNodeSpec> {
        init_tracing();
        Poller::new(
            FirstNodeSpec { tuning },
            target(),
            Arc::new(swarm.clone()),
            processor(),
        )
    }

    fn seeded_swarm() -> MockSwarm {
        let swarm = MockSwarm::new();
        swarm.set_swarm(vec![
            SwarmNode::new("1.1.1.1:1234", "aa"),
            SwarmNode::new("2.2.2.2:1234", "bb"),
        ]);
        swarm
    }

    #[tokio::test]
    async fn start_if_needed_is_idempotent() {
        let swarm = seeded_swarm();
        // Enormous interval: the loop polls once, then sleeps forever.
        let tuning = PollTuning {
            min_poll_interval_ms: 3_600_000,
            ..Default::default()
        };
        let poller = poller_with(&swarm, tuning);

        poller.start_if_needed().await;
        poller.start_if_needed().await;
        poller.start_if_needed().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // One loop, one poll.
        assert_eq!(swarm.poll_count(), 1);
        assert!(poller.is_polling().await);
        poller.stop().await;
    }

    #[tokio::test]
    async fn poll_once_without_start_is_a_no_op() {
        let swarm = seeded_swarm();
        let poller = poller_with(&swarm, PollTuning::default());
        assert!(poller.poll_once().await.is_none());
        assert_eq!(swarm.poll_count(), 0);
    }

    #[tokio::test]
    async fn stop_during_in_flight_poll_discards_result_and_schedules_nothing() {
        let swarm = seeded_swarm();
        let poller = Arc::new(poller_with(&swarm, PollTuning::default()));
        poller.inner.state.lock().await.is_polling = true;

        let release = swarm.hold_next_poll();
        let cycle = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.poll_once().await })
        };
        // Wait for the cycle to reach the held request, then stop.
        tokio::time::sleep(Duration::from_millis(50)).await;
        poller.stop().await;
        release.notify_one();

        // No delay returned: no timer would be scheduled.
        assert!(cycle.await.unwrap().is_none());
        assert!(!poller.is_polling().await);
        let state = poller.inner.state.lock().await;
        assert!(state.cursors.is_empty());
        assert_eq!(state.failure_count, 0);
        drop(state);

        // A fresh start works after the race.
        poller.start_if_needed().await;
        assert!(poller.is_polling().await);
        poller.stop().await;
    }

    #[tokio::test]
    async fn forced_rotation_after_node_poll_cap() {
        let swarm = seeded_swarm();
        let tuning = PollTuning {
            max_node_poll_count: 2,
            ..Default::default()
        };
        let poller = poller_with(&swarm, tuning);
        poller.inner.state.lock().await.is_polling = true;

        for _ in 0..3 {
            poller.poll_once().await.unwrap();
        }

        // Polls 1 and 2 reuse the selected node; poll 3 re-selects.
        let state = poller.inner.state.lock().await;
        assert_eq!(state.polls_on_current_node, 1);
        assert_eq!(swarm.poll_count(), 3);
    }

    #[tokio::test]
    async fn retryable_failure_backs_off_on_same_node() {
        let swarm = seeded_swarm();
        let poller = poller_with(&swarm, PollTuning::default());
        poller.inner.state.lock().await.is_polling = true;

        poller.poll_once().await.unwrap();
        let node_before = poller.inner.state.lock().await.current_node.clone();

        swarm.fail_next_poll(SwarmError::Timeout);
        let delay = poller.poll_once().await.unwrap();

        let state = poller.inner.state.lock().await;
        assert_eq!(state.failure_count, 1);
        assert_eq!(state.current_node, node_before);
        assert_eq!(delay, poller.inner.spec.next_poll_delay(1));
    }

    #[tokio::test]
    async fn cycle_fatal_failure_escalates_but_still_reschedules() {
        let swarm = seeded_swarm();
        let poller = poller_with(&swarm, PollTuning::default());
        poller.inner.state.lock().await.is_polling = true;

        swarm.fail_next_poll(SwarmError::RateLimited);
        let delay = poller.poll_once().await;

        assert_eq!(delay, Some(poller.inner.spec.next_poll_delay(1)));
        assert_eq!(poller.inner.state.lock().await.failure_count, 1);
    }

    #[tokio::test]
    async fn success_after_failures_resets_backoff() {
        let swarm = seeded_swarm();
        let poller = poller_with(&swarm, PollTuning::default());
        poller.inner.state.lock().await.is_polling = true;

        swarm.fail_next_poll(SwarmError::Network("reset".into()));
        poller.poll_once().await.unwrap();
        assert_eq!(poller.inner.state.lock().await.failure_count, 1);

        let delay = poller.poll_once().await.unwrap();
        assert_eq!(poller.inner.state.lock().await.failure_count, 0);
        assert_eq!(delay, poller.inner.spec.next_poll_delay(0));
    }

    #[tokio::test]
    async fn poll_requests_carry_per_namespace_budgets() {
        let swarm = seeded_swarm();
        let tuning = PollTuning {
            response_budget_bytes: 10_000,
            ..Default::default()
        };
        let poller = poller_with(&swarm, tuning);
        poller.inner.state.lock().await.is_polling = true;

        poller.poll_once().await.unwrap();

        let (_, request) = swarm.polls().remove(0);
        assert_eq!(request.max_response_bytes, 10_000);
        // The whole budget is split across exactly the queried namespaces.
        assert_eq!(
            request.namespace_budgets.keys().collect::<Vec<_>>(),
            vec![&Namespace::Default]
        );
        assert_eq!(request.namespace_budgets.values().sum::<usize>(), 10_000);
    }

    #[tokio::test]
    async fn get_swarm_failure_counts_as_cycle_failure() {
        let swarm = MockSwarm::new();
        let poller = poller_with(&swarm, PollTuning::default());
        poller.inner.state.lock().await.is_polling = true;

        // Empty swarm: NoSwarmNodes, retryable.
        let delay = poller.poll_once().await;
        assert_eq!(delay, Some(poller.inner.spec.next_poll_delay(1)));
        assert_eq!(swarm.poll_count(), 0);
    }
}
