//! Poller policy for community rooms.
//!
//! Community rooms live on open servers: only the default message namespace
//! is polled, blinded auth is used, and a missing-capability rejection
//! triggers the engine's one-shot capability repair instead of escalating.

use crate::poller::{ErrorDirective, PollerSpec};
use crate::state::PollState;
use crate::tuning::PollTuning;
use murmur_types::{Namespace, SwarmError, SwarmNode, SwarmTarget};
use rand::seq::SliceRandom;

/// Policy for polling a community room.
#[derive(Debug)]
pub struct CommunityPollerSpec {
    tuning: PollTuning,
}

impl CommunityPollerSpec {
    /// Create the spec with the given tuning.
    pub fn new(tuning: PollTuning) -> Self {
        Self { tuning }
    }
}

impl PollerSpec for CommunityPollerSpec {
    fn name(&self) -> &'static str {
        "community"
    }

    fn tuning(&self) -> &PollTuning {
        &self.tuning
    }

    fn namespaces(&self, _target: &SwarmTarget) -> Vec<Namespace> {
        vec![Namespace::Default]
    }

    fn select_node(&self, swarm: &[SwarmNode], _state: &PollState) -> Option<SwarmNode> {
        swarm.choose(&mut rand::thread_rng()).cloned()
    }

    fn handle_poll_error(&self, error: &SwarmError, _state: &PollState) -> ErrorDirective {
        match error {
            // The server wants a capability our blinded credential lacks;
            // repairable out of band. The engine latches this to once per
            // failure streak.
            SwarmError::MissingCapability(_) => ErrorDirective::RepairCapabilities,
            _ if error.is_fatal_for_cycle() => ErrorDirective::Escalate,
            _ if error.is_retryable() => ErrorDirective::Retry,
            _ => ErrorDirective::Escalate,
        }
    }
}
