//! Poller policy for group swarms.
//!
//! Groups poll their Info/Members/Keys config namespaces alongside messages
//! and deliberately spread load: a fresh random node every cycle instead of
//! the user poller's sticky node.

use crate::poller::{ErrorDirective, PollerSpec};
use crate::state::PollState;
use crate::tuning::PollTuning;
use murmur_types::{Namespace, SwarmError, SwarmNode, SwarmTarget};
use rand::seq::SliceRandom;
use std::time::Duration;

/// Policy for polling a group's swarm.
#[derive(Debug)]
pub struct GroupPollerSpec {
    tuning: PollTuning,
}

impl GroupPollerSpec {
    /// Create the spec with the given tuning.
    pub fn new(tuning: PollTuning) -> Self {
        Self { tuning }
    }
}

impl PollerSpec for GroupPollerSpec {
    fn name(&self) -> &'static str {
        "group"
    }

    fn tuning(&self) -> &PollTuning {
        &self.tuning
    }

    fn namespaces(&self, target: &SwarmTarget) -> Vec<Namespace> {
        if !target.namespaces.is_empty() {
            return target.namespaces.clone();
        }
        vec![
            Namespace::Default,
            Namespace::GroupInfo,
            Namespace::GroupMembers,
            Namespace::GroupKeys,
        ]
    }

    // Rotate every cycle.
    fn max_node_poll_count(&self) -> u32 {
        1
    }

    // Group swarms tolerate more replication lag than the user's own swarm:
    // failures climb the backoff curve twice as fast. The steady-state
    // interval (zero failures) is unchanged.
    fn next_poll_delay(&self, failure_count: u32) -> Duration {
        self.tuning.next_poll_delay(failure_count.saturating_mul(2))
    }

    fn select_node(&self, swarm: &[SwarmNode], _state: &PollState) -> Option<SwarmNode> {
        swarm.choose(&mut rand::thread_rng()).cloned()
    }

    // A node that failed should not be re-drawn next cycle just because the
    // rotation counter had not ticked over yet.
    fn handle_poll_error(&self, error: &SwarmError, _state: &PollState) -> ErrorDirective {
        if error.is_fatal_for_cycle() {
            ErrorDirective::Escalate
        } else if error.is_retryable() {
            ErrorDirective::RotateNode
        } else {
            ErrorDirective::Escalate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_types::{AccountId, AuthMethod};

    #[test]
    fn rotates_on_every_cycle() {
        let spec = GroupPollerSpec::new(PollTuning::default());
        assert_eq!(spec.max_node_poll_count(), 1);
    }

    #[test]
    fn failures_back_off_harder_than_steady_state() {
        let tuning = PollTuning::default();
        let spec = GroupPollerSpec::new(tuning.clone());
        assert_eq!(spec.next_poll_delay(0), tuning.next_poll_delay(0));
        assert_eq!(spec.next_poll_delay(1), tuning.next_poll_delay(2));
        assert!(spec.next_poll_delay(3) >= tuning.next_poll_delay(3));
    }

    #[test]
    fn retryable_failures_move_to_a_fresh_node() {
        let spec = GroupPollerSpec::new(PollTuning::default());
        let state = PollState::new();
        assert_eq!(
            spec.handle_poll_error(&SwarmError::Network("reset".into()), &state),
            ErrorDirective::RotateNode
        );
        assert_eq!(
            spec.handle_poll_error(&SwarmError::Timeout, &state),
            ErrorDirective::RotateNode
        );
        assert_eq!(
            spec.handle_poll_error(&SwarmError::ClockOutOfSync, &state),
            ErrorDirective::Escalate
        );
    }

    #[test]
    fn default_namespaces_cover_group_config() {
        let spec = GroupPollerSpec::new(PollTuning::default());
        let account = AccountId::new(&format!("03{}", "cd".repeat(32))).unwrap();
        let target = SwarmTarget::new(account, AuthMethod::GroupMember, vec![]);
        let namespaces = spec.namespaces(&target);
        assert!(namespaces.contains(&Namespace::GroupInfo));
        assert!(namespaces.contains(&Namespace::GroupKeys));
        assert!(!namespaces.contains(&Namespace::Contacts));
    }
}
