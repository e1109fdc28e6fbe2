//! Poller policy for the user's own account.
//!
//! The busiest poller: it carries the default message namespace plus every
//! user-level config namespace. Sticks to one node until the engine's
//! rotation cap, then picks a random replacement.

use crate::poller::{ErrorDirective, PollerSpec};
use crate::state::PollState;
use crate::tuning::PollTuning;
use murmur_types::{Namespace, SwarmError, SwarmNode, SwarmTarget};
use rand::seq::SliceRandom;

/// Policy for polling the user's own swarm.
#[derive(Debug)]
pub struct UserPollerSpec {
    tuning: PollTuning,
}

impl UserPollerSpec {
    /// Create the spec with the given tuning.
    pub fn new(tuning: PollTuning) -> Self {
        Self { tuning }
    }
}

impl PollerSpec for UserPollerSpec {
    fn name(&self) -> &'static str {
        "user"
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
            Namespace::UserProfile,
            Namespace::Contacts,
            Namespace::ConvoInfoVolatile,
            Namespace::UserGroups,
        ]
    }

    fn select_node(&self, swarm: &[SwarmNode], _state: &PollState) -> Option<SwarmNode> {
        swarm.choose(&mut rand::thread_rng()).cloned()
    }

    fn handle_poll_error(&self, error: &SwarmError, state: &PollState) -> ErrorDirective {
        if error.is_fatal_for_cycle() {
            ErrorDirective::Escalate
        } else if error.is_retryable() {
            // One transient failure can be the network's fault; a second in a
            // row on the same node means the node itself is suspect.
            if state.failure_count >= 2 && state.current_node.is_some() {
                ErrorDirective::RotateNode
            } else {
                ErrorDirective::Retry
            }
        } else {
            ErrorDirective::Escalate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_types::{AccountId, AuthMethod};
    use std::time::Duration;

    fn target(namespaces: Vec<Namespace>) -> SwarmTarget {
        let account = AccountId::new(&format!("05{}", "ab".repeat(32))).unwrap();
        SwarmTarget::new(account, AuthMethod::AccountKey, namespaces)
    }

    #[test]
    fn zero_failures_polls_at_three_seconds() {
        let spec = UserPollerSpec::new(PollTuning {
            min_poll_interval_ms: 3_000,
            ..Default::default()
        });
        assert_eq!(spec.next_poll_delay(0), Duration::from_secs_f64(3.0));
    }

    #[test]
    fn default_namespaces_cover_messages_and_user_config() {
        let spec = UserPollerSpec::new(PollTuning::default());
        let namespaces = spec.namespaces(&target(vec![]));
        assert!(namespaces.contains(&Namespace::Default));
        assert!(namespaces.contains(&Namespace::Contacts));
        assert!(!namespaces.contains(&Namespace::GroupKeys));
    }

    #[test]
    fn explicit_target_namespaces_win() {
        let spec = UserPollerSpec::new(PollTuning::default());
        let namespaces = spec.namespaces(&target(vec![Namespace::Default]));
        assert_eq!(namespaces, vec![Namespace::Default]);
    }

    #[test]
    fn second_retryable_failure_rotates_the_node() {
        let spec = UserPollerSpec::new(PollTuning::default());
        let mut state = PollState::new();
        state.rotate_to(SwarmNode::new("1.1.1.1:1234", "aa"));

        state.failure_count = 1;
        assert_eq!(
            spec.handle_poll_error(&SwarmError::Timeout, &state),
            ErrorDirective::Retry
        );

        state.failure_count = 2;
        assert_eq!(
            spec.handle_poll_error(&SwarmError::Timeout, &state),
            ErrorDirective::RotateNode
        );
        assert_eq!(
            spec.handle_poll_error(&SwarmError::RateLimited, &state),
            ErrorDirective::Escalate
        );
    }

    #[test]
    fn rotation_requires_a_held_node() {
        let spec = UserPollerSpec::new(PollTuning::default());
        let mut state = PollState::new();
        state.failure_count = 5;
        // No node is held yet, so there is nothing to rotate away from.
        assert_eq!(
            spec.handle_poll_error(&SwarmError::NoSwarmNodes("05aa".into()), &state),
            ErrorDirective::Retry
        );
    }

    #[test]
    fn selects_some_node_from_a_nonempty_swarm() {
        let spec = UserPollerSpec::new(PollTuning::default());
        let swarm = vec![
            SwarmNode::new("1.1.1.1:1234", "aa"),
            SwarmNode::new("2.2.2.2:1234", "bb"),
        ];
        let node = spec.select_node(&swarm, &PollState::new()).unwrap();
        assert!(swarm.contains(&node));
        assert!(spec.select_node(&[], &PollState::new()).is_none());
    }
}
