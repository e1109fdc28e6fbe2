//! # murmur-poller
//!
//! The polling engine: per-target pollers that repeatedly query a target's
//! swarm for new messages and config deltas, with node rotation, backoff,
//! cursor tracking, and cross-node duplicate suppression.
//!
//! ## Shape
//!
//! A [`Poller`] is generic over a [`PollerSpec`] policy (user, group, or
//! community); the engine owns the poll loop, the spec decides namespaces,
//! node selection, and error handling. [`PollerManager`] keeps one poller per
//! target behind the object-safe [`ManagedPoller`] trait. Poll results flow
//! through [`ResultProcessor`] into the config sink and the job dispatcher.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod community;
mod crypto;
mod group;
mod manager;
mod poller;
mod results;
mod state;
mod swarm;
mod tuning;
mod user;

pub use community::CommunityPollerSpec;
pub use crypto::{EnvelopeCrypto, MockCrypto};
pub use group::GroupPollerSpec;
pub use manager::{ManagedPoller, PollerManager};
pub use poller::{ErrorDirective, Poller, PollerSpec};
pub use results::{ProcessOutcome, ResultProcessor};
pub use state::{HashFreshness, PollState, SeenRecords};
pub use swarm::{mock_hash, MockSwarm, SwarmClient};
pub use tuning::{PollTuning, TuningError};
pub use user::UserPollerSpec;
