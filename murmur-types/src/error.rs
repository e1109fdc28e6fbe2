//! Error taxonomy for murmur.

use thiserror::Error;

/// Errors surfaced by swarm poll requests.
///
/// The classification methods drive the poller's retry policy: retryable
/// errors back off and try again, cycle-fatal errors abort the current cycle
/// before rescheduling, and `MissingCapability` triggers the one-shot
/// capability repair flow.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SwarmError {
    /// The node rate limited us.
    #[error("rate limited by swarm node")]
    RateLimited,

    /// Our clock disagrees with the swarm beyond tolerance.
    #[error("local clock out of sync with swarm")]
    ClockOutOfSync,

    /// The request's authentication was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The server requires a capability our credential lacks.
    #[error("missing capability: {0}")]
    MissingCapability(String),

    /// Generic transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// No nodes are known for the target's swarm.
    #[error("no swarm nodes available for {0}")]
    NoSwarmNodes(String),
}

impl SwarmError {
    /// Retryable with backoff against the same or another node.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SwarmError::Network(_) | SwarmError::Timeout | SwarmError::NoSwarmNodes(_)
        )
    }

    /// Fatal for the current cycle: do not quietly retry the identical
    /// request, but still reschedule per backoff.
    pub fn is_fatal_for_cycle(&self) -> bool {
        matches!(self, SwarmError::RateLimited | SwarmError::ClockOutOfSync)
    }
}

/// Per-item failures while decoding, authenticating, or decrypting one
/// polled message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessageError {
    /// The message hash was already processed.
    #[error("duplicate message")]
    Duplicate,

    /// A control message we already handled.
    #[error("duplicate control message")]
    DuplicateControl,

    /// Our own outgoing message echoed back by the swarm.
    #[error("self-send")]
    SelfSend,

    /// The envelope could not be parsed.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The envelope could not be decrypted or authenticated.
    #[error("decrypt failed: {0}")]
    Decrypt(String),
}

impl MessageError {
    /// Expected steady-state noise from swarm replication: swallowed
    /// silently, never logged as an error.
    pub fn is_expected_noise(&self) -> bool {
        matches!(
            self,
            MessageError::Duplicate | MessageError::DuplicateControl | MessageError::SelfSend
        )
    }
}
