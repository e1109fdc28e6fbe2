//! # murmur-types
//!
//! Shared vocabulary for the murmur swarm sync core.
//!
//! This crate provides the foundational types used across all murmur crates:
//! - [`AccountId`], [`MessageHash`], [`SwarmNode`], [`SwarmTarget`] - identity and addressing
//! - [`Namespace`], [`ConfigVariant`] - swarm storage partitions and their policy tables
//! - [`PollRequest`], [`PollResponse`], [`DecodedEnvelope`] - poll wire types
//! - [`SwarmError`], [`MessageError`] - the error taxonomy
//! - [`SyncJob`], [`JobDispatcher`] - the background-job hand-off contract

#![warn(missing_docs)]
#![warn(clippy::all)]

mod dispatch;
mod error;
mod ids;
mod namespace;
mod swarm;
mod variant;

pub use dispatch::{JobDispatcher, SyncJob};
pub use error::{MessageError, SwarmError};
pub use ids::{AccountId, AuthMethod, IdError, MessageHash, SwarmNode, SwarmTarget};
pub use namespace::{allocate_response_budget, Namespace};
pub use swarm::{
    ConfigDumpRecord, DecodedEnvelope, NamespaceBatch, PollRequest, PollResponse, RawSwarmItem,
};
pub use variant::ConfigVariant;
