//! Swarm storage namespaces and their static policy table.
//!
//! A namespace is a logical partition within swarm storage. Each namespace
//! carries fixed policy: whether polls for it must be authenticated, whether
//! its items are deduplicated, the order config namespaces are merged in, and
//! the priority weight used when a fixed response byte budget is split across
//! several namespaces in one batch poll.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A logical partition of swarm-stored data.
///
/// The integer tags are part of the wire protocol and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i16)]
pub enum Namespace {
    /// Ordinary one-to-one and group messages.
    Default = 0,
    /// The account's own profile config.
    UserProfile = 2,
    /// The account's contacts config.
    Contacts = 3,
    /// Per-conversation volatile info (read/unread state, last-read stamps).
    ConvoInfoVolatile = 4,
    /// The account's joined-groups config.
    UserGroups = 5,
    /// Messages for legacy closed groups.
    LegacyGroup = -10,
    /// Group metadata config (name, description, display picture).
    GroupInfo = 11,
    /// Group membership config.
    GroupMembers = 12,
    /// Group encryption key generations.
    GroupKeys = 13,
}

impl Namespace {
    /// Every namespace, in tag order.
    pub const ALL: [Namespace; 9] = [
        Namespace::LegacyGroup,
        Namespace::Default,
        Namespace::UserProfile,
        Namespace::Contacts,
        Namespace::ConvoInfoVolatile,
        Namespace::UserGroups,
        Namespace::GroupInfo,
        Namespace::GroupMembers,
        Namespace::GroupKeys,
    ];

    /// The wire tag for this namespace.
    pub fn tag(self) -> i16 {
        self as i16
    }

    /// Look up a namespace by wire tag.
    pub fn from_tag(tag: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.tag() == tag)
    }

    /// Whether polls for this namespace must carry authentication.
    ///
    /// Legacy group messages predate namespace auth and are fetched unsigned.
    pub fn requires_auth(self) -> bool {
        !matches!(self, Namespace::LegacyGroup)
    }

    /// Whether items in this namespace are deduplicated against
    /// previously-seen hashes before dispatch.
    ///
    /// Config namespaces handle their own idempotence inside the merge, so
    /// only message namespaces dedupe at the poll layer.
    pub fn dedupe_messages(self) -> bool {
        matches!(self, Namespace::Default | Namespace::LegacyGroup)
    }

    /// Whether this namespace carries config deltas (routed to the config
    /// store) rather than message envelopes.
    pub fn is_config(self) -> bool {
        self.processing_order().is_some()
    }

    /// Merge order for config namespaces.
    ///
    /// Profile and contacts merge before group lists, which merge before
    /// volatile conversation info, so that volatile entries never reference a
    /// conversation that does not exist yet. Non-config namespaces have no
    /// processing order.
    pub fn processing_order(self) -> Option<u8> {
        match self {
            Namespace::UserProfile => Some(0),
            Namespace::Contacts => Some(1),
            Namespace::UserGroups => Some(2),
            Namespace::GroupInfo => Some(3),
            Namespace::GroupMembers => Some(4),
            Namespace::GroupKeys => Some(5),
            Namespace::ConvoInfoVolatile => Some(6),
            Namespace::Default | Namespace::LegacyGroup => None,
        }
    }

    /// Whether results for this namespace are applied synchronously during
    /// the poll cycle (config merges) rather than handed to the background
    /// job queue (regular messages).
    pub fn handled_synchronously(self) -> bool {
        self.is_config()
    }

    /// Priority weight used to split a fixed response byte budget across
    /// namespaces polled together. Higher weight, larger share.
    ///
    /// Config namespaces are small and load-bearing, so they outrank the
    /// message firehose.
    pub fn size_share_priority(self) -> u32 {
        match self {
            Namespace::GroupKeys => 10,
            Namespace::UserProfile
            | Namespace::Contacts
            | Namespace::UserGroups
            | Namespace::GroupInfo
            | Namespace::GroupMembers => 8,
            Namespace::ConvoInfoVolatile => 4,
            Namespace::Default => 2,
            Namespace::LegacyGroup => 1,
        }
    }
}

/// Split `total_bytes` of response budget across `namespaces` in proportion
/// to each namespace's [`Namespace::size_share_priority`].
///
/// Remainder bytes from integer division are granted to the highest-priority
/// namespace so the full budget is always allocated.
pub fn allocate_response_budget(
    namespaces: &[Namespace],
    total_bytes: usize,
) -> HashMap<Namespace, usize> {
    let mut shares = HashMap::new();
    if namespaces.is_empty() || total_bytes == 0 {
        return shares;
    }

    let weight_sum: u64 = namespaces
        .iter()
        .map(|n| n.size_share_priority() as u64)
        .sum();
    if weight_sum == 0 {
        return shares;
    }

    let mut allocated = 0usize;
    for ns in namespaces {
        let share =
            ((total_bytes as u64 * ns.size_share_priority() as u64) / weight_sum) as usize;
        allocated += share;
        shares.insert(*ns, share);
    }

    // Hand leftover bytes to the highest-priority namespace.
    let leftover = total_bytes - allocated;
    if leftover > 0 {
        if let Some(top) = namespaces
            .iter()
            .max_by_key(|n| n.size_share_priority())
            .copied()
        {
            *shares.entry(top).or_insert(0) += leftover;
        }
    }

    shares
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for ns in Namespace::ALL {
            assert_eq!(Namespace::from_tag(ns.tag()), Some(ns));
        }
        assert_eq!(Namespace::from_tag(99), None);
    }

    #[test]
    fn config_namespaces_have_processing_order() {
        assert!(Namespace::Contacts.is_config());
        assert!(Namespace::GroupKeys.is_config());
        assert!(!Namespace::Default.is_config());
        assert!(!Namespace::LegacyGroup.is_config());
    }

    #[test]
    fn contacts_merge_before_groups_before_volatile() {
        let contacts = Namespace::Contacts.processing_order().unwrap();
        let groups = Namespace::UserGroups.processing_order().unwrap();
        let volatile = Namespace::ConvoInfoVolatile.processing_order().unwrap();
        assert!(contacts < groups);
        assert!(groups < volatile);
    }

    #[test]
    fn group_info_and_members_before_keys() {
        let info = Namespace::GroupInfo.processing_order().unwrap();
        let members = Namespace::GroupMembers.processing_order().unwrap();
        let keys = Namespace::GroupKeys.processing_order().unwrap();
        assert!(info < keys);
        assert!(members < keys);
    }

    #[test]
    fn only_message_namespaces_dedupe() {
        assert!(Namespace::Default.dedupe_messages());
        assert!(Namespace::LegacyGroup.dedupe_messages());
        assert!(!Namespace::Contacts.dedupe_messages());
    }

    #[test]
    fn legacy_groups_do_not_require_auth() {
        assert!(!Namespace::LegacyGroup.requires_auth());
        assert!(Namespace::Default.requires_auth());
        assert!(Namespace::GroupKeys.requires_auth());
    }

    #[test]
    fn budget_allocates_everything() {
        let namespaces = vec![
            Namespace::Default,
            Namespace::Contacts,
            Namespace::UserProfile,
        ];
        let shares = allocate_response_budget(&namespaces, 10_000);
        let total: usize = shares.values().sum();
        assert_eq!(total, 10_000);
    }

    #[test]
    fn budget_favors_config_over_messages() {
        let namespaces = vec![Namespace::Default, Namespace::Contacts];
        let shares = allocate_response_budget(&namespaces, 10_000);
        assert!(shares[&Namespace::Contacts] > shares[&Namespace::Default]);
    }

    #[test]
    fn budget_empty_inputs() {
        assert!(allocate_response_budget(&[], 10_000).is_empty());
        assert!(allocate_response_budget(&[Namespace::Default], 0).is_empty());
    }
}
