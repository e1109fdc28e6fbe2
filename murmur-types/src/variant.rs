//! Config variants: the facets of synced state a config object can hold.

use crate::namespace::Namespace;
use serde::{Deserialize, Serialize};

/// One facet of multi-device-synced configuration.
///
/// Every live config object is keyed by (account, variant). `Local` is a
/// device-local settings blob that is dumped but never pushed to the swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfigVariant {
    /// The account's own profile (display name, picture).
    UserProfile,
    /// The account's contact list.
    Contacts,
    /// Per-conversation volatile info (read state).
    ConvoInfoVolatile,
    /// The account's joined groups.
    UserGroups,
    /// Group metadata (group-scoped).
    GroupInfo,
    /// Group membership (group-scoped).
    GroupMembers,
    /// Group key generations (group-scoped).
    GroupKeys,
    /// Device-local settings, never pushed.
    Local,
}

impl ConfigVariant {
    /// Every variant, in declaration order.
    pub const ALL: [ConfigVariant; 8] = [
        ConfigVariant::UserProfile,
        ConfigVariant::Contacts,
        ConfigVariant::ConvoInfoVolatile,
        ConfigVariant::UserGroups,
        ConfigVariant::GroupInfo,
        ConfigVariant::GroupMembers,
        ConfigVariant::GroupKeys,
        ConfigVariant::Local,
    ];

    /// The swarm namespace this variant syncs through, if any.
    pub fn namespace(self) -> Option<Namespace> {
        match self {
            ConfigVariant::UserProfile => Some(Namespace::UserProfile),
            ConfigVariant::Contacts => Some(Namespace::Contacts),
            ConfigVariant::ConvoInfoVolatile => Some(Namespace::ConvoInfoVolatile),
            ConfigVariant::UserGroups => Some(Namespace::UserGroups),
            ConfigVariant::GroupInfo => Some(Namespace::GroupInfo),
            ConfigVariant::GroupMembers => Some(Namespace::GroupMembers),
            ConfigVariant::GroupKeys => Some(Namespace::GroupKeys),
            ConfigVariant::Local => None,
        }
    }

    /// The variant syncing through a given namespace.
    pub fn from_namespace(namespace: Namespace) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.namespace() == Some(namespace))
    }

    /// Merge order across variants when a poll returns several config groups
    /// at once. Mirrors [`Namespace::processing_order`]; `Local` never
    /// arrives remotely and sorts last.
    pub fn processing_order(self) -> u8 {
        self.namespace()
            .and_then(Namespace::processing_order)
            .unwrap_or(u8::MAX)
    }

    /// Order in which pending pushes for one account are sent.
    ///
    /// Keys go first so devices can decrypt the Info/Members payloads that
    /// follow in the same batch.
    pub fn send_order(self) -> u8 {
        match self {
            ConfigVariant::GroupKeys => 0,
            ConfigVariant::UserProfile => 1,
            ConfigVariant::Contacts => 2,
            ConfigVariant::UserGroups => 3,
            ConfigVariant::GroupInfo => 4,
            ConfigVariant::GroupMembers => 5,
            ConfigVariant::ConvoInfoVolatile => 6,
            ConfigVariant::Local => u8::MAX,
        }
    }

    /// Order in which dumped variants are reconstructed at startup: user
    /// variants before group variants; within a group, Info and Members
    /// before Keys (Keys references the other two).
    pub fn load_order(self) -> u8 {
        match self {
            ConfigVariant::UserProfile => 0,
            ConfigVariant::Contacts => 1,
            ConfigVariant::ConvoInfoVolatile => 2,
            ConfigVariant::UserGroups => 3,
            ConfigVariant::Local => 4,
            ConfigVariant::GroupInfo => 5,
            ConfigVariant::GroupMembers => 6,
            ConfigVariant::GroupKeys => 7,
        }
    }

    /// Whether mutating this variant requires group admin authority.
    pub fn is_group_scoped(self) -> bool {
        matches!(
            self,
            ConfigVariant::GroupInfo | ConfigVariant::GroupMembers | ConfigVariant::GroupKeys
        )
    }

    /// Whether this variant is ever pushed to the swarm.
    pub fn is_pushed(self) -> bool {
        !matches!(self, ConfigVariant::Local)
    }
}
