//! Storage tiers and the entries produced by a hierarchical listing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A storage class governing latency/cost trade-offs for an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Frequently accessed data, highest storage cost
    Hot,
    /// Infrequently accessed data
    Cool,
    /// Offline data that must be rehydrated before it can be read
    Archive,
}

impl Tier {
    /// All tiers, warmest first.
    pub const ALL: [Tier; 3] = [Tier::Hot, Tier::Cool, Tier::Archive];

    /// Parse a tier name, ignoring case and surrounding whitespace.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(name))
    }

    /// Canonical name of the tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "Hot",
            Self::Cool => "Cool",
            Self::Archive => "Archive",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("'{s}' must be either Hot, Cool or Archive"))
    }
}

/// Kind of a listed object.
///
/// Only block objects are leaf objects for migration purposes; everything
/// else is skipped without being counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Regular immutable object
    #[default]
    Block,
    /// Append-only object
    Append,
    /// Random-access page object
    Page,
    /// Zero-length placeholder whose key ends with the delimiter
    DirectoryMarker,
}

impl ObjectKind {
    /// Whether objects of this kind take part in tier migration.
    pub fn is_block(self) -> bool {
        matches!(self, Self::Block)
    }
}

/// A single object as reported by the listing operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Full object path within the container
    pub path: String,

    /// Size of the object in bytes
    pub size_bytes: u64,

    /// Object kind
    pub kind: ObjectKind,

    /// Current storage tier
    pub tier: Tier,

    /// Tier an archived object is already being rehydrated to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_rehydration: Option<Tier>,
}

impl ObjectRecord {
    /// Create a block object record.
    pub fn block(path: impl Into<String>, size_bytes: u64, tier: Tier) -> Self {
        Self {
            path: path.into(),
            size_bytes,
            kind: ObjectKind::Block,
            tier,
            pending_rehydration: None,
        }
    }

    /// Set the object kind.
    pub fn with_kind(mut self, kind: ObjectKind) -> Self {
        self.kind = kind;
        self
    }

    /// Mark the object as already pending rehydration to `target`.
    pub fn with_pending_rehydration(mut self, target: Tier) -> Self {
        self.pending_rehydration = Some(target);
        self
    }
}

/// One child of a prefix in a delimited listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingEntry {
    /// A deeper prefix (always ends with the delimiter)
    Prefix(String),
    /// A direct child object
    Object(ObjectRecord),
}
