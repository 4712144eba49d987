//! Core data types used throughout the nodepin library
//!
//! ## Overview
//!
//! - **Identifiers**: [`NodeId`] - the 20-byte binary name of a revision
//! - **Revisions**: [`RevisionNumber`] - the host's process-local index
//! - **Repository position**: [`WorkingParent`] - explicit "parent or unavailable"
//! - **Results**: [`SaveReport`] - what one pin store write changed
//!
//! ## Examples
//!
//! ```rust
//! use nodepin::types::NodeId;
//!
//! let node: NodeId = "0123456789abcdef0123456789abcdef01234567".parse().unwrap();
//! assert_eq!(node.short(), "0123456789ab");
//! assert!(!node.is_null());
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::PinError;

/// Size in bytes of one identifier, and of one record in the store file
pub const NODE_ID_LEN: usize = 20;

/// Number of hex characters in the short form of an identifier
pub const SHORT_HEX_LEN: usize = 12;

/// Fixed-size binary identifier naming a revision
///
/// Equality is byte equality. `Ord` is derived only so identifiers can live
/// in ordered sets and produce stable output; the order carries no meaning.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId([u8; NODE_ID_LEN]);

impl NodeId {
    /// The all-zero identifier, used by hosts for "no revision"
    pub const NULL: NodeId = NodeId([0u8; NODE_ID_LEN]);

    /// Wrap raw bytes
    pub const fn new(bytes: [u8; NODE_ID_LEN]) -> Self {
        NodeId(bytes)
    }

    /// Build an identifier from a slice of exactly [`NODE_ID_LEN`] bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; NODE_ID_LEN] = bytes.try_into().ok()?;
        Some(NodeId(array))
    }

    /// Parse the 40 character hex form
    pub fn from_hex(text: &str) -> crate::error::Result<Self> {
        let bytes = hex::decode(text.trim()).map_err(|_| PinError::InvalidNodeId(text.to_string()))?;
        NodeId::from_slice(&bytes).ok_or_else(|| PinError::InvalidNodeId(text.to_string()))
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    /// Full lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex prefix used in audit records and listings
    pub fn short(&self) -> String {
        hex::encode(&self.0[..SHORT_HEX_LEN / 2])
    }

    /// Whether this is the null identifier
    pub fn is_null(&self) -> bool {
        *self == NodeId::NULL
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.short())
    }
}

impl FromStr for NodeId {
    type Err = PinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeId::from_hex(s)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        NodeId::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

/// Short forms of a collection of identifiers, in iteration order
pub fn short_forms<'a>(nodes: impl IntoIterator<Item = &'a NodeId>) -> Vec<String> {
    nodes.into_iter().map(NodeId::short).collect()
}

/// Process-local revision number assigned by the host index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionNumber(pub u64);

impl fmt::Display for RevisionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RevisionNumber {
    fn from(rev: u64) -> Self {
        RevisionNumber(rev)
    }
}

/// Result of reading the working-copy parent
///
/// Reading the parent can fail for mundane reasons (no dirstate yet, I/O
/// error mid-write by another process). None of them may block a command,
/// so failure is a value here rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkingParent {
    /// The checkout is based on this revision
    Parent(NodeId),
    /// The parent could not be determined
    Unavailable,
}

impl WorkingParent {
    /// The parent identifier, if one was read and it is not null
    pub fn node(&self) -> Option<NodeId> {
        match self {
            WorkingParent::Parent(node) if !node.is_null() => Some(*node),
            _ => None,
        }
    }
}

/// Outcome of one pin store write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReport {
    /// Identifiers newly pinned by the caller
    pub newpin: BTreeSet<NodeId>,
    /// Identifiers the caller asked to release
    pub newunpin: BTreeSet<NodeId>,
    /// Pinned set as read under the lock, in file order
    pub before: Vec<NodeId>,
    /// Pinned set as written
    pub after: BTreeSet<NodeId>,
}

impl SaveReport {
    /// Whether the write changed the persisted set
    pub fn changed(&self) -> bool {
        self.before.len() != self.after.len() || self.before.iter().any(|n| !self.after.contains(n))
    }
}
