//! Core identifier types
//!
//! The chat platform supplies both identities; Jukebird treats them as
//! opaque. `GroupId` is the unit of isolation for one voice session.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a call group (a Discord guild)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for GroupId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Identity of a voice channel within a call group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef(pub u64);

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChannelRef {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
