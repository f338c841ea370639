//! Location hierarchy types
//!
//! River → Stretch → Drain → Catchment → Village. Each level is its own
//! struct with the fields that level actually has; `LocationNode` is the
//! tagged union handed around by the catalog and the resolver.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a location at any level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(pub String);

impl LocationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for LocationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// LEVELS
// ============================================================================

/// Hierarchy level, ordered parent-to-child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    River,
    Stretch,
    Drain,
    Catchment,
    Village,
}

impl Level {
    /// All levels, root first.
    pub const ALL: [Level; 5] = [
        Level::River,
        Level::Stretch,
        Level::Drain,
        Level::Catchment,
        Level::Village,
    ];

    /// Position in `ALL` (0 = river).
    pub fn index(self) -> usize {
        match self {
            Level::River => 0,
            Level::Stretch => 1,
            Level::Drain => 2,
            Level::Catchment => 3,
            Level::Village => 4,
        }
    }

    pub fn parent(self) -> Option<Level> {
        match self {
            Level::River => None,
            Level::Stretch => Some(Level::River),
            Level::Drain => Some(Level::Stretch),
            Level::Catchment => Some(Level::Drain),
            Level::Village => Some(Level::Catchment),
        }
    }

    pub fn child(self) -> Option<Level> {
        match self {
            Level::River => Some(Level::Stretch),
            Level::Stretch => Some(Level::Drain),
            Level::Drain => Some(Level::Catchment),
            Level::Catchment => Some(Level::Village),
            Level::Village => None,
        }
    }

    /// Every level strictly below this one, nearest first.
    pub fn downstream(self) -> impl Iterator<Item = Level> {
        Level::ALL.into_iter().skip(self.index() + 1)
    }

    pub fn is_below(self, other: Level) -> bool {
        self.index() > other.index()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::River => "river",
            Level::Stretch => "stretch",
            Level::Drain => "drain",
            Level::Catchment => "catchment",
            Level::Village => "village",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// NODES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct River {
    pub id: LocationId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stretch {
    pub id: LocationId,
    pub name: String,
    pub river_id: LocationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drain {
    pub id: LocationId,
    pub name: String,
    pub stretch_id: LocationId,
    /// Drain number as published by the catalog service
    pub drain_no: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catchment {
    pub id: LocationId,
    pub name: String,
    pub drain_id: LocationId,
}

/// A selectable village.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Village {
    pub id: LocationId,
    pub name: String,
    pub drain_id: LocationId,
    /// Owning catchment, when the catalog assigns one
    #[serde(default)]
    pub catchment_id: Option<LocationId>,
    pub drain_no: u32,
    pub population: u64,
    pub district: String,
    pub sub_district: String,
    pub state: String,
}

/// One record of the location hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum LocationNode {
    River(River),
    Stretch(Stretch),
    Drain(Drain),
    Catchment(Catchment),
    Village(Village),
}

impl LocationNode {
    pub fn id(&self) -> &LocationId {
        match self {
            LocationNode::River(n) => &n.id,
            LocationNode::Stretch(n) => &n.id,
            LocationNode::Drain(n) => &n.id,
            LocationNode::Catchment(n) => &n.id,
            LocationNode::Village(n) => &n.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            LocationNode::River(n) => &n.name,
            LocationNode::Stretch(n) => &n.name,
            LocationNode::Drain(n) => &n.name,
            LocationNode::Catchment(n) => &n.name,
            LocationNode::Village(n) => &n.name,
        }
    }

    pub fn level(&self) -> Level {
        match self {
            LocationNode::River(_) => Level::River,
            LocationNode::Stretch(_) => Level::Stretch,
            LocationNode::Drain(_) => Level::Drain,
            LocationNode::Catchment(_) => Level::Catchment,
            LocationNode::Village(_) => Level::Village,
        }
    }

    /// Parent reference. Rivers are roots; villages answer with their drain,
    /// since that is the level they are fetched under.
    pub fn parent_id(&self) -> Option<&LocationId> {
        match self {
            LocationNode::River(_) => None,
            LocationNode::Stretch(n) => Some(&n.river_id),
            LocationNode::Drain(n) => Some(&n.stretch_id),
            LocationNode::Catchment(n) => Some(&n.drain_id),
            LocationNode::Village(n) => Some(&n.drain_id),
        }
    }

    pub fn as_village(&self) -> Option<&Village> {
        match self {
            LocationNode::Village(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_village(self) -> Option<Village> {
        match self {
            LocationNode::Village(v) => Some(v),
            _ => None,
        }
    }
}
