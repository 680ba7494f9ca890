use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! name_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

name_id!(
    /// Stable player identity (nation name). Resolved against live state at
    /// perform time, never held as a direct reference.
    PlayerName
);
name_id!(
    /// Stable territory identity (includes sea zones).
    TerritoryName
);
name_id!(ResourceName);
name_id!(FrontierName);
name_id!(RuleName);
name_id!(TechName);
name_id!(RelationshipTypeName);
name_id!(AttachmentName);
name_id!(
    /// Key into a property bag (game properties, attachment properties,
    /// schema-validated entity properties).
    PropertyKey
);

/// Stable per-unit identity, assigned once by the host when the unit is
/// created and never reused within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// The kinds of entity that can hold units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HolderKind {
    Territory,
    /// A player's mobilization pool (units produced but not yet placed).
    Player,
}

/// A unit holder, resolved by name at perform time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HolderRef {
    pub kind: HolderKind,
    pub name: String,
}

impl HolderRef {
    pub fn territory(name: impl Into<String>) -> Self {
        Self {
            kind: HolderKind::Territory,
            name: name.into(),
        }
    }

    pub fn player(name: impl Into<String>) -> Self {
        Self {
            kind: HolderKind::Player,
            name: name.into(),
        }
    }
}

impl fmt::Display for HolderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            HolderKind::Territory => write!(f, "territory {}", self.name),
            HolderKind::Player => write!(f, "player {}", self.name),
        }
    }
}

/// The kinds of entity that attachments can hang off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttachableKind {
    Territory,
    Player,
}

/// An attachable entity, resolved by name at perform time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttachableRef {
    pub kind: AttachableKind,
    pub name: String,
}

impl AttachableRef {
    pub fn territory(name: impl Into<String>) -> Self {
        Self {
            kind: AttachableKind::Territory,
            name: name.into(),
        }
    }

    pub fn player(name: impl Into<String>) -> Self {
        Self {
            kind: AttachableKind::Player,
            name: name.into(),
        }
    }
}

impl fmt::Display for AttachableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AttachableKind::Territory => write!(f, "territory {}", self.name),
            AttachableKind::Player => write!(f, "player {}", self.name),
        }
    }
}

/// Entity kinds addressable by the generic property fallback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Territory,
    Player,
    Unit,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Territory => f.write_str("territory"),
            EntityKind::Player => f.write_str("player"),
            EntityKind::Unit => f.write_str("unit"),
        }
    }
}
