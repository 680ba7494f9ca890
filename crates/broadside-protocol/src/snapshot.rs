use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    AttachmentName, EntityKind, FrontierName, PlayerName, PropertyKey, PropertyValue,
    RelationshipTypeName, ResourceName, RuleName, TechName, TerritoryName, UnitId, ValueKind,
};

/// Full game state for initial client sync and save files.
///
/// Collections are emitted in name/id order, so two logically-equivalent
/// states encode to identical bytes (the checksum in `wire::state_hash`
/// depends on this).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub round: u32,
    pub players: Vec<PlayerSnapshot>,
    pub territories: Vec<TerritorySnapshot>,
    pub units: Vec<UnitSnapshot>,
    pub frontiers: Vec<FrontierSnapshot>,
    pub relationships: Vec<RelationshipSnapshot>,
    pub properties: BTreeMap<PropertyKey, PropertyValue>,
    pub schema: Vec<SchemaEntry>,
    /// Dice roller state, for determinism verification across processes.
    pub dice_state: [u8; 32],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub name: PlayerName,
    pub resources: BTreeMap<ResourceName, i64>,
    pub frontier: FrontierName,
    pub techs: Vec<TechName>,
    /// Units in the player's mobilization pool.
    pub units: Vec<UnitId>,
    #[serde(default)]
    pub attachments: Vec<AttachmentSnapshot>,
    #[serde(default)]
    pub props: BTreeMap<PropertyKey, PropertyValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerritorySnapshot {
    pub name: TerritoryName,
    pub owner: Option<PlayerName>,
    #[serde(default)]
    pub is_water: bool,
    pub units: Vec<UnitId>,
    #[serde(default)]
    pub attachments: Vec<AttachmentSnapshot>,
    #[serde(default)]
    pub props: BTreeMap<PropertyKey, PropertyValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub id: UnitId,
    pub unit_type: String,
    pub owner: PlayerName,
    pub hits: u32,
    #[serde(default)]
    pub props: BTreeMap<PropertyKey, PropertyValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttachmentSnapshot {
    pub name: AttachmentName,
    pub properties: BTreeMap<PropertyKey, PropertyValue>,
    /// Declared defaults, used by reset changes.
    pub defaults: BTreeMap<PropertyKey, PropertyValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrontierSnapshot {
    pub name: FrontierName,
    pub rules: Vec<RuleName>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSnapshot {
    pub a: PlayerName,
    pub b: PlayerName,
    pub relationship: RelationshipTypeName,
}

/// One declared entry of the static property schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub kind: EntityKind,
    pub key: PropertyKey,
    pub value_kind: ValueKind,
}
