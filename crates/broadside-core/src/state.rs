use std::collections::{BTreeMap, BTreeSet};

use broadside_protocol::{
    AttachmentName, AttachmentSnapshot, FrontierName, FrontierSnapshot, PlayerName,
    PlayerSnapshot, PropertyKey, PropertyValue, RelationshipSnapshot, RelationshipTypeName,
    ResourceName, RuleName, StateSnapshot, TechName, TerritoryName, TerritorySnapshot, UnitId,
    UnitSnapshot,
};

use crate::schema::PropertySchema;

/// An attachment: a named bag of typed properties hanging off a territory or
/// player, with declared defaults that reset changes restore.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attachment {
    pub properties: BTreeMap<PropertyKey, PropertyValue>,
    pub defaults: BTreeMap<PropertyKey, PropertyValue>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Player {
    pub resources: BTreeMap<ResourceName, i64>,
    pub frontier: FrontierName,
    pub techs: BTreeSet<TechName>,
    /// Mobilization pool: units produced but not yet placed.
    pub units: BTreeSet<UnitId>,
    pub attachments: BTreeMap<AttachmentName, Attachment>,
    pub props: BTreeMap<PropertyKey, PropertyValue>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Territory {
    pub owner: Option<PlayerName>,
    pub is_water: bool,
    pub units: BTreeSet<UnitId>,
    pub attachments: BTreeMap<AttachmentName, Attachment>,
    pub props: BTreeMap<PropertyKey, PropertyValue>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Unit {
    pub unit_type: String,
    pub owner: PlayerName,
    pub hits: u32,
    pub props: BTreeMap<PropertyKey, PropertyValue>,
}

/// The authoritative world state.
///
/// Every store is keyed by stable name or id and backed by a `BTreeMap`, so
/// iteration and serialization order is deterministic: two processes holding
/// logically-equivalent states produce bit-identical snapshots. Nothing
/// outside the engine module mutates these stores; rule callers construct
/// changes instead.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GameState {
    pub(crate) round: u32,
    pub(crate) players: BTreeMap<PlayerName, Player>,
    pub(crate) territories: BTreeMap<TerritoryName, Territory>,
    pub(crate) units: BTreeMap<UnitId, Unit>,
    pub(crate) frontiers: BTreeMap<FrontierName, BTreeSet<RuleName>>,
    pub(crate) relationships: BTreeMap<(PlayerName, PlayerName), RelationshipTypeName>,
    pub(crate) properties: BTreeMap<PropertyKey, PropertyValue>,
    pub(crate) schema: PropertySchema,
}

impl GameState {
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn advance_round(&mut self) {
        self.round += 1;
    }

    pub fn player(&self, name: &PlayerName) -> Option<&Player> {
        self.players.get(name)
    }

    pub fn territory(&self, name: &TerritoryName) -> Option<&Territory> {
        self.territories.get(name)
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    pub fn frontier(&self, name: &FrontierName) -> Option<&BTreeSet<RuleName>> {
        self.frontiers.get(name)
    }

    /// Relationship between two players; argument order does not matter.
    pub fn relationship(&self, a: &PlayerName, b: &PlayerName) -> Option<&RelationshipTypeName> {
        let key = broadside_protocol::ordered_pair(a.clone(), b.clone());
        self.relationships.get(&key)
    }

    pub fn property(&self, key: &PropertyKey) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn schema(&self) -> &PropertySchema {
        &self.schema
    }

    pub fn player_names(&self) -> impl Iterator<Item = &PlayerName> {
        self.players.keys()
    }

    pub fn territory_names(&self) -> impl Iterator<Item = &TerritoryName> {
        self.territories.keys()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Full serializable mirror of this state. `dice_state` is zeroed here;
    /// `HostEngine::snapshot` overlays the live roller state, and checksums
    /// hash the zeroed form so mirrors (which never hold the roller) agree.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            round: self.round,
            players: self
                .players
                .iter()
                .map(|(name, p)| PlayerSnapshot {
                    name: name.clone(),
                    resources: p.resources.clone(),
                    frontier: p.frontier.clone(),
                    techs: p.techs.iter().cloned().collect(),
                    units: p.units.iter().copied().collect(),
                    attachments: snapshot_attachments(&p.attachments),
                    props: p.props.clone(),
                })
                .collect(),
            territories: self
                .territories
                .iter()
                .map(|(name, t)| TerritorySnapshot {
                    name: name.clone(),
                    owner: t.owner.clone(),
                    is_water: t.is_water,
                    units: t.units.iter().copied().collect(),
                    attachments: snapshot_attachments(&t.attachments),
                    props: t.props.clone(),
                })
                .collect(),
            units: self
                .units
                .iter()
                .map(|(id, u)| UnitSnapshot {
                    id: *id,
                    unit_type: u.unit_type.clone(),
                    owner: u.owner.clone(),
                    hits: u.hits,
                    props: u.props.clone(),
                })
                .collect(),
            frontiers: self
                .frontiers
                .iter()
                .map(|(name, rules)| FrontierSnapshot {
                    name: name.clone(),
                    rules: rules.iter().cloned().collect(),
                })
                .collect(),
            relationships: self
                .relationships
                .iter()
                .map(|((a, b), rel)| RelationshipSnapshot {
                    a: a.clone(),
                    b: b.clone(),
                    relationship: rel.clone(),
                })
                .collect(),
            properties: self.properties.clone(),
            schema: self.schema.to_entries(),
            dice_state: [0; 32],
        }
    }

    /// Rebuild a state from a snapshot. The mirror side of `snapshot`.
    pub fn from_snapshot(snapshot: &StateSnapshot) -> GameState {
        GameState {
            round: snapshot.round,
            players: snapshot
                .players
                .iter()
                .map(|p| {
                    (
                        p.name.clone(),
                        Player {
                            resources: p.resources.clone(),
                            frontier: p.frontier.clone(),
                            techs: p.techs.iter().cloned().collect(),
                            units: p.units.iter().copied().collect(),
                            attachments: restore_attachments(&p.attachments),
                            props: p.props.clone(),
                        },
                    )
                })
                .collect(),
            territories: snapshot
                .territories
                .iter()
                .map(|t| {
                    (
                        t.name.clone(),
                        Territory {
                            owner: t.owner.clone(),
                            is_water: t.is_water,
                            units: t.units.iter().copied().collect(),
                            attachments: restore_attachments(&t.attachments),
                            props: t.props.clone(),
                        },
                    )
                })
                .collect(),
            units: snapshot
                .units
                .iter()
                .map(|u| {
                    (
                        u.id,
                        Unit {
                            unit_type: u.unit_type.clone(),
                            owner: u.owner.clone(),
                            hits: u.hits,
                            props: u.props.clone(),
                        },
                    )
                })
                .collect(),
            frontiers: snapshot
                .frontiers
                .iter()
                .map(|f| (f.name.clone(), f.rules.iter().cloned().collect()))
                .collect(),
            relationships: snapshot
                .relationships
                .iter()
                .map(|r| ((r.a.clone(), r.b.clone()), r.relationship.clone()))
                .collect(),
            properties: snapshot.properties.clone(),
            schema: PropertySchema::from_entries(&snapshot.schema),
        }
    }
}

fn snapshot_attachments(
    attachments: &BTreeMap<AttachmentName, Attachment>,
) -> Vec<AttachmentSnapshot> {
    attachments
        .iter()
        .map(|(name, a)| AttachmentSnapshot {
            name: name.clone(),
            properties: a.properties.clone(),
            defaults: a.defaults.clone(),
        })
        .collect()
}

fn restore_attachments(attachments: &[AttachmentSnapshot]) -> BTreeMap<AttachmentName, Attachment> {
    attachments
        .iter()
        .map(|a| {
            (
                a.name.clone(),
                Attachment {
                    properties: a.properties.clone(),
                    defaults: a.defaults.clone(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::scenario::{load_scenario, ScenarioSource};

    #[test]
    fn snapshot_round_trips_state() {
        let state = load_scenario(ScenarioSource::Embedded).expect("scenario");
        let snapshot = state.snapshot();
        let restored = super::GameState::from_snapshot(&snapshot);
        assert_eq!(restored, state);
        assert_eq!(restored.snapshot(), snapshot);
    }

    #[test]
    fn snapshot_is_deterministic_across_equivalent_states() {
        let a = load_scenario(ScenarioSource::Embedded).expect("scenario");
        let b = load_scenario(ScenarioSource::Embedded).expect("scenario");
        assert_eq!(a.snapshot(), b.snapshot());
    }
}
