use std::collections::BTreeMap;

use broadside_protocol::{EntityKind, PropertyValue, UnitId, ValueKind};
use serde::Deserialize;
use thiserror::Error;

use crate::state::{Attachment, GameState, Player, Territory, Unit};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("missing referenced name: {0}")]
    MissingRef(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub enum ScenarioSource<'a> {
    Embedded,
    Path(String),
    Str(&'a str),
}

#[derive(Debug, Deserialize)]
struct RawScenario {
    frontiers: BTreeMap<String, Vec<String>>,
    players: BTreeMap<String, RawPlayer>,
    territories: BTreeMap<String, RawTerritory>,
    #[serde(default)]
    relationships: Vec<RawRelationship>,
    #[serde(default)]
    properties: BTreeMap<String, PropertyValue>,
    #[serde(default)]
    schema: Vec<RawSchemaEntry>,
}

#[derive(Debug, Deserialize)]
struct RawPlayer {
    frontier: String,
    #[serde(default)]
    resources: BTreeMap<String, i64>,
    #[serde(default)]
    techs: Vec<String>,
    /// Mobilization pool units.
    #[serde(default)]
    units: Vec<RawUnit>,
    #[serde(default)]
    attachments: BTreeMap<String, RawAttachment>,
    #[serde(default)]
    properties: BTreeMap<String, PropertyValue>,
}

#[derive(Debug, Deserialize)]
struct RawTerritory {
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    water: bool,
    #[serde(default)]
    units: Vec<RawUnit>,
    #[serde(default)]
    attachments: BTreeMap<String, RawAttachment>,
    #[serde(default)]
    properties: BTreeMap<String, PropertyValue>,
}

#[derive(Debug, Deserialize)]
struct RawUnit {
    #[serde(rename = "type")]
    unit_type: String,
    owner: String,
    #[serde(default)]
    hits: u32,
    #[serde(default)]
    properties: BTreeMap<String, PropertyValue>,
}

#[derive(Debug, Deserialize)]
struct RawAttachment {
    /// Declared defaults; reset changes restore these.
    defaults: BTreeMap<String, PropertyValue>,
    /// Starting values that differ from the defaults.
    #[serde(default)]
    values: BTreeMap<String, PropertyValue>,
}

#[derive(Debug, Deserialize)]
struct RawRelationship {
    a: String,
    b: String,
    relationship: String,
}

#[derive(Debug, Deserialize)]
struct RawSchemaEntry {
    kind: EntityKind,
    key: String,
    value_kind: ValueKind,
}

/// Load a scenario and compile it into a starting `GameState`.
///
/// Unit ids are assigned sequentially in document order (territories first,
/// then player pools, both in name order), so every process loading the same
/// scenario assigns identical ids.
pub fn load_scenario(source: ScenarioSource<'_>) -> Result<GameState, ScenarioError> {
    let raw: RawScenario = match source {
        ScenarioSource::Embedded => serde_yaml::from_str(include_str!("../data/classic.yaml"))?,
        ScenarioSource::Path(path) => serde_yaml::from_str(&std::fs::read_to_string(path)?)?,
        ScenarioSource::Str(yaml) => serde_yaml::from_str(yaml)?,
    };
    compile(raw)
}

fn compile(raw: RawScenario) -> Result<GameState, ScenarioError> {
    let mut state = GameState::default();
    let mut next_unit_id: u64 = 1;

    for (name, rules) in &raw.frontiers {
        state.frontiers.insert(
            name.as_str().into(),
            rules.iter().map(|r| r.as_str().into()).collect(),
        );
    }

    for (name, t) in &raw.territories {
        if let Some(owner) = &t.owner {
            if !raw.players.contains_key(owner) {
                return Err(ScenarioError::MissingRef(format!(
                    "owner {owner} of territory {name}"
                )));
            }
        }
        let mut units = std::collections::BTreeSet::new();
        for u in &t.units {
            let id = take_unit(&mut state, &raw, &mut next_unit_id, u, name)?;
            units.insert(id);
        }
        state.territories.insert(
            name.as_str().into(),
            Territory {
                owner: t.owner.as_deref().map(Into::into),
                is_water: t.water,
                units,
                attachments: compile_attachments(&t.attachments),
                props: key_props(&t.properties),
            },
        );
    }

    for (name, p) in &raw.players {
        if !raw.frontiers.contains_key(&p.frontier) {
            return Err(ScenarioError::MissingRef(format!(
                "frontier {} of player {name}",
                p.frontier
            )));
        }
        let mut units = std::collections::BTreeSet::new();
        for u in &p.units {
            let id = take_unit(&mut state, &raw, &mut next_unit_id, u, name)?;
            units.insert(id);
        }
        state.players.insert(
            name.as_str().into(),
            Player {
                resources: p
                    .resources
                    .iter()
                    .map(|(r, amount)| (r.as_str().into(), *amount))
                    .collect(),
                frontier: p.frontier.as_str().into(),
                techs: p.techs.iter().map(|t| t.as_str().into()).collect(),
                units,
                attachments: compile_attachments(&p.attachments),
                props: key_props(&p.properties),
            },
        );
    }

    for rel in &raw.relationships {
        for side in [&rel.a, &rel.b] {
            if !raw.players.contains_key(side) {
                return Err(ScenarioError::MissingRef(format!(
                    "player {side} in relationship {}/{}",
                    rel.a, rel.b
                )));
            }
        }
        let (a, b) = if rel.a <= rel.b {
            (rel.a.as_str(), rel.b.as_str())
        } else {
            (rel.b.as_str(), rel.a.as_str())
        };
        state
            .relationships
            .insert((a.into(), b.into()), rel.relationship.as_str().into());
    }

    state.properties = key_props(&raw.properties);

    for entry in &raw.schema {
        state
            .schema
            .declare(entry.kind, entry.key.as_str().into(), entry.value_kind);
    }

    state.round = 1;
    Ok(state)
}

fn take_unit(
    state: &mut GameState,
    raw: &RawScenario,
    next_unit_id: &mut u64,
    unit: &RawUnit,
    holder: &str,
) -> Result<UnitId, ScenarioError> {
    if !raw.players.contains_key(&unit.owner) {
        return Err(ScenarioError::MissingRef(format!(
            "owner {} of {} unit in {holder}",
            unit.owner, unit.unit_type
        )));
    }
    let id = UnitId(*next_unit_id);
    *next_unit_id += 1;
    state.units.insert(
        id,
        Unit {
            unit_type: unit.unit_type.clone(),
            owner: unit.owner.as_str().into(),
            hits: unit.hits,
            props: key_props(&unit.properties),
        },
    );
    Ok(id)
}

fn compile_attachments(
    raw: &BTreeMap<String, RawAttachment>,
) -> BTreeMap<broadside_protocol::AttachmentName, Attachment> {
    raw.iter()
        .map(|(name, a)| {
            let defaults = key_props(&a.defaults);
            let mut properties = defaults.clone();
            for (key, value) in &a.values {
                properties.insert(key.as_str().into(), value.clone());
            }
            (
                name.as_str().into(),
                Attachment {
                    properties,
                    defaults,
                },
            )
        })
        .collect()
}

fn key_props(
    raw: &BTreeMap<String, PropertyValue>,
) -> BTreeMap<broadside_protocol::PropertyKey, PropertyValue> {
    raw.iter()
        .map(|(key, value)| (key.as_str().into(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_scenario_loads() {
        let state = load_scenario(ScenarioSource::Embedded).expect("scenario");
        assert_eq!(state.round(), 1);
        assert_eq!(state.player_names().count(), 3);
        assert!(state.territory(&"Norway".into()).is_some());
        assert!(state.territory(&"SeaZone5".into()).unwrap().is_water);
        assert!(state.unit_count() > 0);
    }

    #[test]
    fn unit_ids_are_deterministic() {
        let a = load_scenario(ScenarioSource::Embedded).expect("scenario");
        let b = load_scenario(ScenarioSource::Embedded).expect("scenario");
        assert_eq!(a, b);
    }

    #[test]
    fn dangling_owner_is_rejected() {
        let yaml = r#"
frontiers:
  basic: []
players:
  UK:
    frontier: basic
territories:
  Norway:
    owner: Germany
"#;
        match load_scenario(ScenarioSource::Str(yaml)) {
            Err(ScenarioError::MissingRef(detail)) => assert!(detail.contains("Germany")),
            other => panic!("expected MissingRef, got {other:?}"),
        }
    }

    #[test]
    fn dangling_frontier_is_rejected() {
        let yaml = r#"
frontiers:
  basic: []
players:
  UK:
    frontier: advanced
territories: {}
"#;
        assert!(matches!(
            load_scenario(ScenarioSource::Str(yaml)),
            Err(ScenarioError::MissingRef(_))
        ));
    }

    #[test]
    fn attachment_values_override_defaults() {
        let state = load_scenario(ScenarioSource::Embedded).expect("scenario");
        let attachment = state
            .player(&"Japan".into())
            .unwrap()
            .attachments
            .get(&"techAttachment".into())
            .unwrap()
            .clone();
        assert_eq!(
            attachment.defaults.get(&"techTokens".into()),
            Some(&PropertyValue::Int(0))
        );
        assert_eq!(
            attachment.properties.get(&"techTokens".into()),
            Some(&PropertyValue::Int(3))
        );
    }
}
