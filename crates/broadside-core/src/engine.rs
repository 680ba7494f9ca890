use broadside_protocol::{
    wire, AttachableKind, AttachableRef, AuditEvent, Change, CompositeChange, EntityKind,
    HolderKind, HolderRef, PlayerName, SaveFile, StateSnapshot, WireError, SAVE_VERSION,
};
use thiserror::Error;

use crate::audit::AuditLog;
use crate::dice::DiceRoller;
use crate::history::{HistoryEntry, HistoryLog};
use crate::schema::SchemaError;
use crate::state::{Attachment, GameState};

/// Fatal protocol-level failure: a change referenced state that does not
/// match what it was constructed against. Continuing after one of these
/// risks silent divergence between host and mirrors, so the session aborts.
#[derive(Debug, Error, PartialEq)]
pub enum ConsistencyViolation {
    #[error("{change} references missing {entity}")]
    MissingEntity {
        change: &'static str,
        entity: String,
    },
    #[error("{change} was constructed against a different state: {detail}")]
    StaleSnapshot {
        change: &'static str,
        detail: String,
    },
    #[error("{change} failed schema validation: {source}")]
    Schema {
        change: &'static str,
        #[source]
        source: SchemaError,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Consistency(#[from] ConsistencyViolation),
    /// Recoverable: undo was requested with nothing to undo. No state was
    /// touched.
    #[error("nothing to undo")]
    EmptyHistory,
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("unsupported save version {0}")]
    UnsupportedSaveVersion(u32),
}

/// Apply a single change to the state. The only sanctioned mutation point.
///
/// Either the whole change applies or nothing observable should be trusted:
/// a composite that fails partway aborts as fatal, and the session is
/// expected to end rather than roll back (partial application is not a
/// supported state).
pub fn apply(state: &mut GameState, change: &Change) -> Result<(), ConsistencyViolation> {
    let kind = change.kind_name();
    match change {
        Change::TerritoryOwner {
            territory,
            old_owner,
            new_owner,
        } => {
            if let Some(owner) = new_owner {
                require_player(state, kind, owner)?;
            }
            let t = state
                .territories
                .get_mut(territory)
                .ok_or_else(|| missing(kind, format!("territory {territory}")))?;
            if t.owner != *old_owner {
                let current = t.owner.as_ref().map(|p| p.as_str()).unwrap_or("nobody");
                let expected = old_owner.as_ref().map(|p| p.as_str()).unwrap_or("nobody");
                return Err(ConsistencyViolation::StaleSnapshot {
                    change: kind,
                    detail: format!("{territory} owned by {current}, expected {expected}"),
                });
            }
            t.owner = new_owner.clone();
            Ok(())
        }
        Change::AddUnits { holder, units } => {
            for unit in units {
                if !state.units.contains_key(unit) {
                    return Err(missing(kind, unit.to_string()));
                }
            }
            let set = holder_units_mut(state, kind, holder)?;
            for unit in units {
                if set.contains(unit) {
                    return Err(ConsistencyViolation::StaleSnapshot {
                        change: kind,
                        detail: format!("{unit} already present in {holder}"),
                    });
                }
            }
            for unit in units {
                set.insert(*unit);
            }
            Ok(())
        }
        Change::RemoveUnits { holder, units } => {
            let set = holder_units_mut(state, kind, holder)?;
            for unit in units {
                if !set.contains(unit) {
                    return Err(ConsistencyViolation::StaleSnapshot {
                        change: kind,
                        detail: format!("{unit} not present in {holder}"),
                    });
                }
            }
            for unit in units {
                set.remove(unit);
            }
            Ok(())
        }
        Change::UnitOwner { location, old, new } => {
            if !state.territories.contains_key(location) {
                return Err(missing(kind, format!("territory {location}")));
            }
            for (id, expected_owner) in old {
                let unit = state
                    .units
                    .get(id)
                    .ok_or_else(|| missing(kind, id.to_string()))?;
                if unit.owner != *expected_owner {
                    return Err(ConsistencyViolation::StaleSnapshot {
                        change: kind,
                        detail: format!(
                            "{id} owned by {}, expected {expected_owner}",
                            unit.owner
                        ),
                    });
                }
            }
            for (id, new_owner) in new {
                require_player(state, kind, new_owner)?;
                let unit = state
                    .units
                    .get_mut(id)
                    .ok_or_else(|| missing(kind, id.to_string()))?;
                unit.owner = new_owner.clone();
            }
            Ok(())
        }
        Change::UnitHits { old, new } => {
            for (id, expected) in old {
                let unit = state
                    .units
                    .get(id)
                    .ok_or_else(|| missing(kind, id.to_string()))?;
                if unit.hits != *expected {
                    return Err(ConsistencyViolation::StaleSnapshot {
                        change: kind,
                        detail: format!("{id} has {} hits, expected {expected}", unit.hits),
                    });
                }
            }
            for (id, hits) in new {
                let unit = state
                    .units
                    .get_mut(id)
                    .ok_or_else(|| missing(kind, id.to_string()))?;
                unit.hits = *hits;
            }
            Ok(())
        }
        Change::ResourceDelta {
            player,
            resource,
            delta,
        } => {
            let p = state
                .players
                .get_mut(player)
                .ok_or_else(|| missing(kind, format!("player {player}")))?;
            let stock = p
                .resources
                .get_mut(resource)
                .ok_or_else(|| missing(kind, format!("resource {resource} of {player}")))?;
            *stock += delta;
            Ok(())
        }
        Change::PlayerFrontier {
            player,
            old_frontier,
            new_frontier,
        } => {
            if !state.frontiers.contains_key(new_frontier) {
                return Err(missing(kind, format!("frontier {new_frontier}")));
            }
            let p = state
                .players
                .get_mut(player)
                .ok_or_else(|| missing(kind, format!("player {player}")))?;
            if p.frontier != *old_frontier {
                return Err(ConsistencyViolation::StaleSnapshot {
                    change: kind,
                    detail: format!(
                        "{player} draws from {}, expected {old_frontier}",
                        p.frontier
                    ),
                });
            }
            p.frontier = new_frontier.clone();
            Ok(())
        }
        Change::AddFrontierRule { frontier, rule } => {
            let rules = state
                .frontiers
                .get_mut(frontier)
                .ok_or_else(|| missing(kind, format!("frontier {frontier}")))?;
            if !rules.insert(rule.clone()) {
                return Err(ConsistencyViolation::StaleSnapshot {
                    change: kind,
                    detail: format!("rule {rule} already in {frontier}"),
                });
            }
            Ok(())
        }
        Change::RemoveFrontierRule { frontier, rule } => {
            let rules = state
                .frontiers
                .get_mut(frontier)
                .ok_or_else(|| missing(kind, format!("frontier {frontier}")))?;
            if !rules.remove(rule) {
                return Err(ConsistencyViolation::StaleSnapshot {
                    change: kind,
                    detail: format!("rule {rule} not in {frontier}"),
                });
            }
            Ok(())
        }
        Change::AddTech { player, tech } => {
            let p = state
                .players
                .get_mut(player)
                .ok_or_else(|| missing(kind, format!("player {player}")))?;
            if !p.techs.insert(tech.clone()) {
                return Err(ConsistencyViolation::StaleSnapshot {
                    change: kind,
                    detail: format!("{player} already has {tech}"),
                });
            }
            Ok(())
        }
        Change::RemoveTech { player, tech } => {
            let p = state
                .players
                .get_mut(player)
                .ok_or_else(|| missing(kind, format!("player {player}")))?;
            if !p.techs.remove(tech) {
                return Err(ConsistencyViolation::StaleSnapshot {
                    change: kind,
                    detail: format!("{player} does not have {tech}"),
                });
            }
            Ok(())
        }
        Change::Relationship {
            a,
            b,
            old_type,
            new_type,
        } => {
            require_player(state, kind, a)?;
            require_player(state, kind, b)?;
            let key = broadside_protocol::ordered_pair(a.clone(), b.clone());
            let current = state
                .relationships
                .get_mut(&key)
                .ok_or_else(|| missing(kind, format!("relationship {a}/{b}")))?;
            if current != old_type {
                return Err(ConsistencyViolation::StaleSnapshot {
                    change: kind,
                    detail: format!("{a}/{b} are {current}, expected {old_type}"),
                });
            }
            *current = new_type.clone();
            Ok(())
        }
        Change::AddAttachment {
            attachable,
            attachment,
        } => {
            let attachments = attachments_mut(state, kind, attachable)?;
            if attachments.contains_key(&attachment.name) {
                return Err(ConsistencyViolation::StaleSnapshot {
                    change: kind,
                    detail: format!("{attachable} already has {}", attachment.name),
                });
            }
            attachments.insert(
                attachment.name.clone(),
                Attachment {
                    properties: attachment.properties.clone(),
                    defaults: attachment.defaults.clone(),
                },
            );
            Ok(())
        }
        Change::RemoveAttachment {
            attachable,
            attachment,
        } => {
            let attachments = attachments_mut(state, kind, attachable)?;
            match attachments.get(&attachment.name) {
                Some(current)
                    if current.properties == attachment.properties
                        && current.defaults == attachment.defaults =>
                {
                    attachments.remove(&attachment.name);
                    Ok(())
                }
                Some(_) => Err(ConsistencyViolation::StaleSnapshot {
                    change: kind,
                    detail: format!(
                        "{attachable}/{} does not match the captured data",
                        attachment.name
                    ),
                }),
                None => Err(ConsistencyViolation::StaleSnapshot {
                    change: kind,
                    detail: format!("{attachable} has no {}", attachment.name),
                }),
            }
        }
        Change::AttachmentProperty {
            attachable,
            attachment,
            property,
            old,
            new,
        } => {
            let a = attachment_mut(state, kind, attachable, attachment)?;
            let current = a
                .properties
                .get_mut(property)
                .ok_or_else(|| missing(kind, format!("{attachable}/{attachment}.{property}")))?;
            if current != old {
                return Err(ConsistencyViolation::StaleSnapshot {
                    change: kind,
                    detail: format!(
                        "{attachable}/{attachment}.{property} is {current}, expected {old}"
                    ),
                });
            }
            *current = new.clone();
            Ok(())
        }
        Change::AttachmentPropertyReset {
            attachable,
            attachment,
            property,
            old,
        } => {
            let a = attachment_mut(state, kind, attachable, attachment)?;
            let default = a.defaults.get(property).cloned().ok_or_else(|| {
                missing(
                    kind,
                    format!("declared default for {attachable}/{attachment}.{property}"),
                )
            })?;
            let current = a
                .properties
                .get_mut(property)
                .ok_or_else(|| missing(kind, format!("{attachable}/{attachment}.{property}")))?;
            if current != old {
                return Err(ConsistencyViolation::StaleSnapshot {
                    change: kind,
                    detail: format!(
                        "{attachable}/{attachment}.{property} is {current}, expected {old}"
                    ),
                });
            }
            *current = default;
            Ok(())
        }
        Change::AttachmentPropertyRestore {
            attachable,
            attachment,
            property,
            value,
        } => {
            let a = attachment_mut(state, kind, attachable, attachment)?;
            let current = a
                .properties
                .get_mut(property)
                .ok_or_else(|| missing(kind, format!("{attachable}/{attachment}.{property}")))?;
            *current = value.clone();
            Ok(())
        }
        Change::ObjectProperty {
            kind: entity_kind,
            name,
            property,
            old,
            new,
        } => {
            state
                .schema
                .validate(*entity_kind, property, new)
                .map_err(|source| ConsistencyViolation::Schema {
                    change: kind,
                    source,
                })?;
            let props = match entity_kind {
                EntityKind::Territory => {
                    let territory = broadside_protocol::TerritoryName::new(name);
                    &mut state
                        .territories
                        .get_mut(&territory)
                        .ok_or_else(|| missing(kind, format!("territory {name}")))?
                        .props
                }
                EntityKind::Player => {
                    let player = PlayerName::new(name);
                    &mut state
                        .players
                        .get_mut(&player)
                        .ok_or_else(|| missing(kind, format!("player {name}")))?
                        .props
                }
                EntityKind::Unit => {
                    let id = name
                        .strip_prefix("unit#")
                        .and_then(|raw| raw.parse::<u64>().ok())
                        .map(broadside_protocol::UnitId)
                        .ok_or_else(|| missing(kind, format!("unit {name}")))?;
                    &mut state
                        .units
                        .get_mut(&id)
                        .ok_or_else(|| missing(kind, format!("{id}")))?
                        .props
                }
            };
            let current = props
                .get_mut(property)
                .ok_or_else(|| missing(kind, format!("{entity_kind} {name}.{property}")))?;
            if current != old {
                return Err(ConsistencyViolation::StaleSnapshot {
                    change: kind,
                    detail: format!("{entity_kind} {name}.{property} is {current}, expected {old}"),
                });
            }
            *current = new.clone();
            Ok(())
        }
        Change::GameProperty { key, old, new } => {
            let current = state.properties.get(key);
            if current != old.as_ref() {
                return Err(ConsistencyViolation::StaleSnapshot {
                    change: kind,
                    detail: format!("game property {key} is {current:?}, expected {old:?}"),
                });
            }
            match new {
                Some(value) => {
                    state.properties.insert(key.clone(), value.clone());
                }
                None => {
                    state.properties.remove(key);
                }
            }
            Ok(())
        }
        Change::Composite(composite) => apply_composite(state, composite),
    }
}

/// Apply a composite's children in forward order, aborting on the first
/// failure.
pub fn apply_composite(
    state: &mut GameState,
    composite: &CompositeChange,
) -> Result<(), ConsistencyViolation> {
    for change in composite.changes() {
        apply(state, change)?;
    }
    Ok(())
}

fn missing(change: &'static str, entity: String) -> ConsistencyViolation {
    ConsistencyViolation::MissingEntity { change, entity }
}

fn require_player(
    state: &GameState,
    change: &'static str,
    player: &PlayerName,
) -> Result<(), ConsistencyViolation> {
    if state.players.contains_key(player) {
        Ok(())
    } else {
        Err(missing(change, format!("player {player}")))
    }
}

fn holder_units_mut<'a>(
    state: &'a mut GameState,
    change: &'static str,
    holder: &HolderRef,
) -> Result<&'a mut std::collections::BTreeSet<broadside_protocol::UnitId>, ConsistencyViolation> {
    match holder.kind {
        HolderKind::Territory => {
            let name = broadside_protocol::TerritoryName::new(&holder.name);
            state
                .territories
                .get_mut(&name)
                .map(|t| &mut t.units)
                .ok_or_else(|| missing(change, format!("{holder}")))
        }
        HolderKind::Player => {
            let name = PlayerName::new(&holder.name);
            state
                .players
                .get_mut(&name)
                .map(|p| &mut p.units)
                .ok_or_else(|| missing(change, format!("{holder}")))
        }
    }
}

fn attachments_mut<'a>(
    state: &'a mut GameState,
    change: &'static str,
    attachable: &AttachableRef,
) -> Result<
    &'a mut std::collections::BTreeMap<broadside_protocol::AttachmentName, Attachment>,
    ConsistencyViolation,
> {
    match attachable.kind {
        AttachableKind::Territory => {
            let name = broadside_protocol::TerritoryName::new(&attachable.name);
            state
                .territories
                .get_mut(&name)
                .map(|t| &mut t.attachments)
                .ok_or_else(|| missing(change, format!("{attachable}")))
        }
        AttachableKind::Player => {
            let name = PlayerName::new(&attachable.name);
            state
                .players
                .get_mut(&name)
                .map(|p| &mut p.attachments)
                .ok_or_else(|| missing(change, format!("{attachable}")))
        }
    }
}

fn attachment_mut<'a>(
    state: &'a mut GameState,
    change: &'static str,
    attachable: &AttachableRef,
    attachment: &broadside_protocol::AttachmentName,
) -> Result<&'a mut Attachment, ConsistencyViolation> {
    attachments_mut(state, change, attachable)?
        .get_mut(attachment)
        .ok_or_else(|| missing(change, format!("{attachable}/{attachment}")))
}

/// Host-side engine: owns the authoritative state, the history log, the
/// audit log, and the dice roller. `apply_and_record` is the single call
/// site through which the session mutates state.
#[derive(Clone, Debug, Default)]
pub struct HostEngine {
    state: GameState,
    history: HistoryLog,
    audit: AuditLog,
    roller: DiceRoller,
}

impl HostEngine {
    pub fn new(state: GameState) -> Self {
        Self {
            state,
            history: HistoryLog::new(),
            audit: AuditLog::new(),
            roller: DiceRoller::default(),
        }
    }

    /// Reseed the roller, typically from host config at session start.
    pub fn with_dice_seed(mut self, seed: u64) -> Self {
        self.roller = DiceRoller::seed_from_u64(seed);
        self
    }

    pub fn from_snapshot(snapshot: &StateSnapshot) -> Self {
        let mut engine = Self::new(GameState::from_snapshot(snapshot));
        engine.roller = DiceRoller::from_state_bytes(snapshot.dice_state);
        engine
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Full snapshot with the live roller state overlaid, for client sync
    /// and save files.
    pub fn snapshot(&self) -> StateSnapshot {
        let mut snapshot = self.state.snapshot();
        snapshot.dice_state = self.roller.state_bytes();
        snapshot
    }

    /// Deterministic checksum of the current state, for desync detection.
    /// Hashed with the roller state zeroed: mirrors never hold the roller,
    /// and dice consume entropy without changing game state.
    pub fn checksum(&self) -> Result<u64, EngineError> {
        Ok(wire::state_hash(&self.state.snapshot())?)
    }

    pub fn advance_round(&mut self) {
        self.state.advance_round();
    }

    /// Perform `composite` against the authoritative state, then append it
    /// and its precomputed inverse to the history log. Returns the assigned
    /// sequence number.
    ///
    /// The inverse is computed before application, purely from construction
    /// data; a failure partway through a composite is fatal and leaves the
    /// session unusable by design.
    pub fn apply_and_record(&mut self, composite: CompositeChange) -> Result<u64, EngineError> {
        let inverse = composite.invert();
        apply_composite(&mut self.state, &composite)?;
        let round = self.state.round();
        let seq = self.history.record(composite, inverse, round);
        if let Some(entry) = self.history.entries().last() {
            self.audit.record(
                round,
                AuditEvent::ChangeApplied {
                    seq,
                    summary: entry.composite.to_string(),
                },
            );
        }
        Ok(seq)
    }

    /// Undo the most recent composite by applying its stored inverse, then
    /// discard the popped entry. Returns the entry (original and inverse)
    /// so the caller can broadcast the inverse to mirrors.
    ///
    /// With an empty history this is a recoverable no-op signal; no state is
    /// touched.
    pub fn undo_last(&mut self) -> Result<HistoryEntry, EngineError> {
        let entry = self.history.undo_most_recent().ok_or(EngineError::EmptyHistory)?;
        apply_composite(&mut self.state, &entry.inverse)?;
        self.audit.record(
            self.state.round(),
            AuditEvent::ChangeUndone {
                seq: entry.seq,
                summary: entry.composite.to_string(),
            },
        );
        Ok(entry)
    }

    /// Roll dice through the session roller and record the result in the
    /// audit log. Rolls never enter the history log: they are not state
    /// mutations and are not replayable.
    pub fn roll_recorded(
        &mut self,
        player: PlayerName,
        sides: u32,
        count: usize,
        purpose: impl Into<String>,
    ) -> Vec<u32> {
        let values = self.roller.roll(sides, count);
        self.audit.record(
            self.state.round(),
            AuditEvent::DiceRolled {
                player,
                sides,
                values: values.clone(),
                purpose: purpose.into(),
            },
        );
        values
    }

    /// Persist the session: full snapshot plus the history entries since
    /// session start, both directions pre-encoded.
    pub fn to_save(&self) -> Result<SaveFile, EngineError> {
        let mut history = Vec::with_capacity(self.history.len());
        for entry in self.history.entries() {
            history.push(broadside_protocol::SaveHistoryEntry {
                round: entry.round,
                seq: entry.seq,
                change: wire::encode_composite(&entry.composite)?,
                inverse: wire::encode_composite(&entry.inverse)?,
            });
        }
        Ok(SaveFile {
            version: SAVE_VERSION,
            snapshot: self.snapshot(),
            history,
        })
    }

    /// Restore a session from a save. The snapshot is restored directly and
    /// nothing is replayed; history entries become undo/display metadata. A
    /// history entry with no registered wire upgrade path fails the load.
    pub fn from_save(save: &SaveFile) -> Result<Self, EngineError> {
        if save.version != SAVE_VERSION {
            return Err(EngineError::UnsupportedSaveVersion(save.version));
        }
        let state = GameState::from_snapshot(&save.snapshot);
        let mut entries = Vec::with_capacity(save.history.len());
        for raw in &save.history {
            entries.push(HistoryEntry {
                composite: wire::decode_composite(&raw.change)?,
                inverse: wire::decode_composite(&raw.inverse)?,
                round: raw.round,
                seq: raw.seq,
            });
        }
        Ok(Self {
            state,
            history: HistoryLog::from_entries(entries),
            audit: AuditLog::new(),
            roller: DiceRoller::from_state_bytes(save.snapshot.dice_state),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use broadside_protocol::{
        AttachableRef, AttachmentSnapshot, Change, CompositeChange, HolderRef, PropertyValue,
        UnitId,
    };

    use super::*;
    use crate::scenario::{load_scenario, ScenarioSource};

    fn state() -> GameState {
        load_scenario(ScenarioSource::Embedded).expect("scenario")
    }

    fn tech_tokens(state: &GameState) -> PropertyValue {
        state
            .player(&"Japan".into())
            .unwrap()
            .attachments
            .get(&"techAttachment".into())
            .unwrap()
            .properties
            .get(&"techTokens".into())
            .unwrap()
            .clone()
    }

    fn ownership_change(state: &GameState) -> Change {
        let territory = "Norway".into();
        Change::TerritoryOwner {
            old_owner: state.territory(&territory).and_then(|t| t.owner.clone()),
            territory,
            new_owner: Some("UK".into()),
        }
    }

    #[test]
    fn ownership_applies_and_inverts() {
        let mut state = state();
        let change = ownership_change(&state);

        apply(&mut state, &change).expect("apply");
        assert_eq!(
            state.territory(&"Norway".into()).unwrap().owner,
            Some("UK".into())
        );

        apply(&mut state, &change.invert()).expect("invert apply");
        assert_eq!(
            state.territory(&"Norway".into()).unwrap().owner,
            Some("Germany".into())
        );
    }

    #[test]
    fn unit_membership_applies_and_inverts() {
        let mut state = state();
        let holder = HolderRef::territory("SeaZone5");
        let before = state
            .territory(&"SeaZone5".into())
            .unwrap()
            .units
            .clone();

        // The UK mobilization pool holds spare naval units in the embedded
        // scenario.
        let moved = *state.player(&"UK".into()).unwrap().units.iter().next().unwrap();
        let change = Change::AddUnits {
            holder: holder.clone(),
            units: vec![moved],
        };

        apply(&mut state, &change).expect("apply");
        let after = &state.territory(&"SeaZone5".into()).unwrap().units;
        assert!(after.contains(&moved));
        assert_eq!(after.len(), before.len() + 1);

        apply(&mut state, &change.invert()).expect("invert apply");
        assert_eq!(state.territory(&"SeaZone5".into()).unwrap().units, before);
    }

    #[test]
    fn adding_present_units_is_stale_and_leaves_state_untouched() {
        let mut state = state();
        let baseline = state.clone();
        let present = *state
            .territory(&"SeaZone5".into())
            .unwrap()
            .units
            .iter()
            .next()
            .unwrap();

        let change = Change::AddUnits {
            holder: HolderRef::territory("SeaZone5"),
            units: vec![present],
        };
        assert!(matches!(
            apply(&mut state, &change),
            Err(ConsistencyViolation::StaleSnapshot { .. })
        ));
        // Had the add silently no-opped, its inverse would strip the unit
        // that was already there.
        assert_eq!(state, baseline);
    }

    #[test]
    fn stale_territory_owner_is_rejected() {
        let mut state = state();
        let change = Change::TerritoryOwner {
            territory: "Norway".into(),
            old_owner: None,
            new_owner: Some("UK".into()),
        };
        match apply(&mut state, &change) {
            Err(ConsistencyViolation::StaleSnapshot { change, detail }) => {
                assert_eq!(change, "TerritoryOwner");
                assert!(detail.contains("Germany"));
            }
            other => panic!("expected StaleSnapshot, got {other:?}"),
        }
        assert_eq!(
            state.territory(&"Norway".into()).unwrap().owner,
            Some("Germany".into())
        );
    }

    #[test]
    fn unit_owner_applies_and_inverts() {
        let mut state = state();
        let moved = *state
            .territory(&"SeaZone5".into())
            .unwrap()
            .units
            .iter()
            .next()
            .unwrap();
        let change = Change::UnitOwner {
            location: "SeaZone5".into(),
            old: BTreeMap::from([(moved, "Germany".into())]),
            new: BTreeMap::from([(moved, "UK".into())]),
        };

        apply(&mut state, &change).expect("apply");
        assert_eq!(state.unit(moved).unwrap().owner, "UK".into());

        apply(&mut state, &change.invert()).expect("invert apply");
        assert_eq!(state.unit(moved).unwrap().owner, "Germany".into());
    }

    #[test]
    fn unit_hits_apply_and_invert() {
        let mut state = state();
        let hit = *state
            .territory(&"SeaZone5".into())
            .unwrap()
            .units
            .iter()
            .next()
            .unwrap();
        let change = Change::UnitHits {
            old: BTreeMap::from([(hit, 0)]),
            new: BTreeMap::from([(hit, 1)]),
        };

        apply(&mut state, &change).expect("apply");
        assert_eq!(state.unit(hit).unwrap().hits, 1);

        apply(&mut state, &change.invert()).expect("invert apply");
        assert_eq!(state.unit(hit).unwrap().hits, 0);
    }

    #[test]
    fn relationship_applies_and_inverts() {
        let mut state = state();
        let change = Change::Relationship {
            a: "UK".into(),
            b: "Germany".into(),
            old_type: "war".into(),
            new_type: "truce".into(),
        };

        apply(&mut state, &change).expect("apply");
        assert_eq!(
            state.relationship(&"Germany".into(), &"UK".into()),
            Some(&"truce".into())
        );

        apply(&mut state, &change.invert()).expect("invert apply");
        assert_eq!(
            state.relationship(&"Germany".into(), &"UK".into()),
            Some(&"war".into())
        );
    }

    #[test]
    fn player_frontier_applies_and_inverts() {
        let mut state = state();
        let change = Change::PlayerFrontier {
            player: "Japan".into(),
            old_frontier: "japanFrontier".into(),
            new_frontier: "germanFrontier".into(),
        };

        apply(&mut state, &change).expect("apply");
        assert_eq!(
            state.player(&"Japan".into()).unwrap().frontier,
            "germanFrontier".into()
        );

        apply(&mut state, &change.invert()).expect("invert apply");
        assert_eq!(
            state.player(&"Japan".into()).unwrap().frontier,
            "japanFrontier".into()
        );
    }

    #[test]
    fn declared_object_property_applies_and_inverts() {
        let mut state = state();
        let change = Change::ObjectProperty {
            kind: EntityKind::Territory,
            name: "Norway".to_string(),
            property: "victoryCity".into(),
            old: PropertyValue::Bool(false),
            new: PropertyValue::Bool(true),
        };

        apply(&mut state, &change).expect("apply");
        assert_eq!(
            state
                .territory(&"Norway".into())
                .unwrap()
                .props
                .get(&"victoryCity".into()),
            Some(&PropertyValue::Bool(true))
        );

        apply(&mut state, &change.invert()).expect("invert apply");
        assert_eq!(
            state
                .territory(&"Norway".into())
                .unwrap()
                .props
                .get(&"victoryCity".into()),
            Some(&PropertyValue::Bool(false))
        );
    }

    #[test]
    fn attach_and_detach_apply_and_invert() {
        let mut state = state();
        let attachment = AttachmentSnapshot {
            name: "bombardmentAttachment".into(),
            properties: BTreeMap::from([("maxDamage".into(), PropertyValue::Int(6))]),
            defaults: BTreeMap::from([("maxDamage".into(), PropertyValue::Int(0))]),
        };
        let add = Change::AddAttachment {
            attachable: AttachableRef::territory("Norway"),
            attachment: attachment.clone(),
        };

        apply(&mut state, &add).expect("apply");
        let attached = state
            .territory(&"Norway".into())
            .unwrap()
            .attachments
            .get(&"bombardmentAttachment".into())
            .expect("attached");
        assert_eq!(attached.properties, attachment.properties);

        apply(&mut state, &add.invert()).expect("invert apply");
        assert!(state
            .territory(&"Norway".into())
            .unwrap()
            .attachments
            .get(&"bombardmentAttachment".into())
            .is_none());

        // Attaching over an existing attachment is stale, not an overwrite.
        apply(&mut state, &add).expect("reapply");
        assert!(matches!(
            apply(&mut state, &add),
            Err(ConsistencyViolation::StaleSnapshot { .. })
        ));
    }

    #[test]
    fn attachment_property_applies_and_inverts() {
        let mut state = state();
        let change = Change::AttachmentProperty {
            attachable: AttachableRef::player("Japan"),
            attachment: "techAttachment".into(),
            property: "techTokens".into(),
            old: PropertyValue::Int(3),
            new: PropertyValue::Int(5),
        };

        apply(&mut state, &change).expect("apply");
        assert_eq!(tech_tokens(&state), PropertyValue::Int(5));

        apply(&mut state, &change.invert()).expect("invert apply");
        assert_eq!(tech_tokens(&state), PropertyValue::Int(3));
    }

    #[test]
    fn reset_restores_declared_default_and_undoes() {
        let mut state = state();
        let reset = Change::AttachmentPropertyReset {
            attachable: AttachableRef::player("Japan"),
            attachment: "techAttachment".into(),
            property: "techTokens".into(),
            old: PropertyValue::Int(3),
        };

        apply(&mut state, &reset).expect("apply");
        // Declared default in the embedded scenario is 0.
        assert_eq!(tech_tokens(&state), PropertyValue::Int(0));

        apply(&mut state, &reset.invert()).expect("invert apply");
        assert_eq!(tech_tokens(&state), PropertyValue::Int(3));
    }

    #[test]
    fn composite_applies_forward_and_undoes_in_reverse() {
        let mut state = state();
        let baseline = state.clone();

        let moved = *state.player(&"UK".into()).unwrap().units.iter().next().unwrap();
        let mut composite = CompositeChange::new();
        composite.add(ownership_change(&state));
        composite.add(Change::AddUnits {
            holder: HolderRef::territory("SeaZone5"),
            units: vec![moved],
        });
        composite.add(Change::AttachmentProperty {
            attachable: AttachableRef::player("Japan"),
            attachment: "techAttachment".into(),
            property: "techTokens".into(),
            old: PropertyValue::Int(3),
            new: PropertyValue::Int(5),
        });

        apply_composite(&mut state, &composite).expect("apply");
        assert_ne!(state, baseline);

        apply_composite(&mut state, &composite.invert()).expect("undo");
        assert_eq!(state, baseline);
    }

    #[test]
    fn missing_territory_is_a_consistency_violation() {
        let mut state = state();
        let change = Change::TerritoryOwner {
            territory: "Atlantis".into(),
            old_owner: None,
            new_owner: Some("UK".into()),
        };
        match apply(&mut state, &change) {
            Err(ConsistencyViolation::MissingEntity { change, entity }) => {
                assert_eq!(change, "TerritoryOwner");
                assert!(entity.contains("Atlantis"));
            }
            other => panic!("expected MissingEntity, got {other:?}"),
        }
    }

    #[test]
    fn removing_absent_units_is_stale() {
        let mut state = state();
        let change = Change::RemoveUnits {
            holder: HolderRef::territory("Norway"),
            units: vec![UnitId(9999)],
        };
        assert!(matches!(
            apply(&mut state, &change),
            Err(ConsistencyViolation::StaleSnapshot { .. })
        ));
    }

    #[test]
    fn object_property_rejects_undeclared_key() {
        let mut state = state();
        let change = Change::ObjectProperty {
            kind: EntityKind::Player,
            name: "UK".to_string(),
            property: "secretWeapon".into(),
            old: PropertyValue::Bool(false),
            new: PropertyValue::Bool(true),
        };
        assert!(matches!(
            apply(&mut state, &change),
            Err(ConsistencyViolation::Schema { .. })
        ));
    }

    #[test]
    fn apply_and_record_then_undo_restores_state() {
        let mut engine = HostEngine::new(state());
        let baseline = engine.state().clone();

        for _ in 0..3 {
            let change = ownership_change(engine.state());
            let inverse_target = CompositeChange::from(change.clone());
            engine.apply_and_record(inverse_target).expect("record");
            let back = CompositeChange::from(ownership_change(engine.state()));
            engine.apply_and_record(back).expect("record");
        }
        assert_eq!(engine.history().len(), 6);

        for _ in 0..6 {
            engine.undo_last().expect("undo");
        }
        assert!(engine.history().is_empty());
        assert_eq!(*engine.state(), baseline);
    }

    #[test]
    fn undo_on_empty_history_is_a_noop_signal() {
        let mut engine = HostEngine::new(state());
        let before = engine.state().clone();
        match engine.undo_last() {
            Err(EngineError::EmptyHistory) => {}
            other => panic!("expected EmptyHistory, got {other:?}"),
        }
        assert_eq!(*engine.state(), before);
    }

    #[test]
    fn decoded_change_applies_identically_on_fresh_state() {
        let change = Change::AttachmentProperty {
            attachable: AttachableRef::player("Japan"),
            attachment: "techAttachment".into(),
            property: "techTokens".into(),
            old: PropertyValue::Int(3),
            new: PropertyValue::Int(5),
        };
        let composite = CompositeChange::from(change);
        let bytes = wire::encode_composite(&composite).expect("encode");

        let mut direct = state();
        apply_composite(&mut direct, &composite).expect("apply direct");

        let mut fresh = state();
        let decoded = wire::decode_composite(&bytes).expect("decode");
        apply_composite(&mut fresh, &decoded).expect("apply decoded");

        assert_eq!(direct, fresh);
        assert_eq!(direct.snapshot(), fresh.snapshot());
    }

    #[test]
    fn save_round_trip_preserves_history_metadata() {
        let mut engine = HostEngine::new(state());
        let change = ownership_change(engine.state());
        engine
            .apply_and_record(CompositeChange::from(change))
            .expect("record");

        let save = engine.to_save().expect("save");
        let mut restored = HostEngine::from_save(&save).expect("load");

        assert_eq!(restored.state(), engine.state());
        assert_eq!(restored.history().len(), 1);

        // Undo works after load without replaying anything.
        restored.undo_last().expect("undo");
        assert_eq!(
            restored.state().territory(&"Norway".into()).unwrap().owner,
            Some("Germany".into())
        );
    }

    #[test]
    fn unsupported_save_version_fails_load() {
        let engine = HostEngine::new(state());
        let mut save = engine.to_save().expect("save");
        save.version = 99;
        assert!(matches!(
            HostEngine::from_save(&save),
            Err(EngineError::UnsupportedSaveVersion(99))
        ));
    }

    #[test]
    fn dice_rolls_land_in_audit_not_history() {
        let mut engine = HostEngine::new(state()).with_dice_seed(42);
        let values = engine.roll_recorded("Germany".into(), 6, 3, "combat");
        assert_eq!(values.len(), 3);
        assert!(engine.history().is_empty());
        assert_eq!(engine.audit().entries().len(), 1);
    }

    #[test]
    fn save_round_trip_preserves_roller_state() {
        let mut engine = HostEngine::new(state()).with_dice_seed(7);
        engine.roll_recorded("Germany".into(), 6, 4, "combat");

        let save = engine.to_save().expect("save");
        let mut restored = HostEngine::from_save(&save).expect("load");

        assert_eq!(
            engine.roll_recorded("Germany".into(), 6, 10, "combat"),
            restored.roll_recorded("Germany".into(), 6, 10, "combat")
        );
    }

    #[test]
    fn dice_rolls_do_not_shift_the_checksum() {
        let mut engine = HostEngine::new(state()).with_dice_seed(9);
        let before = engine.checksum().expect("checksum");
        engine.roll_recorded("UK".into(), 6, 5, "aa fire");
        assert_eq!(engine.checksum().expect("checksum"), before);
    }
}
