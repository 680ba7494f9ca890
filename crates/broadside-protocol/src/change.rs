use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    AttachableRef, AttachmentName, AttachmentSnapshot, EntityKind, FrontierName, HolderRef,
    PlayerName, PropertyKey, PropertyValue, RelationshipTypeName, ResourceName, RuleName, TechName,
    TerritoryName, UnitId,
};

/// A single, self-contained, invertible state mutation. Fully serializable.
///
/// Every variant snapshots at construction whatever "before" data its inverse
/// needs; `invert` is pure and never re-reads live state. Variants carry
/// stable names and ids, never handles to live objects, so a change can be
/// encoded, shipped to another process, and applied against a different
/// in-memory graph with equivalent named entities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Change {
    /// Territory ownership transfer. Either side may be unowned.
    TerritoryOwner {
        territory: TerritoryName,
        old_owner: Option<PlayerName>,
        new_owner: Option<PlayerName>,
    },
    /// Add units to a holder (territory or player pool).
    AddUnits { holder: HolderRef, units: Vec<UnitId> },
    /// Remove units from a holder. Inverse of `AddUnits`.
    RemoveUnits { holder: HolderRef, units: Vec<UnitId> },
    /// Transfer ownership of individual units in a territory.
    UnitOwner {
        location: TerritoryName,
        old: BTreeMap<UnitId, PlayerName>,
        new: BTreeMap<UnitId, PlayerName>,
    },
    /// Set damage on units.
    UnitHits {
        old: BTreeMap<UnitId, u32>,
        new: BTreeMap<UnitId, u32>,
    },
    /// Credit or debit a player's resource stock. Inverse negates the delta.
    ResourceDelta {
        player: PlayerName,
        resource: ResourceName,
        delta: i64,
    },
    /// Switch which production frontier a player draws from.
    PlayerFrontier {
        player: PlayerName,
        old_frontier: FrontierName,
        new_frontier: FrontierName,
    },
    /// Add a production rule to a frontier.
    AddFrontierRule { frontier: FrontierName, rule: RuleName },
    /// Remove a production rule from a frontier. Inverse of `AddFrontierRule`.
    RemoveFrontierRule { frontier: FrontierName, rule: RuleName },
    /// Grant a technology to a player.
    AddTech { player: PlayerName, tech: TechName },
    /// Revoke a technology from a player. Inverse of `AddTech`.
    RemoveTech { player: PlayerName, tech: TechName },
    /// Change the relationship type between two players. The pair is
    /// unordered; constructors normalize it.
    Relationship {
        a: PlayerName,
        b: PlayerName,
        old_type: RelationshipTypeName,
        new_type: RelationshipTypeName,
    },
    /// Attach a named attachment, with its full property and default maps,
    /// to a territory or player.
    AddAttachment {
        attachable: AttachableRef,
        attachment: AttachmentSnapshot,
    },
    /// Detach an attachment. Inverse of `AddAttachment`; carries the detached
    /// attachment's data so the inverse can reattach it unchanged.
    RemoveAttachment {
        attachable: AttachableRef,
        attachment: AttachmentSnapshot,
    },
    /// Set a property on an attachment.
    AttachmentProperty {
        attachable: AttachableRef,
        attachment: AttachmentName,
        property: PropertyKey,
        old: PropertyValue,
        new: PropertyValue,
    },
    /// Reset an attachment property to its declared default. Stores the old
    /// value only; the default is resolved against live state at perform time.
    AttachmentPropertyReset {
        attachable: AttachableRef,
        attachment: AttachmentName,
        property: PropertyKey,
        old: PropertyValue,
    },
    /// Computed inverse of `AttachmentPropertyReset`. Not constructed
    /// directly by callers; only `invert` produces it.
    AttachmentPropertyRestore {
        attachable: AttachableRef,
        attachment: AttachmentName,
        property: PropertyKey,
        value: PropertyValue,
    },
    /// Generic property fallback: an explicit (kind, key, value) triple,
    /// validated against the static property schema at perform time.
    ObjectProperty {
        kind: EntityKind,
        name: String,
        property: PropertyKey,
        old: PropertyValue,
        new: PropertyValue,
    },
    /// Set a global game property.
    GameProperty {
        key: PropertyKey,
        old: Option<PropertyValue>,
        new: Option<PropertyValue>,
    },
    /// An ordered batch of changes that applies as one atomic unit.
    Composite(CompositeChange),
}

impl Change {
    /// The change that undoes this one. Pure: computed entirely from data
    /// captured at construction time.
    pub fn invert(&self) -> Change {
        match self {
            Change::TerritoryOwner {
                territory,
                old_owner,
                new_owner,
            } => Change::TerritoryOwner {
                territory: territory.clone(),
                old_owner: new_owner.clone(),
                new_owner: old_owner.clone(),
            },
            Change::AddUnits { holder, units } => Change::RemoveUnits {
                holder: holder.clone(),
                units: units.clone(),
            },
            Change::RemoveUnits { holder, units } => Change::AddUnits {
                holder: holder.clone(),
                units: units.clone(),
            },
            Change::UnitOwner { location, old, new } => Change::UnitOwner {
                location: location.clone(),
                old: new.clone(),
                new: old.clone(),
            },
            Change::UnitHits { old, new } => Change::UnitHits {
                old: new.clone(),
                new: old.clone(),
            },
            Change::ResourceDelta {
                player,
                resource,
                delta,
            } => Change::ResourceDelta {
                player: player.clone(),
                resource: resource.clone(),
                delta: -delta,
            },
            Change::PlayerFrontier {
                player,
                old_frontier,
                new_frontier,
            } => Change::PlayerFrontier {
                player: player.clone(),
                old_frontier: new_frontier.clone(),
                new_frontier: old_frontier.clone(),
            },
            Change::AddFrontierRule { frontier, rule } => Change::RemoveFrontierRule {
                frontier: frontier.clone(),
                rule: rule.clone(),
            },
            Change::RemoveFrontierRule { frontier, rule } => Change::AddFrontierRule {
                frontier: frontier.clone(),
                rule: rule.clone(),
            },
            Change::AddTech { player, tech } => Change::RemoveTech {
                player: player.clone(),
                tech: tech.clone(),
            },
            Change::RemoveTech { player, tech } => Change::AddTech {
                player: player.clone(),
                tech: tech.clone(),
            },
            Change::Relationship {
                a,
                b,
                old_type,
                new_type,
            } => Change::Relationship {
                a: a.clone(),
                b: b.clone(),
                old_type: new_type.clone(),
                new_type: old_type.clone(),
            },
            Change::AddAttachment {
                attachable,
                attachment,
            } => Change::RemoveAttachment {
                attachable: attachable.clone(),
                attachment: attachment.clone(),
            },
            Change::RemoveAttachment {
                attachable,
                attachment,
            } => Change::AddAttachment {
                attachable: attachable.clone(),
                attachment: attachment.clone(),
            },
            Change::AttachmentProperty {
                attachable,
                attachment,
                property,
                old,
                new,
            } => Change::AttachmentProperty {
                attachable: attachable.clone(),
                attachment: attachment.clone(),
                property: property.clone(),
                old: new.clone(),
                new: old.clone(),
            },
            Change::AttachmentPropertyReset {
                attachable,
                attachment,
                property,
                old,
            } => Change::AttachmentPropertyRestore {
                attachable: attachable.clone(),
                attachment: attachment.clone(),
                property: property.clone(),
                value: old.clone(),
            },
            Change::AttachmentPropertyRestore {
                attachable,
                attachment,
                property,
                value,
            } => Change::AttachmentPropertyReset {
                attachable: attachable.clone(),
                attachment: attachment.clone(),
                property: property.clone(),
                old: value.clone(),
            },
            Change::ObjectProperty {
                kind,
                name,
                property,
                old,
                new,
            } => Change::ObjectProperty {
                kind: *kind,
                name: name.clone(),
                property: property.clone(),
                old: new.clone(),
                new: old.clone(),
            },
            Change::GameProperty { key, old, new } => Change::GameProperty {
                key: key.clone(),
                old: new.clone(),
                new: old.clone(),
            },
            Change::Composite(composite) => Change::Composite(composite.invert()),
        }
    }

    /// Short tag naming the variant, used in consistency diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Change::TerritoryOwner { .. } => "TerritoryOwner",
            Change::AddUnits { .. } => "AddUnits",
            Change::RemoveUnits { .. } => "RemoveUnits",
            Change::UnitOwner { .. } => "UnitOwner",
            Change::UnitHits { .. } => "UnitHits",
            Change::ResourceDelta { .. } => "ResourceDelta",
            Change::PlayerFrontier { .. } => "PlayerFrontier",
            Change::AddFrontierRule { .. } => "AddFrontierRule",
            Change::RemoveFrontierRule { .. } => "RemoveFrontierRule",
            Change::AddTech { .. } => "AddTech",
            Change::RemoveTech { .. } => "RemoveTech",
            Change::Relationship { .. } => "Relationship",
            Change::AddAttachment { .. } => "AddAttachment",
            Change::RemoveAttachment { .. } => "RemoveAttachment",
            Change::AttachmentProperty { .. } => "AttachmentProperty",
            Change::AttachmentPropertyReset { .. } => "AttachmentPropertyReset",
            Change::AttachmentPropertyRestore { .. } => "AttachmentPropertyRestore",
            Change::ObjectProperty { .. } => "ObjectProperty",
            Change::GameProperty { .. } => "GameProperty",
            Change::Composite(_) => "Composite",
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::TerritoryOwner {
                territory,
                old_owner,
                new_owner,
            } => {
                let old = old_owner.as_ref().map(|p| p.as_str()).unwrap_or("nobody");
                let new = new_owner.as_ref().map(|p| p.as_str()).unwrap_or("nobody");
                write!(f, "{new} takes {territory} from {old}")
            }
            Change::AddUnits { holder, units } => {
                write!(f, "add {} unit(s) to {holder}", units.len())
            }
            Change::RemoveUnits { holder, units } => {
                write!(f, "remove {} unit(s) from {holder}", units.len())
            }
            Change::UnitOwner { location, new, .. } => {
                write!(f, "transfer {} unit(s) in {location}", new.len())
            }
            Change::UnitHits { new, .. } => write!(f, "set hits on {} unit(s)", new.len()),
            Change::ResourceDelta {
                player,
                resource,
                delta,
            } => write!(f, "{player}: {resource} {delta:+}"),
            Change::PlayerFrontier {
                player,
                new_frontier,
                ..
            } => write!(f, "{player} switches to frontier {new_frontier}"),
            Change::AddFrontierRule { frontier, rule } => {
                write!(f, "add rule {rule} to frontier {frontier}")
            }
            Change::RemoveFrontierRule { frontier, rule } => {
                write!(f, "remove rule {rule} from frontier {frontier}")
            }
            Change::AddTech { player, tech } => write!(f, "{player} gains tech {tech}"),
            Change::RemoveTech { player, tech } => write!(f, "{player} loses tech {tech}"),
            Change::Relationship {
                a, b, new_type, ..
            } => write!(f, "{a} and {b} are now {new_type}"),
            Change::AddAttachment {
                attachable,
                attachment,
            } => write!(f, "attach {} to {attachable}", attachment.name),
            Change::RemoveAttachment {
                attachable,
                attachment,
            } => write!(f, "detach {} from {attachable}", attachment.name),
            Change::AttachmentProperty {
                attachable,
                attachment,
                property,
                old,
                new,
            } => write!(
                f,
                "{attachable}/{attachment}.{property}: {old} -> {new}"
            ),
            Change::AttachmentPropertyReset {
                attachable,
                attachment,
                property,
                old,
            } => write!(
                f,
                "{attachable}/{attachment}.{property}: {old} -> default"
            ),
            Change::AttachmentPropertyRestore {
                attachable,
                attachment,
                property,
                value,
            } => write!(
                f,
                "{attachable}/{attachment}.{property}: restore {value}"
            ),
            Change::ObjectProperty {
                kind,
                name,
                property,
                old,
                new,
            } => write!(f, "{kind} {name}.{property}: {old} -> {new}"),
            Change::GameProperty { key, old, new } => {
                let old = old.as_ref().map(|v| v.to_string()).unwrap_or_default();
                let new = new.as_ref().map(|v| v.to_string()).unwrap_or_default();
                write!(f, "game property {key}: {old:?} -> {new:?}")
            }
            Change::Composite(composite) => write!(f, "{composite}"),
        }
    }
}

/// An ordered sequence of changes that behaves as a single change.
///
/// Order is significant: `perform` applies children first to last, and the
/// inverse applies the child inverses last to first, so undoing a batch
/// unwinds later effects before the earlier ones they may depend on. The
/// empty composite is a legal no-op.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeChange {
    changes: Vec<Change>,
}

impl CompositeChange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(changes: Vec<Change>) -> Self {
        Self { changes }
    }

    /// Append a change. Legal at any time before the composite is performed.
    pub fn add(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Reverse-ordered child inverses.
    pub fn invert(&self) -> CompositeChange {
        CompositeChange {
            changes: self.changes.iter().rev().map(Change::invert).collect(),
        }
    }
}

impl fmt::Display for CompositeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "composite of {} change(s)", self.changes.len())?;
        for change in &self.changes {
            write!(f, "; {change}")?;
        }
        Ok(())
    }
}

impl From<Change> for CompositeChange {
    fn from(change: Change) -> Self {
        match change {
            Change::Composite(composite) => composite,
            other => CompositeChange {
                changes: vec![other],
            },
        }
    }
}

/// Normalize an unordered player pair so relationship keys and changes
/// serialize identically regardless of argument order.
pub fn ordered_pair(a: PlayerName, b: PlayerName) -> (PlayerName, PlayerName) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ownership() -> Change {
        Change::TerritoryOwner {
            territory: "Norway".into(),
            old_owner: Some("Germany".into()),
            new_owner: Some("UK".into()),
        }
    }

    #[test]
    fn invert_swaps_ownership() {
        let change = ownership();
        let inverse = change.invert();
        match inverse {
            Change::TerritoryOwner {
                territory,
                old_owner,
                new_owner,
            } => {
                assert_eq!(territory, "Norway".into());
                assert_eq!(old_owner, Some("UK".into()));
                assert_eq!(new_owner, Some("Germany".into()));
            }
            other => panic!("unexpected inverse: {other:?}"),
        }
    }

    #[test]
    fn invert_is_an_involution_for_symmetric_variants() {
        let changes = vec![
            ownership(),
            Change::AddUnits {
                holder: HolderRef::territory("SeaZone5"),
                units: vec![UnitId(1), UnitId(2)],
            },
            Change::ResourceDelta {
                player: "Japan".into(),
                resource: "ipc".into(),
                delta: 12,
            },
            Change::AddTech {
                player: "UK".into(),
                tech: "radar".into(),
            },
            Change::GameProperty {
                key: "round-limit".into(),
                old: Some(PropertyValue::Int(20)),
                new: Some(PropertyValue::Int(30)),
            },
        ];
        for change in changes {
            assert_eq!(change.invert().invert(), change);
        }
    }

    #[test]
    fn resource_delta_inverse_negates() {
        let change = Change::ResourceDelta {
            player: "Germany".into(),
            resource: "ipc".into(),
            delta: -5,
        };
        match change.invert() {
            Change::ResourceDelta { delta, .. } => assert_eq!(delta, 5),
            other => panic!("unexpected inverse: {other:?}"),
        }
    }

    #[test]
    fn reset_inverts_to_restore_and_back() {
        let reset = Change::AttachmentPropertyReset {
            attachable: AttachableRef::player("Japan"),
            attachment: "techAttachment".into(),
            property: "techTokens".into(),
            old: PropertyValue::Int(3),
        };
        let restore = reset.invert();
        match &restore {
            Change::AttachmentPropertyRestore { value, .. } => {
                assert_eq!(*value, PropertyValue::Int(3));
            }
            other => panic!("unexpected inverse: {other:?}"),
        }
        assert_eq!(restore.invert(), reset);
    }

    #[test]
    fn attach_inverts_to_detach_and_back() {
        let attachment = AttachmentSnapshot {
            name: "techAttachment".into(),
            properties: BTreeMap::from([("techTokens".into(), PropertyValue::Int(3))]),
            defaults: BTreeMap::from([("techTokens".into(), PropertyValue::Int(0))]),
        };
        let add = Change::AddAttachment {
            attachable: AttachableRef::player("Japan"),
            attachment: attachment.clone(),
        };
        match add.invert() {
            Change::RemoveAttachment {
                attachment: detached,
                ..
            } => assert_eq!(detached, attachment),
            other => panic!("unexpected inverse: {other:?}"),
        }
        assert_eq!(add.invert().invert(), add);
    }

    #[test]
    fn composite_inverse_reverses_children() {
        let c1 = ownership();
        let c2 = Change::AddUnits {
            holder: HolderRef::territory("SeaZone5"),
            units: vec![UnitId(3)],
        };
        let c3 = Change::AttachmentProperty {
            attachable: AttachableRef::player("Japan"),
            attachment: "techAttachment".into(),
            property: "techTokens".into(),
            old: PropertyValue::Int(3),
            new: PropertyValue::Int(5),
        };

        let mut composite = CompositeChange::new();
        composite.add(c1.clone());
        composite.add(c2.clone());
        composite.add(c3.clone());

        let inverse = composite.invert();
        assert_eq!(
            inverse.changes(),
            &[c3.invert(), c2.invert(), c1.invert()]
        );
    }

    #[test]
    fn empty_composite_is_a_noop() {
        let composite = CompositeChange::new();
        assert!(composite.is_empty());
        assert!(composite.invert().is_empty());
    }

    #[test]
    fn nested_composite_inverts_recursively() {
        let inner = CompositeChange::of(vec![
            ownership(),
            Change::AddTech {
                player: "UK".into(),
                tech: "radar".into(),
            },
        ]);
        let outer = CompositeChange::of(vec![Change::Composite(inner.clone())]);
        let inverse = outer.invert();
        assert_eq!(inverse.changes(), &[Change::Composite(inner.invert())]);
    }

    #[test]
    fn ordered_pair_normalizes() {
        let (a, b) = ordered_pair("UK".into(), "Germany".into());
        assert_eq!((a.as_str(), b.as_str()), ("Germany", "UK"));
        let (a, b) = ordered_pair("Germany".into(), "UK".into());
        assert_eq!((a.as_str(), b.as_str()), ("Germany", "UK"));
    }

    #[test]
    fn debug_line_is_human_readable() {
        let line = ownership().to_string();
        assert_eq!(line, "UK takes Norway from Germany");
    }
}
