use std::collections::BTreeMap;

use broadside_protocol::{EntityKind, PropertyKey, PropertyValue, SchemaEntry, ValueKind};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("no declared property '{key}' on {kind}")]
    UnknownProperty { kind: EntityKind, key: PropertyKey },
    #[error("property '{key}' on {kind} expects {expected}, got {got}")]
    KindMismatch {
        kind: EntityKind,
        key: PropertyKey,
        expected: ValueKind,
        got: ValueKind,
    },
}

/// Static table of the properties the generic fallback change may touch.
///
/// Declared once by the scenario and identical on every process. A generic
/// property change that names an undeclared key, or carries a value of the
/// wrong kind, is rejected before it reaches state. This is the closed
/// replacement for reflective field access.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertySchema {
    entries: BTreeMap<(EntityKind, PropertyKey), ValueKind>,
}

impl PropertySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, kind: EntityKind, key: PropertyKey, value_kind: ValueKind) {
        self.entries.insert((kind, key), value_kind);
    }

    pub fn validate(
        &self,
        kind: EntityKind,
        key: &PropertyKey,
        value: &PropertyValue,
    ) -> Result<(), SchemaError> {
        let expected = self
            .entries
            .get(&(kind, key.clone()))
            .copied()
            .ok_or_else(|| SchemaError::UnknownProperty {
                kind,
                key: key.clone(),
            })?;
        let got = value.kind();
        if got != expected {
            return Err(SchemaError::KindMismatch {
                kind,
                key: key.clone(),
                expected,
                got,
            });
        }
        Ok(())
    }

    pub fn to_entries(&self) -> Vec<SchemaEntry> {
        self.entries
            .iter()
            .map(|((kind, key), value_kind)| SchemaEntry {
                kind: *kind,
                key: key.clone(),
                value_kind: *value_kind,
            })
            .collect()
    }

    pub fn from_entries(entries: &[SchemaEntry]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|e| ((e.kind, e.key.clone()), e.value_kind))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_declared_property() {
        let mut schema = PropertySchema::new();
        schema.declare(EntityKind::Unit, "movement".into(), ValueKind::Int);

        assert_eq!(
            schema.validate(EntityKind::Unit, &"movement".into(), &PropertyValue::Int(2)),
            Ok(())
        );
    }

    #[test]
    fn rejects_unknown_key() {
        let schema = PropertySchema::new();
        let err = schema
            .validate(EntityKind::Unit, &"movement".into(), &PropertyValue::Int(2))
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownProperty { .. }));
    }

    #[test]
    fn rejects_wrong_value_kind() {
        let mut schema = PropertySchema::new();
        schema.declare(EntityKind::Territory, "victoryCity".into(), ValueKind::Bool);

        let err = schema
            .validate(
                EntityKind::Territory,
                &"victoryCity".into(),
                &PropertyValue::Int(1),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::KindMismatch {
                expected: ValueKind::Bool,
                got: ValueKind::Int,
                ..
            }
        ));
    }

    #[test]
    fn entries_round_trip() {
        let mut schema = PropertySchema::new();
        schema.declare(EntityKind::Unit, "movement".into(), ValueKind::Int);
        schema.declare(EntityKind::Player, "capital".into(), ValueKind::Text);

        let restored = PropertySchema::from_entries(&schema.to_entries());
        assert_eq!(restored, schema);
    }
}
