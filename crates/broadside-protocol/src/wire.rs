use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AuditEntry, CompositeChange, SaveFile, StateSnapshot};

/// Current wire schema version for encoded composites.
///
/// Version 1 encoded unit-holder references as bare territory names; the
/// legacy adapter below upgrades those payloads. Bump this when the change
/// catalog's encoding shifts, and register an upgrade path for the old
/// version instead of dropping it.
pub const WIRE_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("encode error: {0}")]
    Encode(#[from] encode::Error),
    #[error("decode error: {0}")]
    Decode(#[from] decode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported wire version {0} (no registered upgrade path)")]
    UnsupportedVersion(u32),
}

/// Versioned envelope: every encoded composite is tagged with its schema
/// version so save files stay loadable after the catalog evolves.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    payload: Vec<u8>,
}

pub fn encode_composite(composite: &CompositeChange) -> Result<Vec<u8>, WireError> {
    let envelope = Envelope {
        version: WIRE_VERSION,
        payload: encode::to_vec(composite)?,
    };
    Ok(encode::to_vec(&envelope)?)
}

pub fn decode_composite(bytes: &[u8]) -> Result<CompositeChange, WireError> {
    let envelope: Envelope = decode::from_slice(bytes)?;
    match envelope.version {
        WIRE_VERSION => Ok(decode::from_slice(&envelope.payload)?),
        1 => legacy::upgrade_v1(&envelope.payload),
        other => Err(WireError::UnsupportedVersion(other)),
    }
}

pub fn serialize_snapshot(snapshot: &StateSnapshot) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(snapshot)?)
}

pub fn deserialize_snapshot(bytes: &[u8]) -> Result<StateSnapshot, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_save(save: &SaveFile) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(save)?)
}

pub fn deserialize_save(bytes: &[u8]) -> Result<SaveFile, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_audit_entries(entries: &[AuditEntry]) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(entries)?)
}

pub fn deserialize_audit_entries(bytes: &[u8]) -> Result<Vec<AuditEntry>, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_composite_json(composite: &CompositeChange) -> Result<String, WireError> {
    Ok(serde_json::to_string(composite)?)
}

pub fn deserialize_composite_json(json: &str) -> Result<CompositeChange, WireError> {
    Ok(serde_json::from_str(json)?)
}

pub fn serialize_snapshot_json(snapshot: &StateSnapshot) -> Result<String, WireError> {
    Ok(serde_json::to_string(snapshot)?)
}

pub fn deserialize_snapshot_json(json: &str) -> Result<StateSnapshot, WireError> {
    Ok(serde_json::from_str(json)?)
}

/// Deterministic state checksum for desync detection.
///
/// Hashes the MessagePack-serialized snapshot using FNV-1a 64-bit.
pub fn state_hash(snapshot: &StateSnapshot) -> Result<u64, WireError> {
    let bytes = serialize_snapshot(snapshot)?;
    Ok(hash_bytes_fnv1a64(&bytes))
}

/// Deterministic, stable 64-bit hash for raw bytes (FNV-1a).
pub fn hash_bytes_fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

mod legacy {
    //! Wire version 1 payloads.
    //!
    //! Version 1 predates player mobilization pools: unit membership changes
    //! carried a bare territory name instead of a typed holder reference.
    //! Decoding a v1 payload produces the current in-memory representation.

    use std::collections::BTreeMap;

    use serde::Deserialize;

    use crate::{
        Change, CompositeChange, HolderRef, PlayerName, PropertyKey, PropertyValue, ResourceName,
        TerritoryName, UnitId,
    };

    use super::WireError;

    #[derive(Debug, Deserialize)]
    struct CompositeV1 {
        changes: Vec<ChangeV1>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(tag = "type")]
    enum ChangeV1 {
        TerritoryOwner {
            territory: TerritoryName,
            old_owner: Option<PlayerName>,
            new_owner: Option<PlayerName>,
        },
        AddUnits {
            territory: TerritoryName,
            units: Vec<UnitId>,
        },
        RemoveUnits {
            territory: TerritoryName,
            units: Vec<UnitId>,
        },
        UnitHits {
            old: BTreeMap<UnitId, u32>,
            new: BTreeMap<UnitId, u32>,
        },
        ResourceDelta {
            player: PlayerName,
            resource: ResourceName,
            delta: i64,
        },
        GameProperty {
            key: PropertyKey,
            old: Option<PropertyValue>,
            new: Option<PropertyValue>,
        },
        Composite(CompositeV1),
    }

    pub(super) fn upgrade_v1(payload: &[u8]) -> Result<CompositeChange, WireError> {
        let composite: CompositeV1 = rmp_serde::decode::from_slice(payload)?;
        Ok(upgrade_composite(composite))
    }

    fn upgrade_composite(composite: CompositeV1) -> CompositeChange {
        CompositeChange::of(composite.changes.into_iter().map(upgrade_change).collect())
    }

    fn upgrade_change(change: ChangeV1) -> Change {
        match change {
            ChangeV1::TerritoryOwner {
                territory,
                old_owner,
                new_owner,
            } => Change::TerritoryOwner {
                territory,
                old_owner,
                new_owner,
            },
            ChangeV1::AddUnits { territory, units } => Change::AddUnits {
                holder: HolderRef::territory(territory.0),
                units,
            },
            ChangeV1::RemoveUnits { territory, units } => Change::RemoveUnits {
                holder: HolderRef::territory(territory.0),
                units,
            },
            ChangeV1::UnitHits { old, new } => Change::UnitHits { old, new },
            ChangeV1::ResourceDelta {
                player,
                resource,
                delta,
            } => Change::ResourceDelta {
                player,
                resource,
                delta,
            },
            ChangeV1::GameProperty { key, old, new } => Change::GameProperty { key, old, new },
            ChangeV1::Composite(inner) => Change::Composite(upgrade_composite(inner)),
        }
    }
}
