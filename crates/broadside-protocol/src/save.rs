use serde::{Deserialize, Serialize};

use crate::StateSnapshot;

/// Save file schema version.
pub const SAVE_VERSION: u32 = 1;

/// A persisted game session.
///
/// Loading restores `snapshot` directly and replays nothing; the history
/// entries are undo/display metadata only. Each entry keeps both directions
/// pre-encoded so undo after load never needs to re-invert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaveFile {
    pub version: u32,
    pub snapshot: StateSnapshot,
    #[serde(default)]
    pub history: Vec<SaveHistoryEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaveHistoryEntry {
    pub round: u32,
    pub seq: u64,
    /// Wire-encoded composite (see `wire::encode_composite`).
    pub change: Vec<u8>,
    /// Wire-encoded precomputed inverse.
    pub inverse: Vec<u8>,
}
