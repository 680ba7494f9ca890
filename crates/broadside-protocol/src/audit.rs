use serde::{Deserialize, Serialize};

use crate::PlayerName;

/// One entry in the parallel, non-authoritative audit log.
///
/// Audit entries record things that happened for display and dispute
/// resolution (dice rolls, applied/undone batches). They are never consulted
/// for undo and never replayed as state mutations; the history log alone is
/// authoritative for "what changed".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: u64,
    pub round: u32,
    pub event: AuditEvent,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuditEvent {
    DiceRolled {
        player: PlayerName,
        sides: u32,
        values: Vec<u32>,
        purpose: String,
    },
    ChangeApplied {
        seq: u64,
        summary: String,
    },
    ChangeUndone {
        seq: u64,
        summary: String,
    },
}
