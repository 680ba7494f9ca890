//! Client-side state mirror.
//!
//! A mirror never mutates state on its own: it replays the host's ordered
//! event stream through the same apply path the host used, then compares
//! state hashes. Any divergence is a desync and the mirror must resync from
//! a fresh snapshot.

use broadside_core::{apply_composite, ConsistencyViolation, GameState};
use broadside_protocol::{wire, StateSnapshot, WireError};
use thiserror::Error;
use tracing::warn;

use crate::protocol::ServerMessage;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Consistency(#[from] ConsistencyViolation),
    /// Post-apply hash does not match the host's. `seq` is the event that
    /// exposed the divergence, or `None` when it carried no sequence number
    /// (snapshots and round advances). The mirror state can no longer be
    /// trusted.
    #[error("desync at seq {seq:?}: host {host:#018x}, mirror {mirror:#018x}")]
    Desync {
        seq: Option<u64>,
        host: u64,
        mirror: u64,
    },
    #[error("session closed: {0}")]
    SessionClosed(String),
}

pub struct ClientMirror {
    state: GameState,
    last_seq: Option<u64>,
}

impl ClientMirror {
    pub fn from_snapshot(snapshot: &StateSnapshot) -> Self {
        Self {
            state: GameState::from_snapshot(snapshot),
            last_seq: None,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    pub fn checksum(&self) -> Result<u64, WireError> {
        wire::state_hash(&self.state.snapshot())
    }

    /// Feed one host event into the mirror.
    pub fn handle(&mut self, message: &ServerMessage) -> Result<(), MirrorError> {
        match message {
            ServerMessage::FullSnapshot { snapshot, checksum } => {
                self.state = GameState::from_snapshot(snapshot);
                self.last_seq = None;
                self.verify(None, *checksum)
            }
            ServerMessage::ChangeApplied {
                seq,
                round,
                change,
                checksum,
            } => {
                let composite = wire::decode_composite(change)?;
                apply_composite(&mut self.state, &composite)?;
                debug_assert_eq!(self.state.round(), *round);
                self.verify(Some(*seq), *checksum)?;
                self.last_seq = Some(*seq);
                Ok(())
            }
            ServerMessage::RoundAdvanced { round, checksum } => {
                while self.state.round() < *round {
                    self.state.advance_round();
                }
                self.verify(None, *checksum)
            }
            ServerMessage::ChangeUndone {
                seq,
                inverse,
                checksum,
            } => {
                let composite = wire::decode_composite(inverse)?;
                apply_composite(&mut self.state, &composite)?;
                self.verify(Some(*seq), *checksum)
            }
            ServerMessage::SessionClosed { reason } => {
                warn!(%reason, "host closed the session");
                Err(MirrorError::SessionClosed(reason.clone()))
            }
        }
    }

    fn verify(&self, seq: Option<u64>, host: u64) -> Result<(), MirrorError> {
        let mirror = self.checksum()?;
        if mirror != host {
            return Err(MirrorError::Desync { seq, host, mirror });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use broadside_core::{load_scenario, ScenarioSource};
    use broadside_protocol::{Change, CompositeChange};

    use super::*;

    fn snapshot() -> StateSnapshot {
        load_scenario(ScenarioSource::Embedded)
            .expect("scenario")
            .snapshot()
    }

    #[test]
    fn round_advance_desync_carries_no_seq() {
        let mut mirror = ClientMirror::from_snapshot(&snapshot());
        let bad = ServerMessage::RoundAdvanced {
            round: 2,
            checksum: 1,
        };
        match mirror.handle(&bad) {
            Err(MirrorError::Desync { seq: None, .. }) => {}
            other => panic!("expected seq-less Desync, got {other:?}"),
        }
    }

    #[test]
    fn applied_change_desync_names_its_seq() {
        let mut mirror = ClientMirror::from_snapshot(&snapshot());
        let composite = CompositeChange::from(Change::TerritoryOwner {
            territory: "Norway".into(),
            old_owner: Some("Germany".into()),
            new_owner: Some("UK".into()),
        });
        let bad = ServerMessage::ChangeApplied {
            seq: 3,
            round: 1,
            change: wire::encode_composite(&composite).expect("encode"),
            checksum: 1,
        };
        match mirror.handle(&bad) {
            Err(MirrorError::Desync { seq: Some(3), .. }) => {}
            other => panic!("expected Desync at seq 3, got {other:?}"),
        }
    }
}
