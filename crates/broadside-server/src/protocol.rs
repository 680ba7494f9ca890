//! Session wire messages.
//!
//! Changes and snapshots travel as their versioned envelope encodings, so a
//! mirror on an older build fails decode at its own boundary instead of
//! misreading the payload.

use broadside_protocol::StateSnapshot;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("message decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Host-to-client messages.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Full state for a joining or resyncing client.
    FullSnapshot {
        snapshot: StateSnapshot,
        checksum: u64,
    },
    /// A composite was applied on the host. `change` is the envelope-encoded
    /// composite; `checksum` is the host state hash after application.
    ChangeApplied {
        seq: u64,
        round: u32,
        change: Vec<u8>,
        checksum: u64,
    },
    /// The host undid the entry with `seq`. `inverse` is the envelope-encoded
    /// inverse that was applied.
    ChangeUndone {
        seq: u64,
        inverse: Vec<u8>,
        checksum: u64,
    },
    /// The host moved to a new round.
    RoundAdvanced { round: u32, checksum: u64 },
    /// The session hit a fatal consistency failure and is gone.
    SessionClosed { reason: String },
}

pub fn serialize_server_message(message: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    Ok(rmp_serde::encode::to_vec_named(message)?)
}

pub fn deserialize_server_message(data: &[u8]) -> Result<ServerMessage, ProtocolError> {
    Ok(rmp_serde::decode::from_slice(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_round_trip() {
        let message = ServerMessage::ChangeApplied {
            seq: 7,
            round: 2,
            change: vec![1, 2, 3],
            checksum: 0xdead_beef,
        };
        let data = serialize_server_message(&message).unwrap();
        match deserialize_server_message(&data).unwrap() {
            ServerMessage::ChangeApplied {
                seq,
                round,
                change,
                checksum,
            } => {
                assert_eq!(seq, 7);
                assert_eq!(round, 2);
                assert_eq!(change, vec![1, 2, 3]);
                assert_eq!(checksum, 0xdead_beef);
            }
            other => panic!("wrong message type: {other:?}"),
        }
    }
}
