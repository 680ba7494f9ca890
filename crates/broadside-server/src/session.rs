//! The host session task.
//!
//! One tokio task owns the `HostEngine`; nothing else can reach the state.
//! Clients talk to it through a request mailbox with oneshot replies, and
//! every applied or undone composite fans out on a broadcast channel in
//! application order.

use broadside_core::{EngineError, HostEngine};
use broadside_protocol::{wire, CompositeChange, PlayerName};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{error, info};

use crate::config::HostConfig;
use crate::protocol::ServerMessage;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum SessionError {
    /// Undo with nothing to undo. The session keeps running.
    #[error("nothing to undo")]
    EmptyHistory,
    /// A consistency violation or encode failure; the session has shut down.
    #[error("session failed: {0}")]
    Fatal(String),
    /// The session task is gone.
    #[error("session closed")]
    Closed,
}

pub enum SessionRequest {
    Submit {
        composite: CompositeChange,
        reply: oneshot::Sender<Result<u64, SessionError>>,
    },
    Undo {
        reply: oneshot::Sender<Result<u64, SessionError>>,
    },
    Snapshot {
        reply: oneshot::Sender<ServerMessage>,
    },
    Roll {
        player: PlayerName,
        sides: u32,
        count: usize,
        purpose: String,
        reply: oneshot::Sender<Vec<u32>>,
    },
    Checksum {
        reply: oneshot::Sender<u64>,
    },
    AdvanceRound,
}

/// Cheap cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<SessionRequest>,
    events: broadcast::Sender<ServerMessage>,
}

impl SessionHandle {
    /// Submit a composite for application. Resolves once the host has applied
    /// and recorded it (or rejected it fatally).
    pub async fn submit(&self, composite: CompositeChange) -> Result<u64, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(SessionRequest::Submit { composite, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Undo the most recent composite. Returns the undone sequence number.
    pub async fn undo(&self) -> Result<u64, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(SessionRequest::Undo { reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Fetch a full snapshot message for a joining or resyncing client.
    pub async fn snapshot(&self) -> Result<ServerMessage, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(SessionRequest::Snapshot { reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Roll dice on the host roller. Results land in the host audit log,
    /// never in the history log.
    pub async fn roll(
        &self,
        player: PlayerName,
        sides: u32,
        count: usize,
        purpose: impl Into<String>,
    ) -> Result<Vec<u32>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(SessionRequest::Roll {
                player,
                sides,
                count,
                purpose: purpose.into(),
                reply,
            })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn checksum(&self) -> Result<u64, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(SessionRequest::Checksum { reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn advance_round(&self) -> Result<(), SessionError> {
        self.requests
            .send(SessionRequest::AdvanceRound)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Subscribe to the ordered event stream. Subscribe before submitting if
    /// every event matters.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.events.subscribe()
    }
}

/// Spawn the session task around an engine. The handle is the only way in.
/// The engine's dice roller is reseeded from `config.dice_seed`.
pub fn spawn_session(engine: HostEngine, config: &HostConfig) -> SessionHandle {
    let (requests, mailbox) = mpsc::channel(config.mailbox_depth);
    let (events, _) = broadcast::channel(config.broadcast_depth);
    let handle = SessionHandle {
        requests,
        events: events.clone(),
    };
    tokio::spawn(run(engine.with_dice_seed(config.dice_seed), mailbox, events));
    handle
}

async fn run(
    mut engine: HostEngine,
    mut mailbox: mpsc::Receiver<SessionRequest>,
    events: broadcast::Sender<ServerMessage>,
) {
    info!(round = engine.state().round(), "session started");
    while let Some(request) = mailbox.recv().await {
        if let Err(failure) = handle_request(&mut engine, &events, request) {
            error!(%failure, "session aborting");
            let _ = events.send(ServerMessage::SessionClosed {
                reason: failure.to_string(),
            });
            return;
        }
    }
    info!("session mailbox closed, shutting down");
}

fn handle_request(
    engine: &mut HostEngine,
    events: &broadcast::Sender<ServerMessage>,
    request: SessionRequest,
) -> Result<(), EngineError> {
    match request {
        SessionRequest::Submit { composite, reply } => {
            // Encode before applying so the broadcast carries exactly what
            // was performed.
            let encoded = wire::encode_composite(&composite)?;
            match engine.apply_and_record(composite) {
                Ok(seq) => {
                    let checksum = engine.checksum()?;
                    let _ = events.send(ServerMessage::ChangeApplied {
                        seq,
                        round: engine.state().round(),
                        change: encoded,
                        checksum,
                    });
                    let _ = reply.send(Ok(seq));
                    Ok(())
                }
                Err(failure) => {
                    let _ = reply.send(Err(SessionError::Fatal(failure.to_string())));
                    Err(failure)
                }
            }
        }
        SessionRequest::Undo { reply } => match engine.undo_last() {
            Ok(entry) => {
                let inverse = wire::encode_composite(&entry.inverse)?;
                let checksum = engine.checksum()?;
                let _ = events.send(ServerMessage::ChangeUndone {
                    seq: entry.seq,
                    inverse,
                    checksum,
                });
                let _ = reply.send(Ok(entry.seq));
                Ok(())
            }
            Err(EngineError::EmptyHistory) => {
                let _ = reply.send(Err(SessionError::EmptyHistory));
                Ok(())
            }
            Err(failure) => {
                let _ = reply.send(Err(SessionError::Fatal(failure.to_string())));
                Err(failure)
            }
        },
        SessionRequest::Snapshot { reply } => {
            let checksum = engine.checksum()?;
            let _ = reply.send(ServerMessage::FullSnapshot {
                snapshot: engine.snapshot(),
                checksum,
            });
            Ok(())
        }
        SessionRequest::Roll {
            player,
            sides,
            count,
            purpose,
            reply,
        } => {
            let _ = reply.send(engine.roll_recorded(player, sides, count, purpose));
            Ok(())
        }
        SessionRequest::Checksum { reply } => {
            let _ = reply.send(engine.checksum()?);
            Ok(())
        }
        SessionRequest::AdvanceRound => {
            engine.advance_round();
            let checksum = engine.checksum()?;
            let _ = events.send(ServerMessage::RoundAdvanced {
                round: engine.state().round(),
                checksum,
            });
            Ok(())
        }
    }
}
