//! Broadside demo host.
//!
//! Loads a scenario, spins up a session with two mirrors, plays a short
//! scripted turn, and undoes it again, logging checksums along the way.

use broadside_core::{load_scenario, HostEngine, ScenarioSource};
use broadside_protocol::{Change, CompositeChange, HolderRef};
use tracing::{error, info};

use broadside_server::{spawn_session, ClientMirror, HostConfig, ServerMessage, SessionError};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "broadside_server=info".into()),
        )
        .init();

    info!("Broadside host v{}", env!("CARGO_PKG_VERSION"));

    let config = HostConfig::default();
    let state = match &config.scenario_path {
        Some(path) => load_scenario(ScenarioSource::Path(path.clone())),
        None => load_scenario(ScenarioSource::Embedded),
    };
    let state = match state {
        Ok(state) => state,
        Err(failure) => {
            error!("scenario load failed: {failure}");
            std::process::exit(1);
        }
    };

    let session = spawn_session(HostEngine::new(state), &config);
    if let Err(failure) = run_demo(&session).await {
        error!("demo failed: {failure}");
        std::process::exit(1);
    }
}

async fn run_demo(session: &broadside_server::SessionHandle) -> Result<(), SessionError> {
    let mut events_a = session.subscribe();
    let mut events_b = session.subscribe();

    let ServerMessage::FullSnapshot { snapshot, checksum } = session.snapshot().await? else {
        return Err(SessionError::Closed);
    };
    info!(checksum = format_args!("{checksum:#018x}"), "session ready");

    let mut mirror_a = ClientMirror::from_snapshot(&snapshot);
    let mut mirror_b = ClientMirror::from_snapshot(&snapshot);

    // A scripted turn: the UK takes Norway and lands a unit offshore.
    let landing = *snapshot
        .players
        .iter()
        .find(|p| p.name.as_str() == "UK")
        .and_then(|p| p.units.first())
        .expect("UK pool unit");
    let turn = CompositeChange::of(vec![
        Change::TerritoryOwner {
            territory: "Norway".into(),
            old_owner: Some("Germany".into()),
            new_owner: Some("UK".into()),
        },
        Change::RemoveUnits {
            holder: HolderRef::player("UK"),
            units: vec![landing],
        },
        Change::AddUnits {
            holder: HolderRef::territory("SeaZone5"),
            units: vec![landing],
        },
        Change::ResourceDelta {
            player: "UK".into(),
            resource: "ipc".into(),
            delta: -8,
        },
    ]);

    let seq = session.submit(turn).await?;
    info!(seq, "turn applied");
    let rolls = session.roll("UK".into(), 6, 3, "shore bombardment").await?;
    info!(?rolls, "shore bombardment resolved");
    let undone = session.undo().await?;
    info!(seq = undone, "turn undone");

    // Both mirrors replay the stream; any desync surfaces here.
    for _ in 0..2 {
        for (name, mirror, events) in [
            ("A", &mut mirror_a, &mut events_a),
            ("B", &mut mirror_b, &mut events_b),
        ] {
            let event = events.recv().await.map_err(|_| SessionError::Closed)?;
            if let Err(failure) = mirror.handle(&event) {
                error!(mirror = name, "mirror diverged: {failure}");
                return Err(SessionError::Fatal(failure.to_string()));
            }
        }
    }

    let host = session.checksum().await?;
    info!(
        host = format_args!("{host:#018x}"),
        "all mirrors in sync, shutting down"
    );
    Ok(())
}
