//! Broadside host session server.
//!
//! Hosts the authoritative engine behind a single task and fans applied
//! changes out to client mirrors in order.

pub mod config;
pub mod mirror;
pub mod protocol;
pub mod session;

pub use config::HostConfig;
pub use mirror::{ClientMirror, MirrorError};
pub use protocol::*;
pub use session::{spawn_session, SessionError, SessionHandle, SessionRequest};
