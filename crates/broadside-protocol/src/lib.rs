//! Serializable surface of the Broadside engine: stable identities, the
//! invertible change catalog, the versioned wire codec, state snapshots,
//! save files, and audit records.

mod audit;
mod change;
mod ids;
mod save;
mod snapshot;
mod value;
pub mod wire;

pub use crate::audit::*;
pub use crate::change::*;
pub use crate::ids::*;
pub use crate::save::*;
pub use crate::snapshot::*;
pub use crate::value::*;
pub use crate::wire::{WireError, WIRE_VERSION};
