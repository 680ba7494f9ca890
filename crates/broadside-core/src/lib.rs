mod audit;
mod dice;
mod engine;
mod history;
pub mod scenario;
mod schema;
mod state;

pub use crate::audit::*;
pub use crate::dice::*;
pub use crate::engine::*;
pub use crate::history::*;
pub use crate::scenario::{load_scenario, ScenarioError, ScenarioSource};
pub use crate::schema::*;
pub use crate::state::*;
