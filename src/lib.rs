pub mod convert;
pub mod geometry;
pub mod logger;
pub mod state;

pub use logger::*;
pub use state::{AppState, StateManager};
