mod engine;
mod listeners;

pub use engine::{CountdownEngine, EngineState};
pub use listeners::ListenerSet;
