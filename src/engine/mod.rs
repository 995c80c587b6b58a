pub mod control;
pub mod rules;

pub use control::{ControlConfig, ControlPlane, LoopState, run_cycle};
pub use rules::{Replay, RuleEngine, RuleEngineState, RuleSet};
