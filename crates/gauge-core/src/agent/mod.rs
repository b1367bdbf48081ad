pub mod loop_;
pub mod prompt;

pub use loop_::{AgentLoop, LoopConfig, LoopOutcome};
