//! Value types shared by the backend, the alarm evaluator and the agent.

pub mod stats;
pub mod types;
