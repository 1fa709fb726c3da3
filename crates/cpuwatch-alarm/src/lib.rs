//! Threshold alarm evaluation.
//!
//! An [`evaluator::AlarmEvaluator`] consumes one aggregated datapoint per
//! period and tracks the alarm's state: `INSUFFICIENT_DATA` until
//! `evaluation_periods` consecutive periods have been seen, then `ALARM` when
//! every one of them breaches the threshold and `OK` otherwise. Transitions
//! are reported so the caller can fire the alarm's actions.

pub mod evaluator;
pub mod window;


pub use evaluator::{AlarmEvaluator, StateTransition};
