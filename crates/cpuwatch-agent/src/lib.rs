//! CPU utilization monitor: provisions one threshold alarm, then samples the
//! metric on a fixed interval until asked to stop, then removes the alarm.

pub mod app;
pub mod config;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod provisioner;
pub mod report;
pub mod sampler;
