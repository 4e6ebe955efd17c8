//! Dispatch pipeline: shot grouping in, vendor videos out.
//!
//! [`group_shots`] clusters a shot list into generation-sized groups;
//! [`Dispatcher::dispatch`] drives one group through submission, polling
//! and status bookkeeping.

pub mod config;
pub mod dispatcher;

pub use config::{ConfigError, PipelineConfig};
pub use dispatcher::Dispatcher;
pub use storyreel_core::grouping::{group_shots, GroupingConfig};
