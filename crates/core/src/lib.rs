//! Domain logic for turning a shot list into vendor-ready generation jobs.
//!
//! Everything in this crate is pure (no I/O, no async) so it can be shared
//! by the vendor client, the dispatch pipeline, and any tooling.

pub mod assets;
pub mod credentials;
pub mod error;
pub mod failure;
pub mod generation;
pub mod group_store;
pub mod grouping;
pub mod protocol;
pub mod shot;
pub mod shot_group;
pub mod types;
