//! Vendor video-generation client library.
//!
//! Turns a [`GenerationRequest`](storyreel_core::generation::GenerationRequest)
//! into a vendor-specific payload, submits it over HTTP, and drives the
//! resulting task to a terminal state with a cancellable polling loop.

pub mod api;
pub mod builders;
pub mod error;
pub mod poller;
pub mod response;
pub mod task;
