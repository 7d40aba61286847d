//! Components of the match director, leaf-first.
//!
//! ## Structure
//!
//! - [`backoff`] - Bounded exponential retry delays.
//! - [`backend`] - [`backend::BackendApi`] capability and [`backend::GrpcBackend`].
//! - [`stream`] - [`stream::MatchSession`] and [`stream::MatchStreamClient`].
//! - [`allocator`] - [`allocator::Allocator`] capability and fleet allocators.
//! - [`gate`] - Population gate run before any profile is dispatched.
//! - [`pipeline`] - [`pipeline::Director`], workers and per-match saga.
//! - [`profile`] - Loading profile documents from disk.
//! - [`config`] - Runtime configuration.
//! - [`telemetry`] - Logging, tracing and metrics setup.

pub mod allocator;
pub mod backend;
pub mod backoff;
pub mod config;
pub mod gate;
pub mod pipeline;
pub mod profile;
pub mod stream;
pub mod telemetry;
