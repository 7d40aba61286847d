//! # `match-director`: Match Consumption and Allocation Pipeline
//!
//! `match-director` pulls candidate matches from a matchmaking backend,
//! provisions a game server for each accepted match and hands the connection
//! string back to the backend so players can be routed to it.
//!
//! ## Highlights
//!
//! - **Population gate**: Dispatch starts only once enough players are
//!   indexed, or the process gives up at a deadline.
//! - **One worker per profile**: Profiles make progress independently, each
//!   through a bounded series of `ListMatches` sessions.
//! - **Retry, then commit**: Allocation is retried under exponential backoff;
//!   assignment is sent once and rolled back (the reservation is released) if
//!   it fails.
//! - **Scoped streams**: Every session is closed on every exit path.
//!
//! ## Module Overview
//!
//! - [`director::config`] - CLI/env configuration.
//! - [`director::backend`] - Backend capability and its gRPC implementation.
//! - [`director::stream`] - Match stream sessions and consumption.
//! - [`director::gate`] - Population gate.
//! - [`director::allocator`] - Allocator capability and the Agones allocator.
//! - [`director::backoff`] - Retry delay policy.
//! - [`director::pipeline`] - The director: workers and per-match processing.

pub mod director;
