//! Lazy, consumer-terminated sequences of candidate matches.
//!
//! A [`MatchSession`] owns exactly one `ListMatches` RPC. Every call to
//! [`MatchSession::open`] starts a fresh RPC, so repeated sessions on the same
//! profile are independent and never share a cursor. The session is closed on
//! every exit path: explicitly via [`MatchSession::close`], or implicitly when
//! it is dropped.
//!
//! [`MatchStreamClient::consume`] layers the callback contract on top: the
//! callback sees items in arrival order, one at a time, and decides whether
//! consumption continues.

mod client;
mod session;

pub use client::MatchStreamClient;
pub use session::MatchSession;
