//! `stepwise-gateway` — the HTTP/WebSocket edge over the agent loop.
//!
//! Exposed as a library (in addition to the `stepwise` binary) so the
//! integration tests under `tests/` can drive the router in-process
//! without spawning the binary.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
