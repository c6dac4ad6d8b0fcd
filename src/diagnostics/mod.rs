//! Optional local HTTP introspection endpoint.
//!
//! Serves health and live scan counters while a scan runs. The scan never
//! depends on it.

pub mod server;

pub use server::{bind, router, serve, HealthResponse};
