// endpoint: Library entry point.
// Exposes modules for integration testing.

pub mod agent;
pub mod channel;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod net;
pub mod pending;
pub mod registry;
pub mod scheduler;
