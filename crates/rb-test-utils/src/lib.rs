// rb-test-utils: Shared test utilities for the remote-boot endpoint.
//
// Provides a mock coordinator WebSocket server for integration testing.

pub mod mock_coordinator;

pub use mock_coordinator::{CoordinatorConnection, MockCoordinator};
