//! Live view sessions
//!
//! `stream` owns one device's engine from establishment to disposal, and
//! `coordinator` serializes switching between devices.

/// Request serialization, teardown ordering and failure recovery
pub mod coordinator;
/// Single-device stream lifecycle
pub mod stream;

pub use coordinator::{CoordinatorStats, SessionCoordinator, SwitchOutcome};
pub use stream::{SessionEnvironment, SessionInfo, SessionState, StreamSession};
