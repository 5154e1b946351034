//! CrabView: live camera session management
//!
//! Lets a viewer flip rapidly between cameras while exactly one native
//! streaming engine is alive at a time. Switches are serialized behind one
//! session lock, teardown is followed by a short quiescence pause before the
//! next engine is built on the shared render context, and the render surface
//! attaches and detaches through a retargetable proxy independently of any
//! switch in progress.
//!
//! # Components
//! - [`render::FrameSinkProxy`]: forwards engine frames to whichever surface is bound
//! - [`session::StreamSession`]: one device's engine and its offer/answer handshake
//! - [`session::SessionCoordinator`]: serialized switching and published state
//! - [`config::CrabViewConfig`]: TOML configuration with environment overrides
//!
//! # Usage
//! ```rust,ignore
//! use crabview::{RenderContext, SessionCoordinator, SessionConfig};
//! use std::sync::Arc;
//!
//! let coordinator = Arc::new(SessionCoordinator::new(
//!     directory,
//!     signaling,
//!     engines,
//!     RenderContext::shared("main-egl"),
//!     &SessionConfig::default(),
//! ));
//!
//! coordinator.request_switch("cam-1".into(), false);
//! coordinator.attach_renderer(&surface);
//! ```
pub mod config;
pub mod directory;
pub mod engine;
pub mod errors;
pub mod render;
pub mod session;
pub mod signaling;
pub mod timing;
pub mod types;

// Synthetic collaborators - used by the CLI and by tests
pub mod testing;

// Re-exports for convenience
pub use config::{CrabViewConfig, SessionConfig};
pub use directory::{DeviceDirectory, StaticDeviceDirectory};
pub use engine::{EngineFactory, StreamEngine};
pub use errors::{ConfigError, DirectoryError, EngineError, RenderError, SessionError, SignalingError};
pub use render::{FrameSink, FrameSinkProxy, ProxyStats, RenderContext};
pub use session::{
    CoordinatorStats, SessionCoordinator, SessionEnvironment, SessionInfo, SessionState,
    StreamSession, SwitchOutcome,
};
pub use signaling::{SignalingAnswer, SignalingEndpoint};
pub use types::{ConnectionPayload, DeviceId, FrameFormat, SessionSnapshot, StreamPath, VideoFrame};

/// Initialize logging for the session manager
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crabview=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
