use std::time::Duration;
use thiserror::Error;

use crate::types::DeviceId;

/// Failure while establishing or tearing down a stream session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Path resolution error for device {device_id}: {reason}")]
    PathResolution { device_id: DeviceId, reason: String },
    #[error("Engine initialization error: {0}")]
    EngineInit(String),
    #[error("Offer creation error: {0}")]
    OfferCreation(String),
    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),
    #[error("Remote answer rejected: {0}")]
    AnswerRejected(String),
    #[error("Engine disposal error: {0}")]
    EngineDisposal(String),
    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

impl SessionError {
    /// Short stable label, used for logs and stats
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::PathResolution { .. } => "path_resolution",
            SessionError::EngineInit(_) => "engine_init",
            SessionError::OfferCreation(_) => "offer_creation",
            SessionError::Signaling(_) => "signaling",
            SessionError::AnswerRejected(_) => "answer_rejected",
            SessionError::EngineDisposal(_) => "engine_disposal",
            SessionError::InvalidState(_) => "invalid_state",
        }
    }
}

/// Failure of the offer/answer exchange with the signaling endpoint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalingError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("endpoint returned status {status}: {message}")]
    Rejected { status: i64, message: String },
    #[error("no answer within {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Device directory lookup failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("device not found: {0}")]
    NotFound(DeviceId),
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Error raised by the native engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Error raised by a render surface while handling a frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("render error: {0}")]
pub struct RenderError(pub String);

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Configuration loading, saving and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
