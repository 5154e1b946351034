//! Signaling endpoint contract
//!
//! A single-shot request/response: the local offer goes out, the remote
//! answer comes back. The media servers this client talks to report failure
//! inside a 200 response body, so a decoded answer carries its own status
//! and [`SignalingAnswer::into_result`] turns a non-success status into
//! [`SignalingError::Rejected`].

use crate::errors::SignalingError;
use crate::types::StreamPath;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Status value the endpoint uses for success
pub const STATUS_SUCCESS: i64 = 0;

#[async_trait]
pub trait SignalingEndpoint: Send + Sync {
    async fn exchange(
        &self,
        path: &StreamPath,
        offer_sdp: &str,
    ) -> Result<SignalingAnswer, SignalingError>;
}

/// Response of the offer/answer exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingAnswer {
    #[serde(rename = "code")]
    pub status: i64,
    #[serde(rename = "id", default)]
    pub stream_id: Option<String>,
    #[serde(rename = "sdp", default)]
    pub remote_sdp: Option<String>,
    #[serde(rename = "msg", default)]
    pub message: Option<String>,
}

/// A successful answer with both fields present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedAnswer {
    pub stream_id: String,
    pub remote_sdp: String,
}

impl SignalingAnswer {
    pub fn success(stream_id: impl Into<String>, remote_sdp: impl Into<String>) -> Self {
        Self {
            status: STATUS_SUCCESS,
            stream_id: Some(stream_id.into()),
            remote_sdp: Some(remote_sdp.into()),
            message: None,
        }
    }

    pub fn rejected(status: i64, message: impl Into<String>) -> Self {
        Self {
            status,
            stream_id: None,
            remote_sdp: None,
            message: Some(message.into()),
        }
    }

    /// Decode a response body
    pub fn from_json(body: &str) -> Result<Self, SignalingError> {
        serde_json::from_str(body).map_err(|e| SignalingError::MalformedResponse(e.to_string()))
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// Validate status and required fields
    pub fn into_result(self) -> Result<AcceptedAnswer, SignalingError> {
        if !self.is_success() {
            return Err(SignalingError::Rejected {
                status: self.status,
                message: self.message.unwrap_or_else(|| "no message".to_string()),
            });
        }

        let remote_sdp = self
            .remote_sdp
            .filter(|sdp| !sdp.trim().is_empty())
            .ok_or_else(|| SignalingError::MalformedResponse("answer has no sdp".to_string()))?;

        Ok(AcceptedAnswer {
            stream_id: self.stream_id.unwrap_or_default(),
            remote_sdp,
        })
    }
}
