//! Scripted signaling endpoint

use super::synthetic_data::synthetic_answer_sdp;
use crate::errors::SignalingError;
use crate::signaling::{SignalingAnswer, SignalingEndpoint};
use crate::types::StreamPath;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// What the endpoint does for one exchange
#[derive(Debug, Clone)]
pub enum SignalingScript {
    /// Successful answer generated for the requested stream
    Answer,
    /// Return this answer verbatim
    Reply(SignalingAnswer),
    Fail(SignalingError),
    /// Never respond
    Hang,
    /// Answer successfully after a delay
    Delay(Duration),
}

struct ScriptState {
    queue: VecDeque<SignalingScript>,
    default: SignalingScript,
    calls: Vec<StreamPath>,
}

/// Endpoint that plays queued scripts, then falls back to a default
pub struct ScriptedSignaling {
    state: Mutex<ScriptState>,
}

impl ScriptedSignaling {
    /// Answers every exchange successfully
    pub fn new() -> Self {
        Self::with_default(SignalingScript::Answer)
    }

    /// Never answers; exercises the signaling timeout
    pub fn hanging() -> Self {
        Self::with_default(SignalingScript::Hang)
    }

    pub fn failing(error: SignalingError) -> Self {
        Self::with_default(SignalingScript::Fail(error))
    }

    fn with_default(default: SignalingScript) -> Self {
        Self {
            state: Mutex::new(ScriptState {
                queue: VecDeque::new(),
                default,
                calls: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a script for the next unscripted exchange
    pub fn push(&self, script: SignalingScript) {
        self.lock().queue.push_back(script);
    }

    pub fn set_default(&self, script: SignalingScript) {
        self.lock().default = script;
    }

    /// Stream paths of every exchange so far
    pub fn calls(&self) -> Vec<StreamPath> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }
}

impl Default for ScriptedSignaling {
    fn default() -> Self {
        Self::new()
    }
}

fn answer_for(path: &StreamPath, sequence: usize) -> SignalingAnswer {
    SignalingAnswer::success(
        format!("{}_{}", path.stream, sequence),
        synthetic_answer_sdp(&path.stream, sequence as u64),
    )
}

#[async_trait]
impl SignalingEndpoint for ScriptedSignaling {
    async fn exchange(
        &self,
        path: &StreamPath,
        offer_sdp: &str,
    ) -> Result<SignalingAnswer, SignalingError> {
        if !offer_sdp.starts_with("v=0") {
            return Err(SignalingError::Transport("offer is not a session description".to_string()));
        }

        let (script, sequence) = {
            let mut state = self.lock();
            state.calls.push(path.clone());
            let script = state
                .queue
                .pop_front()
                .unwrap_or_else(|| state.default.clone());
            (script, state.calls.len())
        };
        log::debug!("Scripted signaling for {}: {:?}", path, script);

        match script {
            SignalingScript::Answer => Ok(answer_for(path, sequence)),
            SignalingScript::Reply(answer) => Ok(answer),
            SignalingScript::Fail(error) => Err(error),
            SignalingScript::Hang => std::future::pending().await,
            SignalingScript::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(answer_for(path, sequence))
            }
        }
    }
}
