//! AnalysisOrchestrator - Single-flight Analysis State Machine
//!
//! ## Responsibilities
//!
//! - Issue at most one analysis request at a time
//! - Track Idle / InFlight
//! - Defer mode changes requested while a request is in flight
//! - Classify failures into the shared error slot
//!
//! ## Settlement
//!
//! When a request resolves the stored result (on success) and the pending
//! mode (if any) are applied in the same step, under one lock. A result
//! computed under the old mode therefore stays visible after the mode has
//! switched.
//!
//! Once a request is InFlight, the service call and its settlement run on
//! a spawned task. A caller that stops waiting (aborted task, `select!`
//! branch, shutdown) does not strand the state machine; the request still
//! settles within the request bound.

use crate::ai_client::{AnalysisError, AnalysisService, DEFAULT_TIMEOUT_MS};
use crate::error::{Error, Result};
use crate::file_validator;
use crate::models::{AnalysisMode, AnalysisResult, InputBlob, PayloadDescriptor};
use crate::realtime_hub::{
    HubMessage, ModeChangedMessage, RealtimeHub, RequestSettledMessage, RequestStartedMessage,
};
use crate::transient_error::TransientErrorSlot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Request state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RequestState {
    #[default]
    Idle,
    InFlight {
        request_id: Uuid,
        payload: PayloadDescriptor,
        mode: AnalysisMode,
        started_at: DateTime<Utc>,
    },
}

impl RequestState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, RequestState::InFlight { .. })
    }

    fn is_request(&self, id: &Uuid) -> bool {
        matches!(self, RequestState::InFlight { request_id, .. } if request_id == id)
    }
}

/// How a mode change was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChange {
    /// Effective immediately
    Applied,
    /// Recorded as pending until the in-flight request settles
    Deferred,
}

#[derive(Default)]
struct OrchestratorState {
    effective_mode: AnalysisMode,
    pending_mode: Option<AnalysisMode>,
    request: RequestState,
    result: Option<AnalysisResult>,
    settled_count: u64,
}

/// State and collaborators shared with request tasks
struct Shared {
    service: Arc<dyn AnalysisService>,
    errors: Arc<TransientErrorSlot>,
    hub: Arc<RealtimeHub>,
    state: RwLock<OrchestratorState>,
}

/// AnalysisOrchestrator instance
pub struct AnalysisOrchestrator {
    shared: Arc<Shared>,
    request_timeout: Duration,
}

impl AnalysisOrchestrator {
    /// Create new AnalysisOrchestrator
    pub fn new(
        service: Arc<dyn AnalysisService>,
        errors: Arc<TransientErrorSlot>,
        hub: Arc<RealtimeHub>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                service,
                errors,
                hub,
                state: RwLock::new(OrchestratorState::default()),
            }),
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Upper bound on a single request, independent of the service's own timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Submit a payload for analysis under the effective mode
    ///
    /// Returns `Ok(None)` without side effects when a request is already
    /// in flight. Failures are surfaced into the error slot and returned.
    pub async fn submit(&self, payload: &InputBlob) -> Result<Option<AnalysisResult>> {
        let (request_id, mode) = {
            let mut state = self.shared.state.write().await;

            if let RequestState::InFlight { request_id, .. } = &state.request {
                tracing::debug!(
                    in_flight = %request_id,
                    file_name = %payload.name,
                    "Submit ignored, request already in flight"
                );
                return Ok(None);
            }

            if let Err(e) = file_validator::validate(Some(payload)).into_result() {
                drop(state);
                self.shared.surface(&e).await;
                return Err(e);
            }

            let request_id = Uuid::new_v4();
            let mode = state.effective_mode;
            state.request = RequestState::InFlight {
                request_id,
                payload: payload.descriptor(),
                mode,
                started_at: Utc::now(),
            };
            (request_id, mode)
        };

        let shared = Arc::clone(&self.shared);
        let payload = payload.clone();
        let timeout = self.request_timeout;
        let task =
            tokio::spawn(async move { shared.run(request_id, payload, mode, timeout).await });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Analysis task failed");
                let fault = AnalysisError::ClientSideFault("Analysis task failed".to_string());
                self.shared.settle(request_id, Err(fault), 0).await
            }
        }
    }

    /// Change the analysis mode
    ///
    /// Idle: applied at once and the stored result is cleared.
    /// In flight: recorded as pending (last one wins), result untouched.
    pub async fn change_mode(&self, mode: AnalysisMode) -> ModeChange {
        let (change, effective, pending, cleared) = {
            let mut state = self.shared.state.write().await;
            if state.request.is_in_flight() {
                state.pending_mode = Some(mode);
                (ModeChange::Deferred, state.effective_mode, Some(mode), false)
            } else {
                state.effective_mode = mode;
                let cleared = state.result.take().is_some();
                (ModeChange::Applied, mode, None, cleared)
            }
        };

        tracing::info!(mode = %mode, change = ?change, "Mode change requested");

        let hub = &self.shared.hub;
        hub.broadcast(HubMessage::ModeChanged(ModeChangedMessage {
            effective_mode: effective,
            pending_mode: pending,
        }))
        .await;
        if cleared {
            hub.broadcast(HubMessage::ResultCleared).await;
        }

        change
    }

    /// Drop the stored result. Returns true if there was one.
    pub async fn clear_result(&self) -> bool {
        let cleared = self.shared.state.write().await.result.take().is_some();
        if cleared {
            self.shared.hub.broadcast(HubMessage::ResultCleared).await;
        }
        cleared
    }

    pub async fn effective_mode(&self) -> AnalysisMode {
        self.shared.state.read().await.effective_mode
    }

    pub async fn pending_mode(&self) -> Option<AnalysisMode> {
        self.shared.state.read().await.pending_mode
    }

    pub async fn request_state(&self) -> RequestState {
        self.shared.state.read().await.request.clone()
    }

    pub async fn is_in_flight(&self) -> bool {
        self.shared.state.read().await.request.is_in_flight()
    }

    pub async fn result(&self) -> Option<AnalysisResult> {
        self.shared.state.read().await.result.clone()
    }

    /// Number of settled requests
    pub async fn settled_count(&self) -> u64 {
        self.shared.state.read().await.settled_count
    }
}

impl Shared {
    /// Issue the request and settle it
    async fn run(
        &self,
        request_id: Uuid,
        payload: InputBlob,
        mode: AnalysisMode,
        timeout: Duration,
    ) -> Result<Option<AnalysisResult>> {
        if self.errors.clear() {
            self.hub.broadcast(HubMessage::ErrorCleared).await;
        }

        self.hub
            .broadcast(HubMessage::RequestStarted(RequestStartedMessage {
                request_id,
                payload: payload.descriptor(),
                mode,
            }))
            .await;

        let started = tokio::time::Instant::now();
        let outcome = match tokio::time::timeout(timeout, self.service.analyze(&payload, mode)).await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    request_id = %request_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Analysis request timed out"
                );
                Err(AnalysisError::NoResponse)
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        self.settle(request_id, outcome, elapsed_ms).await
    }

    /// Resolve the in-flight request: store result, go Idle, apply pending mode
    async fn settle(
        &self,
        request_id: Uuid,
        outcome: std::result::Result<AnalysisResult, AnalysisError>,
        elapsed_ms: u64,
    ) -> Result<Option<AnalysisResult>> {
        let settled = {
            let mut state = self.state.write().await;
            if state.request.is_request(&request_id) {
                state.request = RequestState::Idle;
                state.settled_count += 1;

                if let Ok(result) = &outcome {
                    state.result = Some(result.clone());
                }

                let applied = state.pending_mode.take().map(|mode| {
                    state.effective_mode = mode;
                    mode
                });
                Some((applied, state.settled_count))
            } else {
                None
            }
        };

        let Some((applied_mode, settled_count)) = settled else {
            tracing::debug!(request_id = %request_id, "Request already settled");
            return outcome.map(Some).map_err(Error::Analysis);
        };

        let message = match &outcome {
            Ok(result) => {
                tracing::info!(
                    request_id = %request_id,
                    has_bad_posture = result.has_bad_posture,
                    issue_count = result.issues.len(),
                    elapsed_ms = elapsed_ms,
                    settled_count = settled_count,
                    "Analysis completed"
                );
                RequestSettledMessage {
                    request_id,
                    success: true,
                    has_bad_posture: Some(result.has_bad_posture),
                    issue_count: result.issues.len(),
                    error: None,
                    elapsed_ms,
                }
            }
            Err(e) => RequestSettledMessage {
                request_id,
                success: false,
                has_bad_posture: None,
                issue_count: 0,
                error: Some(Error::Analysis(e.clone()).user_message()),
                elapsed_ms,
            },
        };
        self.hub.broadcast(HubMessage::RequestSettled(message)).await;

        if let Some(mode) = applied_mode {
            tracing::info!(mode = %mode, "Pending mode applied");
            self.hub
                .broadcast(HubMessage::ModeChanged(ModeChangedMessage {
                    effective_mode: mode,
                    pending_mode: None,
                }))
                .await;
        }

        match outcome {
            Ok(result) => Ok(Some(result)),
            Err(e) => {
                let err = Error::Analysis(e);
                self.surface(&err).await;
                Err(err)
            }
        }
    }

    async fn surface(&self, err: &Error) {
        let error = self.errors.raise_error(err);
        self.hub.broadcast(HubMessage::ErrorRaised(error)).await;
    }
}
