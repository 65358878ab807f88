//! RealtimeHub - Session State Distribution
//!
//! ## Responsibilities
//!
//! - Subscriber management
//! - Fan-out of session state changes (input, mode, request, result, error)
//!
//! Note: only change NOTIFICATIONS are distributed. Subscribers read the
//! full picture through `CaptureSession::snapshot()`; frame bytes never go
//! through the hub.

use crate::input_source::{FileInfo, InputSourceKind};
use crate::models::{AnalysisMode, PayloadDescriptor};
use crate::transient_error::TransientError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Hub message types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubMessage {
    InputChanged(InputChangedMessage),
    ModeChanged(ModeChangedMessage),
    RequestStarted(RequestStartedMessage),
    RequestSettled(RequestSettledMessage),
    ResultCleared,
    ErrorRaised(TransientError),
    ErrorCleared,
}

impl HubMessage {
    pub fn message_type(&self) -> &'static str {
        match self {
            HubMessage::InputChanged(_) => "input_changed",
            HubMessage::ModeChanged(_) => "mode_changed",
            HubMessage::RequestStarted(_) => "request_started",
            HubMessage::RequestSettled(_) => "request_settled",
            HubMessage::ResultCleared => "result_cleared",
            HubMessage::ErrorRaised(_) => "error_raised",
            HubMessage::ErrorCleared => "error_cleared",
        }
    }
}

/// Active input replaced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputChangedMessage {
    pub kind: InputSourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileInfo>,
}

/// Effective or pending mode updated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeChangedMessage {
    pub effective_mode: AnalysisMode,
    /// Set while a request is in flight and a change is waiting for settlement
    pub pending_mode: Option<AnalysisMode>,
}

/// Analysis request issued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStartedMessage {
    pub request_id: Uuid,
    pub payload: PayloadDescriptor,
    pub mode: AnalysisMode,
}

/// Analysis request resolved (result or failure)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSettledMessage {
    pub request_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_bad_posture: Option<bool>,
    pub issue_count: usize,
    /// User-facing failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Subscriber connection
struct Subscriber {
    id: Uuid,
    name: String,
    tx: mpsc::UnboundedSender<HubMessage>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
    subscriber_count: AtomicU64,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            subscriber_count: AtomicU64::new(0),
        }
    }

    /// Register a new subscriber
    pub async fn register(
        &self,
        name: impl Into<String>,
    ) -> (Uuid, mpsc::UnboundedReceiver<HubMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let name = name.into();

        tracing::debug!(subscriber_id = %id, name = %name, "Subscriber registered");

        self.subscribers
            .write()
            .await
            .insert(id, Subscriber { id, name, tx });
        self.subscriber_count.fetch_add(1, Ordering::Relaxed);

        (id, rx)
    }

    /// Unregister a subscriber
    pub async fn unregister(&self, id: &Uuid) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(sub) = subscribers.remove(id) {
            self.subscriber_count.fetch_sub(1, Ordering::Relaxed);
            tracing::debug!(subscriber_id = %id, name = %sub.name, "Subscriber removed");
        }
    }

    /// Broadcast message to all subscribers
    ///
    /// Subscribers whose receiver was dropped are removed.
    pub async fn broadcast(&self, message: HubMessage) {
        tracing::debug!(message_type = %message.message_type(), "Broadcasting message");

        let closed: Vec<Uuid> = {
            let subscribers = self.subscribers.read().await;
            subscribers
                .values()
                .filter(|sub| sub.tx.send(message.clone()).is_err())
                .map(|sub| sub.id)
                .collect()
        };

        for id in closed {
            tracing::debug!(subscriber_id = %id, "Subscriber channel closed");
            self.unregister(&id).await;
        }
    }

    /// Get subscriber count
    pub fn subscriber_count(&self) -> u64 {
        self.subscriber_count.load(Ordering::Relaxed)
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}
