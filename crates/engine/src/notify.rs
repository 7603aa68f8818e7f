//! Outbound notifications.
//!
//! The engine decides that a notification is owed and to whom; delivery is
//! the dispatcher's business. Delivery failures never fail an operation.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;

use shiftmatch_core::{OrganizationScope, WorkerId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Invited,
    Approved,
    ShiftCancelled,
    WorkerRemoved,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Invited => "invited",
            TemplateKind::Approved => "approved",
            TemplateKind::ShiftCancelled => "shift_cancelled",
            TemplateKind::WorkerRemoved => "worker_removed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Recipient {
    Worker {
        worker_id: WorkerId,
        email: String,
        push_token: Option<String>,
    },
    Organization { scope: OrganizationScope },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub kind: TemplateKind,
    pub payload: JsonValue,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),
}

pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, notification: &Notification) -> Result<(), NotifyError>;
}

impl<N> NotificationDispatcher for Arc<N>
where
    N: NotificationDispatcher + ?Sized,
{
    fn dispatch(&self, notification: &Notification) -> Result<(), NotifyError> {
        (**self).dispatch(notification)
    }
}

/// Keeps every notification in memory (tests, demo).
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn of_kind(&self, kind: TemplateKind) -> Vec<Notification> {
        self.sent().into_iter().filter(|n| n.kind == kind).collect()
    }
}

impl NotificationDispatcher for RecordingNotifier {
    fn dispatch(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Transport("recording notifier poisoned".to_string()))?
            .push(notification.clone());
        Ok(())
    }
}

/// Logs notifications instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationDispatcher for TracingNotifier {
    fn dispatch(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            kind = notification.kind.as_str(),
            recipient = ?notification.recipient,
            payload = %notification.payload,
            "notification"
        );
        Ok(())
    }
}
