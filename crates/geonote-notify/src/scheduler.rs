//! Platform notification scheduler seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geonote_core::{NotificationContent, Notifier, NotifyError};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Opaque identifier the scheduler issues for one pending trigger
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleHandle(pub String);

impl ScheduleHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScheduleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// When a scheduled notification fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSpec {
    pub fire_at: DateTime<Utc>,
    /// Fire even while the device sleeps
    pub allow_while_idle: bool,
}

impl TriggerSpec {
    /// Wake-capable one-shot trigger at an absolute time.
    pub fn at(fire_at: DateTime<Utc>) -> Self {
        Self {
            fire_at,
            allow_while_idle: true,
        }
    }
}

/// A trigger the scheduler still considers pending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTrigger {
    pub handle: ScheduleHandle,
    pub fire_at: DateTime<Utc>,
    pub content: NotificationContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationEventKind {
    Delivered,
    Pressed,
}

/// Delivery or press reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub kind: NotificationEventKind,
    pub reminder_id: Option<String>,
    /// Trigger that produced the notification; `None` for immediate ones
    pub handle: Option<ScheduleHandle>,
}

/// Platform-side scheduling of local notifications.
#[async_trait]
pub trait NotificationScheduler: Notifier {
    /// Schedule a one-shot notification.
    ///
    /// # Errors
    /// Returns `NotifyError` if the platform refuses the trigger.
    async fn create_trigger(
        &self,
        content: NotificationContent,
        trigger: TriggerSpec,
    ) -> Result<ScheduleHandle, NotifyError>;

    /// Cancel a pending trigger.
    ///
    /// # Errors
    /// Returns `NotifyError::HandleNotFound` if nothing is pending under `handle`.
    async fn cancel(&self, handle: &ScheduleHandle) -> Result<(), NotifyError>;

    /// All triggers that have not fired yet.
    ///
    /// # Errors
    /// Returns `NotifyError` if the platform cannot be queried.
    async fn list_pending(&self) -> Result<Vec<PendingTrigger>, NotifyError>;

    /// Look up a single pending trigger.
    ///
    /// # Errors
    /// Returns `NotifyError` if the platform cannot be queried.
    async fn pending_trigger(
        &self,
        handle: &ScheduleHandle,
    ) -> Result<Option<PendingTrigger>, NotifyError> {
        Ok(self
            .list_pending()
            .await?
            .into_iter()
            .find(|pending| &pending.handle == handle))
    }

    /// Subscribe to delivery and press events.
    fn subscribe(&self) -> broadcast::Receiver<NotificationEvent>;
}
