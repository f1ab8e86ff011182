use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// Content of a local notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    /// Reminder id carried back in delivery/press events
    pub reminder_id: Option<String>,
}

impl NotificationContent {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            reminder_id: None,
        }
    }

    pub fn with_reminder(mut self, reminder_id: impl Into<String>) -> Self {
        self.reminder_id = Some(reminder_id.into());
        self
    }
}

/// Anything that can put a notification in front of the user right now.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Display a notification immediately.
    async fn display_now(&self, content: NotificationContent) -> Result<(), NotifyError>;
}
