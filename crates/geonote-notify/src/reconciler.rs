//! Notification reconciler.
//!
//! Owns the reminder id to trigger handle registry. The registry is loaded
//! once by [`NotificationReconciler::reconcile_on_startup`], which also
//! surfaces alerts that should have fired while the process was down, and is
//! written back to the [`KeyValueStore`] after every change. Storage and
//! scheduler failures are logged and absorbed.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use geonote_core::{NotificationContent, NotificationsConfig, NotifyError};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::highlight::HighlightSignal;
use crate::registry::{ScheduleRegistry, REGISTRY_KEY};
use crate::scheduler::{
    NotificationEvent, NotificationEventKind, NotificationScheduler, ScheduleHandle, TriggerSpec,
};
use crate::store::KeyValueStore;

/// What startup reconciliation found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Reminders whose trigger time passed; a missed alert was raised
    pub missed: Vec<String>,
    /// Reminders the scheduler no longer knows about
    pub pruned: Vec<String>,
    /// Reminders still pending in the future
    pub retained: Vec<String>,
    /// Reminders whose lookup failed; left untouched
    pub failed: Vec<String>,
    /// The stored registry was unreadable and was reset to empty
    pub registry_reset: bool,
}

struct Listener {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct NotificationReconciler {
    scheduler: Arc<dyn NotificationScheduler>,
    store: Arc<dyn KeyValueStore>,
    registry: Mutex<ScheduleRegistry>,
    /// Serializes writes so the last write carries the latest snapshot
    persist_lock: tokio::sync::Mutex<()>,
    highlight: HighlightSignal,
    reminder_title: String,
    missed_title: String,
    listener: Mutex<Option<Listener>>,
}

impl NotificationReconciler {
    pub fn new(
        scheduler: Arc<dyn NotificationScheduler>,
        store: Arc<dyn KeyValueStore>,
        config: &NotificationsConfig,
    ) -> Self {
        Self {
            scheduler,
            store,
            registry: Mutex::new(ScheduleRegistry::new()),
            persist_lock: tokio::sync::Mutex::new(()),
            highlight: HighlightSignal::new(config.highlight_window()),
            reminder_title: config.reminder_title.clone(),
            missed_title: config.missed_title.clone(),
            listener: Mutex::new(None),
        }
    }

    pub fn highlight(&self) -> &HighlightSignal {
        &self.highlight
    }

    pub fn handle_for(&self, reminder_id: &str) -> Option<ScheduleHandle> {
        self.registry.lock().get(reminder_id).cloned()
    }

    pub fn registry_snapshot(&self) -> ScheduleRegistry {
        self.registry.lock().clone()
    }

    /// Schedule a one-shot alert for `reminder_id` at `fire_at`.
    ///
    /// Past or present times are refused. On success the new handle replaces
    /// any previous one for the reminder (cancel the old one first) and the
    /// registry is persisted. Returns `None` when nothing was scheduled.
    pub async fn schedule(
        &self,
        reminder_id: &str,
        message: &str,
        fire_at: DateTime<Utc>,
    ) -> Option<ScheduleHandle> {
        if fire_at <= Utc::now() {
            tracing::warn!(
                "Refusing to schedule reminder {} at {}: not in the future",
                reminder_id,
                fire_at.to_rfc3339()
            );
            return None;
        }

        tracing::info!(
            "Scheduling notification id={} at {}",
            reminder_id,
            fire_at.to_rfc3339()
        );

        let content =
            NotificationContent::new(&self.reminder_title, message).with_reminder(reminder_id);
        let handle = match self
            .scheduler
            .create_trigger(content, TriggerSpec::at(fire_at))
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Failed to schedule reminder {}: {}", reminder_id, e);
                return None;
            }
        };

        let replaced = self.registry.lock().insert(reminder_id, handle.clone());
        if let Some(old) = replaced {
            tracing::debug!("Reminder {} handle {} replaced by {}", reminder_id, old, handle);
        }

        self.persist().await;
        Some(handle)
    }

    /// Cancel the scheduled alert for `reminder_id`.
    ///
    /// Returns `true` if an entry was removed. A reminder with nothing
    /// scheduled is not an error.
    pub async fn cancel(&self, reminder_id: &str) -> bool {
        let Some(handle) = self.handle_for(reminder_id) else {
            tracing::info!("No scheduled notification for reminder {}", reminder_id);
            return false;
        };

        tracing::info!("Canceling notification id={} handle={}", reminder_id, handle);
        match self.scheduler.cancel(&handle).await {
            Ok(()) => {}
            Err(NotifyError::HandleNotFound(_)) => {
                tracing::debug!("Handle {} was no longer pending", handle);
            }
            Err(e) => {
                tracing::warn!("Failed to cancel reminder {}: {}", reminder_id, e);
                return false;
            }
        }

        let removed = self.registry.lock().remove_if(reminder_id, &handle);
        if removed {
            self.persist().await;
        }
        removed
    }

    /// Reconcile the persisted registry against the scheduler.
    ///
    /// Run once at startup, before anything calls `schedule` or `cancel`.
    /// Installs the delivery listener when done.
    pub async fn reconcile_on_startup(self: &Arc<Self>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let stored = self.load_registry(&mut report).await;

        let now = Utc::now();
        let mut finished = Vec::new();

        for (reminder_id, handle) in stored.iter() {
            match self.scheduler.pending_trigger(handle).await {
                Ok(None) => {
                    // Fired normally or cancelled elsewhere; no way to tell which.
                    tracing::debug!(
                        "Reminder {} handle {} is no longer pending",
                        reminder_id,
                        handle
                    );
                    report.pruned.push(reminder_id.to_string());
                    finished.push((reminder_id.to_string(), handle.clone()));
                }
                Ok(Some(pending)) if pending.fire_at <= now => {
                    tracing::info!(
                        "Reminder {} was due at {} while not running",
                        reminder_id,
                        pending.fire_at.to_rfc3339()
                    );
                    let content = NotificationContent::new(&self.missed_title, pending.content.body)
                        .with_reminder(reminder_id);
                    if let Err(e) = self.scheduler.display_now(content).await {
                        tracing::warn!("Failed to show missed reminder {}: {}", reminder_id, e);
                    }
                    if let Err(e) = self.scheduler.cancel(handle).await {
                        tracing::debug!("Could not cancel stale trigger {}: {}", handle, e);
                    }
                    report.missed.push(reminder_id.to_string());
                    finished.push((reminder_id.to_string(), handle.clone()));
                }
                Ok(Some(_)) => {
                    report.retained.push(reminder_id.to_string());
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to query trigger for reminder {}: {}",
                        reminder_id,
                        e
                    );
                    report.failed.push(reminder_id.to_string());
                }
            }
        }

        {
            let mut registry = self.registry.lock();
            registry.absorb_missing(stored);
            for (reminder_id, handle) in &finished {
                registry.remove_if(reminder_id, handle);
            }
        }

        if !finished.is_empty() || report.registry_reset {
            self.persist().await;
        }

        tracing::info!(
            "Reconciled notifications: {} missed, {} pruned, {} pending, {} failed",
            report.missed.len(),
            report.pruned.len(),
            report.retained.len(),
            report.failed.len()
        );

        self.install_listener();
        report
    }

    /// Stop listening for delivery events.
    pub async fn shutdown(&self) {
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            listener.cancel.cancel();
            if let Err(e) = listener.task.await {
                tracing::error!("Notification listener ended abnormally: {}", e);
            }
        }
    }

    async fn load_registry(&self, report: &mut ReconcileReport) -> ScheduleRegistry {
        match self.store.get(REGISTRY_KEY).await {
            Ok(None) => ScheduleRegistry::new(),
            Ok(Some(raw)) => match ScheduleRegistry::from_json(&raw) {
                Ok(registry) => registry,
                Err(e) => {
                    tracing::warn!("Stored schedule registry is corrupt, starting empty: {}", e);
                    report.registry_reset = true;
                    ScheduleRegistry::new()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read schedule registry: {}", e);
                ScheduleRegistry::new()
            }
        }
    }

    /// Write the registry to durable storage. Returns `false` on failure.
    async fn persist(&self) -> bool {
        let _guard = self.persist_lock.lock().await;

        let snapshot = self.registry_snapshot();
        let json = match snapshot.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize schedule registry: {}", e);
                return false;
            }
        };

        match self.store.set(REGISTRY_KEY, &json).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to persist schedule registry, keeping it in memory: {}", e);
                false
            }
        }
    }

    fn install_listener(self: &Arc<Self>) {
        let mut slot = self.listener.lock();
        if slot.is_some() {
            return;
        }

        let mut events = self.scheduler.subscribe();
        let this = Arc::downgrade(self);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => event,
                };

                match event {
                    Ok(event) => {
                        if !Self::dispatch(&this, event).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Dropped {} notification events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        *slot = Some(Listener { cancel, task });
        tracing::debug!("Notification listener installed");
    }

    /// Returns `false` once the reconciler is gone.
    async fn dispatch(this: &Weak<Self>, event: NotificationEvent) -> bool {
        let Some(this) = this.upgrade() else {
            return false;
        };
        this.on_event(event).await;
        true
    }

    async fn on_event(&self, event: NotificationEvent) {
        let Some(reminder_id) = event.reminder_id else {
            return;
        };

        tracing::debug!("Notification {:?} for reminder {}", event.kind, reminder_id);
        self.highlight.flash(reminder_id.clone());

        // Only the trigger the entry currently points at retires it.
        if event.kind == NotificationEventKind::Delivered {
            let Some(handle) = event.handle else {
                return;
            };
            let removed = self.registry.lock().remove_if(&reminder_id, &handle);
            if removed {
                self.persist().await;
            }
        }
    }
}

impl Drop for NotificationReconciler {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.cancel.cancel();
        }
    }
}
