//! In-process notification scheduler.
//!
//! Triggers are tokio timers; "displaying" a notification logs it, records it
//! and broadcasts a `Delivered` event. With a store attached, pending
//! triggers survive a restart. Triggers whose time passed while the process
//! was down come back pending but unarmed, the way a platform scheduler
//! reports alarms it never got to fire.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use geonote_core::{NotificationContent, Notifier, NotifyError};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::scheduler::{
    NotificationEvent, NotificationEventKind, NotificationScheduler, PendingTrigger,
    ScheduleHandle, TriggerSpec,
};
use crate::store::KeyValueStore;

/// Storage key for the pending trigger list
pub const PENDING_KEY: &str = "local_scheduler.pending";

const EVENT_CAPACITY: usize = 64;

struct Armed {
    trigger: PendingTrigger,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    channel_id: String,
    pending: Mutex<HashMap<ScheduleHandle, Armed>>,
    delivered: Mutex<Vec<NotificationContent>>,
    events: broadcast::Sender<NotificationEvent>,
    store: Option<Arc<dyn KeyValueStore>>,
    persist_lock: tokio::sync::Mutex<()>,
}

pub struct LocalScheduler {
    inner: Arc<Inner>,
}

impl LocalScheduler {
    /// Scheduler without persistence.
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self::build(channel_id.into(), None)
    }

    /// Scheduler that keeps its pending triggers in `store`.
    ///
    /// Previously persisted triggers are restored; future ones are re-armed.
    pub async fn with_store(channel_id: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        let scheduler = Self::build(channel_id.into(), Some(store.clone()));

        let restored = match store.get(PENDING_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<PendingTrigger>>(&raw) {
                Ok(triggers) => triggers,
                Err(e) => {
                    tracing::warn!("Stored pending triggers are corrupt, dropping them: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read pending triggers: {}", e);
                Vec::new()
            }
        };

        let now = Utc::now();
        for trigger in restored {
            // Timer tasks look the trigger up under this lock, so arm while holding it.
            let mut pending = scheduler.inner.pending.lock();
            let timer = (trigger.fire_at > now).then(|| scheduler.inner.arm(&trigger));
            tracing::debug!(
                "Restored trigger {} for {} (armed: {})",
                trigger.handle,
                trigger.fire_at.to_rfc3339(),
                timer.is_some()
            );
            pending.insert(trigger.handle.clone(), Armed { trigger, timer });
        }

        scheduler
    }

    fn build(channel_id: String, store: Option<Arc<dyn KeyValueStore>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                channel_id,
                pending: Mutex::new(HashMap::new()),
                delivered: Mutex::new(Vec::new()),
                events,
                store,
                persist_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Everything displayed so far, oldest first.
    pub fn delivered(&self) -> Vec<NotificationContent> {
        self.inner.delivered.lock().clone()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Report that the user pressed the notification for `reminder_id`.
    pub fn press(&self, reminder_id: impl Into<String>) {
        let _ = self.inner.events.send(NotificationEvent {
            kind: NotificationEventKind::Pressed,
            reminder_id: Some(reminder_id.into()),
            handle: None,
        });
    }
}

impl Drop for LocalScheduler {
    fn drop(&mut self) {
        for armed in self.inner.pending.lock().values_mut() {
            if let Some(timer) = armed.timer.take() {
                timer.abort();
            }
        }
    }
}

impl Inner {
    fn arm(self: &Arc<Self>, trigger: &PendingTrigger) -> JoinHandle<()> {
        let delay = (trigger.fire_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let handle = trigger.handle.clone();
        let inner = Arc::clone(self);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire(&handle).await;
        })
    }

    async fn fire(&self, handle: &ScheduleHandle) {
        let armed = self.pending.lock().remove(handle);
        let Some(armed) = armed else {
            return;
        };

        self.deliver(armed.trigger.content, Some(armed.trigger.handle));
        self.persist().await;
    }

    fn deliver(&self, content: NotificationContent, handle: Option<ScheduleHandle>) {
        tracing::info!(
            "[{}] {}: {}",
            self.channel_id,
            content.title,
            content.body
        );

        let event = NotificationEvent {
            kind: NotificationEventKind::Delivered,
            reminder_id: content.reminder_id.clone(),
            handle,
        };
        self.delivered.lock().push(content);
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let _guard = self.persist_lock.lock().await;

        let triggers: Vec<PendingTrigger> = self
            .pending
            .lock()
            .values()
            .map(|armed| armed.trigger.clone())
            .collect();

        let json = match serde_json::to_string(&triggers) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize pending triggers: {}", e);
                return;
            }
        };

        if let Err(e) = store.set(PENDING_KEY, &json).await {
            tracing::warn!("Failed to persist pending triggers: {}", e);
        }
    }
}

#[async_trait]
impl Notifier for LocalScheduler {
    async fn display_now(&self, content: NotificationContent) -> Result<(), NotifyError> {
        self.inner.deliver(content, None);
        Ok(())
    }
}

#[async_trait]
impl NotificationScheduler for LocalScheduler {
    async fn create_trigger(
        &self,
        content: NotificationContent,
        trigger: TriggerSpec,
    ) -> Result<ScheduleHandle, NotifyError> {
        if trigger.fire_at <= Utc::now() {
            return Err(NotifyError::InvalidTrigger(format!(
                "{} is not in the future",
                trigger.fire_at.to_rfc3339()
            )));
        }

        let pending = PendingTrigger {
            handle: ScheduleHandle::new(Uuid::new_v4().to_string()),
            fire_at: trigger.fire_at,
            content,
        };
        let handle = pending.handle.clone();
        tracing::debug!(
            "Arming trigger {} for {} (allow while idle: {})",
            handle,
            pending.fire_at.to_rfc3339(),
            trigger.allow_while_idle
        );

        {
            let mut armed = self.inner.pending.lock();
            let timer = self.inner.arm(&pending);
            armed.insert(
                handle.clone(),
                Armed {
                    trigger: pending,
                    timer: Some(timer),
                },
            );
        }
        self.inner.persist().await;

        Ok(handle)
    }

    async fn cancel(&self, handle: &ScheduleHandle) -> Result<(), NotifyError> {
        let armed = self.inner.pending.lock().remove(handle);
        let Some(mut armed) = armed else {
            return Err(NotifyError::HandleNotFound(handle.to_string()));
        };

        if let Some(timer) = armed.timer.take() {
            timer.abort();
        }
        self.inner.persist().await;
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<PendingTrigger>, NotifyError> {
        let mut pending: Vec<PendingTrigger> = self
            .inner
            .pending
            .lock()
            .values()
            .map(|armed| armed.trigger.clone())
            .collect();
        pending.sort_by_key(|p| p.fire_at);
        Ok(pending)
    }

    async fn pending_trigger(
        &self,
        handle: &ScheduleHandle,
    ) -> Result<Option<PendingTrigger>, NotifyError> {
        Ok(self
            .inner
            .pending
            .lock()
            .get(handle)
            .map(|armed| armed.trigger.clone()))
    }

    fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.inner.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKvStore;
    use chrono::Duration as ChronoDuration;

    fn content(reminder_id: &str, body: &str) -> NotificationContent {
        NotificationContent::new("Reminder", body).with_reminder(reminder_id)
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_fires_and_reports_delivery() {
        let scheduler = LocalScheduler::new("reminder-channel");
        let mut events = scheduler.subscribe();

        let fire_at = Utc::now() + ChronoDuration::seconds(30);
        let handle = scheduler
            .create_trigger(content("r1", "water plants"), TriggerSpec::at(fire_at))
            .await
            .unwrap();
        assert!(scheduler.pending_trigger(&handle).await.unwrap().is_some());

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, NotificationEventKind::Delivered);
        assert_eq!(event.reminder_id.as_deref(), Some("r1"));
        assert_eq!(event.handle, Some(handle));

        assert_eq!(scheduler.pending_count(), 0);
        let delivered = scheduler.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].body, "water plants");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn triggers_due_almost_immediately_still_fire() {
        let scheduler = LocalScheduler::new("reminder-channel");
        let mut created = 0;
        for i in 0..50 {
            // a trigger that is already due by the time it is checked is refused
            let result = scheduler
                .create_trigger(
                    content(&format!("r{i}"), "now-ish"),
                    TriggerSpec::at(Utc::now() + ChronoDuration::milliseconds(1)),
                )
                .await;
            if result.is_ok() {
                created += 1;
            }
        }

        let drained = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while scheduler.delivered().len() < created {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await;

        assert!(drained.is_ok(), "{} triggers never fired", scheduler.pending_count());
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn past_trigger_is_refused() {
        let scheduler = LocalScheduler::new("reminder-channel");
        let result = scheduler
            .create_trigger(
                content("r1", "late"),
                TriggerSpec::at(Utc::now() - ChronoDuration::seconds(1)),
            )
            .await;

        assert!(matches!(result, Err(NotifyError::InvalidTrigger(_))));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_trigger_never_fires() {
        let scheduler = LocalScheduler::new("reminder-channel");
        let fire_at = Utc::now() + ChronoDuration::seconds(5);
        let handle = scheduler
            .create_trigger(content("r1", "nope"), TriggerSpec::at(fire_at))
            .await
            .unwrap();

        scheduler.cancel(&handle).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;

        assert!(scheduler.delivered().is_empty());
        assert!(matches!(
            scheduler.cancel(&handle).await,
            Err(NotifyError::HandleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn display_now_delivers_immediately() {
        let scheduler = LocalScheduler::new("reminder-channel");
        let mut events = scheduler.subscribe();

        scheduler
            .display_now(content("g1", "You entered geo zone"))
            .await
            .unwrap();

        assert_eq!(scheduler.delivered().len(), 1);
        assert_eq!(events.recv().await.unwrap().reminder_id.as_deref(), Some("g1"));
    }

    #[tokio::test]
    async fn press_emits_pressed_event() {
        let scheduler = LocalScheduler::new("reminder-channel");
        let mut events = scheduler.subscribe();

        scheduler.press("r9");
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, NotificationEventKind::Pressed);
        assert_eq!(event.reminder_id.as_deref(), Some("r9"));
    }

    #[tokio::test]
    async fn list_pending_is_ordered_by_fire_time() {
        let scheduler = LocalScheduler::new("reminder-channel");
        let now = Utc::now();
        scheduler
            .create_trigger(content("later", "b"), TriggerSpec::at(now + ChronoDuration::hours(2)))
            .await
            .unwrap();
        scheduler
            .create_trigger(content("sooner", "a"), TriggerSpec::at(now + ChronoDuration::hours(1)))
            .await
            .unwrap();

        let pending = scheduler.list_pending().await.unwrap();
        let ids: Vec<_> = pending
            .iter()
            .filter_map(|p| p.content.reminder_id.as_deref())
            .collect();
        assert_eq!(ids, vec!["sooner", "later"]);
    }

    #[tokio::test]
    async fn pending_triggers_survive_restart() {
        let store = Arc::new(MemoryKvStore::new());
        let fire_at = Utc::now() + ChronoDuration::hours(1);

        let handle = {
            let scheduler = LocalScheduler::with_store("reminder-channel", store.clone()).await;
            scheduler
                .create_trigger(content("r1", "dentist"), TriggerSpec::at(fire_at))
                .await
                .unwrap()
        };

        let restarted = LocalScheduler::with_store("reminder-channel", store.clone()).await;
        let pending = restarted.pending_trigger(&handle).await.unwrap().unwrap();
        assert_eq!(pending.content.body, "dentist");
        assert_eq!(pending.fire_at, fire_at);
    }

    #[tokio::test]
    async fn overdue_trigger_is_restored_unfired() {
        let store = Arc::new(MemoryKvStore::new());
        let overdue = PendingTrigger {
            handle: ScheduleHandle::new("h1"),
            fire_at: Utc::now() - ChronoDuration::minutes(1),
            content: content("r1", "missed"),
        };
        store.insert(PENDING_KEY, serde_json::to_string(&vec![overdue]).unwrap());

        let scheduler = LocalScheduler::with_store("reminder-channel", store).await;
        tokio::task::yield_now().await;

        assert!(scheduler
            .pending_trigger(&ScheduleHandle::new("h1"))
            .await
            .unwrap()
            .is_some());
        assert!(scheduler.delivered().is_empty());
    }

    #[tokio::test]
    async fn corrupt_pending_list_is_dropped() {
        let store = Arc::new(MemoryKvStore::new());
        store.insert(PENDING_KEY, "{not json");

        let scheduler = LocalScheduler::with_store("reminder-channel", store).await;
        assert_eq!(scheduler.pending_count(), 0);
    }
}
