//! Background geofence watch.
//!
//! `GeoMonitor` owns at most one location subscription. Each fix is run
//! through a [`ZoneTracker`] to completion before the next is read, and every
//! zone entry produces one notification through the injected [`Notifier`].

use std::sync::Arc;

use geonote_core::{NotificationContent, NotificationsConfig, Notifier, Reminder};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::location::{LocationProvider, LocationSubscription, PermissionGate};
use crate::tracker::ZoneTracker;
use crate::types::{LocationError, WatchId, WatchOptions};

/// What happened when `start` was called
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A watch was already active; nothing changed
    AlreadyRunning,
    PermissionDenied,
    /// The provider could not start a subscription
    Unavailable,
    /// `stop` was called while the subscription was being set up
    Cancelled,
}

impl StartOutcome {
    /// True when a watch is active after the call.
    pub fn is_running(self) -> bool {
        matches!(self, StartOutcome::Started | StartOutcome::AlreadyRunning)
    }
}

/// Wording for zone-entry notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoAlertStyle {
    pub title: String,
    /// Used when the reminder has no text
    pub fallback_body: String,
}

impl Default for GeoAlertStyle {
    fn default() -> Self {
        Self::from(&NotificationsConfig::default())
    }
}

impl From<&NotificationsConfig> for GeoAlertStyle {
    fn from(config: &NotificationsConfig) -> Self {
        Self {
            title: config.geo_title.clone(),
            fallback_body: config.geo_fallback_body.clone(),
        }
    }
}

impl GeoAlertStyle {
    pub fn content_for(&self, reminder: &Reminder) -> NotificationContent {
        let body = if reminder.content.trim().is_empty() {
            self.fallback_body.as_str()
        } else {
            reminder.content.as_str()
        };
        NotificationContent::new(&self.title, body).with_reminder(&reminder.id)
    }
}

struct ActiveWatch {
    id: WatchId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
enum WatchState {
    #[default]
    Idle,
    /// Permission checked, waiting on the provider
    Starting,
    Running(ActiveWatch),
}

/// Watches the device position and raises one alert per zone entry.
pub struct GeoMonitor {
    provider: Arc<dyn LocationProvider>,
    permissions: Arc<dyn PermissionGate>,
    notifier: Arc<dyn Notifier>,
    options: WatchOptions,
    style: GeoAlertStyle,
    state: Mutex<WatchState>,
}

impl GeoMonitor {
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        permissions: Arc<dyn PermissionGate>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            provider,
            permissions,
            notifier,
            options: WatchOptions::default(),
            style: GeoAlertStyle::default(),
            state: Mutex::new(WatchState::Idle),
        }
    }

    pub fn with_options(mut self, options: WatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_style(mut self, style: GeoAlertStyle) -> Self {
        self.style = style;
        self
    }

    pub fn is_running(&self) -> bool {
        let mut state = self.state.lock();
        self.reap_finished(&mut state);
        matches!(*state, WatchState::Running(_))
    }

    /// A watch task that ended on its own (provider closed the stream) no
    /// longer counts as running.
    fn reap_finished(&self, state: &mut WatchState) {
        let finished = matches!(state, WatchState::Running(active) if active.task.is_finished());
        if !finished {
            return;
        }
        if let WatchState::Running(active) = std::mem::take(state) {
            self.provider.clear_watch(active.id);
            tracing::info!("Geo watch {:?} ended, monitor is idle", active.id);
        }
    }

    /// Start watching with the given reminders.
    ///
    /// A second call while a watch is active is a no-op; call [`stop`](Self::stop)
    /// first to swap the reminder list. Never fails: problems are reported
    /// through the returned outcome and the log.
    pub async fn start(&self, reminders: Vec<Reminder>) -> StartOutcome {
        if !self.permissions.has_location_permission().await {
            tracing::warn!("Location permission denied, geo reminders disabled");
            return StartOutcome::PermissionDenied;
        }

        {
            let mut state = self.state.lock();
            self.reap_finished(&mut state);
            if !matches!(*state, WatchState::Idle) {
                tracing::info!("Geo monitoring already running");
                return StartOutcome::AlreadyRunning;
            }
            *state = WatchState::Starting;
        }

        let subscription = match self.provider.watch(self.options).await {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!("Failed to start location watch: {}", e);
                let mut state = self.state.lock();
                if matches!(*state, WatchState::Starting) {
                    *state = WatchState::Idle;
                }
                return match e {
                    LocationError::PermissionDenied => StartOutcome::PermissionDenied,
                    _ => StartOutcome::Unavailable,
                };
            }
        };

        let geo_reminders: Vec<Reminder> = reminders
            .into_iter()
            .filter(|r| r.zone().is_some())
            .collect();

        let mut state = self.state.lock();
        if !matches!(*state, WatchState::Starting) {
            self.provider.clear_watch(subscription.id);
            tracing::info!("Geo monitoring stopped before the watch came up");
            return StartOutcome::Cancelled;
        }

        let id = subscription.id;
        let cancel = CancellationToken::new();
        tracing::info!(
            "Geo monitoring started with watch {:?} for {} reminders",
            id,
            geo_reminders.len()
        );

        let task = tokio::spawn(run_watch(
            subscription,
            geo_reminders,
            self.notifier.clone(),
            self.style.clone(),
            cancel.clone(),
        ));
        *state = WatchState::Running(ActiveWatch { id, cancel, task });

        StartOutcome::Started
    }

    /// Stop watching and forget zone occupancy. Safe to call when idle.
    ///
    /// An update already being handled finishes first; nothing is alerted
    /// after this returns.
    pub async fn stop(&self) {
        let active = match std::mem::take(&mut *self.state.lock()) {
            WatchState::Running(active) => active,
            WatchState::Starting | WatchState::Idle => return,
        };

        active.cancel.cancel();
        if let Err(e) = active.task.await {
            tracing::error!("Geo watch task ended abnormally: {}", e);
        }
        self.provider.clear_watch(active.id);
        tracing::info!("Geo monitoring stopped");
    }

    /// Replace the reminder list: stop, then start again.
    pub async fn restart(&self, reminders: Vec<Reminder>) -> StartOutcome {
        self.stop().await;
        self.start(reminders).await
    }
}

impl Drop for GeoMonitor {
    fn drop(&mut self) {
        if let WatchState::Running(active) = std::mem::take(self.state.get_mut()) {
            active.cancel.cancel();
            self.provider.clear_watch(active.id);
        }
    }
}

async fn run_watch(
    mut subscription: LocationSubscription,
    reminders: Vec<Reminder>,
    notifier: Arc<dyn Notifier>,
    style: GeoAlertStyle,
    cancel: CancellationToken,
) {
    let mut tracker = ZoneTracker::new();

    loop {
        let update = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            update = subscription.updates.recv() => update,
        };

        match update {
            Some(Ok(position)) => {
                tracing::debug!(
                    "Current position: {}, {}",
                    position.latitude,
                    position.longitude
                );

                for reminder in tracker.observe(&position, &reminders) {
                    tracing::info!("Triggering geo notification for reminder {}", reminder.id);
                    if let Err(e) = notifier.display_now(style.content_for(reminder)).await {
                        tracing::warn!(
                            "Failed to show geo notification for reminder {}: {}",
                            reminder.id,
                            e
                        );
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!("Geo monitoring error: {}", e);
            }
            None => {
                tracing::info!("Location stream closed by provider");
                break;
            }
        }
    }
}
