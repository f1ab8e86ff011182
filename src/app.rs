use chrono::Utc;
use std::path::Path;
use std::sync::Arc;

use geonote_core::{AppError, Config, Reminder, ReminderTrigger, StorageError};
use geonote_geo::{
    GeoAlertStyle, GeoMonitor, ManualLocationProvider, Position, StartOutcome, StaticPermission,
    WatchOptions,
};
use geonote_notify::{
    KeyValueStore, LocalScheduler, NotificationReconciler, ReconcileReport, SqliteKvStore,
};

/// What happened during [`App::start`]
#[derive(Debug)]
pub struct Startup {
    pub reconcile: ReconcileReport,
    /// Timed reminders newly handed to the scheduler
    pub scheduled: usize,
    pub geo: StartOutcome,
}

/// Composition root: owns the scheduler, reconciler and geo monitor.
pub struct App {
    config: Arc<Config>,
    scheduler: Arc<LocalScheduler>,
    reconciler: Arc<NotificationReconciler>,
    provider: Arc<ManualLocationProvider>,
    monitor: GeoMonitor,
}

impl App {
    /// Open storage and wire the components together. Nothing runs yet.
    pub async fn create(config: Config) -> Result<Self, AppError> {
        std::fs::create_dir_all(&config.storage.data_dir)?;

        let database = config.storage.database_path();
        let store: Arc<dyn KeyValueStore> =
            Arc::new(SqliteKvStore::open(&database).map_err(|e| {
                StorageError::read(format!("{}: {}", database.display(), e))
            })?);

        let scheduler = Arc::new(
            LocalScheduler::with_store(config.notifications.channel_id.clone(), store.clone())
                .await,
        );
        let reconciler = Arc::new(NotificationReconciler::new(
            scheduler.clone(),
            store,
            &config.notifications,
        ));

        let provider = Arc::new(ManualLocationProvider::new());
        let permissions = Arc::new(StaticPermission::new(true));
        let monitor = GeoMonitor::new(provider.clone(), permissions, scheduler.clone())
            .with_options(WatchOptions::from(&config.geo))
            .with_style(GeoAlertStyle::from(&config.notifications));

        Ok(Self {
            config: Arc::new(config),
            scheduler,
            reconciler,
            provider,
            monitor,
        })
    }

    /// Reconcile, schedule upcoming timed reminders and start geo monitoring.
    pub async fn start(&self) -> Result<Startup, AppError> {
        tracing::info!("Starting GeoNote");
        let reconcile = self.reconciler.reconcile_on_startup().await;

        let reminders = load_reminders(&self.config.storage.reminders_path())?;
        let now = Utc::now();
        let mut scheduled = 0;
        let mut geo_reminders = Vec::new();

        for reminder in reminders {
            match &reminder.trigger {
                ReminderTrigger::Timed { fire_at } => {
                    if *fire_at <= now {
                        tracing::debug!("Skipping past reminder {}", reminder.id);
                        continue;
                    }
                    if self.reconciler.handle_for(&reminder.id).is_some() {
                        tracing::debug!("Reminder {} is already scheduled", reminder.id);
                        continue;
                    }
                    if self
                        .reconciler
                        .schedule(&reminder.id, &reminder.content, *fire_at)
                        .await
                        .is_some()
                    {
                        scheduled += 1;
                    }
                }
                ReminderTrigger::Geo(_) => geo_reminders.push(reminder),
            }
        }

        let geo = self.monitor.start(geo_reminders).await;
        tracing::info!(
            "GeoNote started: {} reminders scheduled, geo monitoring {:?}",
            scheduled,
            geo
        );

        Ok(Startup {
            reconcile,
            scheduled,
            geo,
        })
    }

    /// Feed a position fix to the geo monitor.
    pub fn push_position(&self, position: Position) -> usize {
        self.provider.push(position)
    }

    /// Report a press on the notification for `reminder_id`.
    pub fn press(&self, reminder_id: &str) {
        self.scheduler.press(reminder_id);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop geo monitoring and the notification listener.
    pub async fn dispose(&self) {
        tracing::info!("Shutting down GeoNote");
        self.monitor.stop().await;
        self.reconciler.shutdown().await;
    }
}

/// Read the reminder list. A missing file means no reminders.
fn load_reminders(path: &Path) -> Result<Vec<Reminder>, AppError> {
    if !path.exists() {
        tracing::info!("No reminders file at {}", path.display());
        return Ok(Vec::new());
    }

    let contents = std::fs::read_to_string(path)?;
    let reminders: Vec<Reminder> = serde_json::from_str(&contents).map_err(|e| {
        StorageError::Corruption(format!("{}: {}", path.display(), e))
    })?;

    tracing::info!("Loaded {} reminders from {}", reminders.len(), path.display());
    Ok(reminders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use geonote_core::Zone;
    use geonote_notify::NotificationScheduler;
    use std::time::Duration;

    fn test_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.config_dir = dir.join("config");
        config.storage.data_dir = dir.join("data");
        config.geo.min_distance_meters = 0.0;
        config
    }

    fn write_reminders(config: &Config, reminders: &[Reminder]) {
        std::fs::create_dir_all(&config.storage.data_dir).unwrap();
        std::fs::write(
            config.storage.reminders_path(),
            serde_json::to_string(reminders).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn start_without_reminders_file() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::create(test_config(dir.path())).await.unwrap();

        let startup = app.start().await.unwrap();
        assert_eq!(startup.scheduled, 0);
        assert_eq!(startup.geo, StartOutcome::Started);
        assert_eq!(startup.reconcile, ReconcileReport::default());

        app.dispose().await;
    }

    #[tokio::test]
    async fn schedules_future_reminders_once_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let now = Utc::now();
        write_reminders(
            &config,
            &[
                Reminder::timed("soon", "Dentist", now + ChronoDuration::hours(1)),
                Reminder::timed("past", "Old", now - ChronoDuration::hours(1)),
            ],
        );

        {
            let app = App::create(config.clone()).await.unwrap();
            let startup = app.start().await.unwrap();
            assert_eq!(startup.scheduled, 1);
            assert!(app.reconciler.handle_for("soon").is_some());
            assert!(app.reconciler.handle_for("past").is_none());
            app.dispose().await;
        }

        let app = App::create(config).await.unwrap();
        let startup = app.start().await.unwrap();
        assert_eq!(startup.reconcile.retained, vec!["soon".to_string()]);
        assert_eq!(startup.scheduled, 0);
        assert_eq!(app.scheduler.list_pending().await.unwrap().len(), 1);
        app.dispose().await;
    }

    #[tokio::test]
    async fn entering_a_zone_raises_a_geo_alert() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        write_reminders(
            &config,
            &[Reminder::geo("g1", "", Zone::new(52.37, 4.89, 100.0))],
        );

        let app = App::create(config).await.unwrap();
        let mut events = app.scheduler.subscribe();
        app.start().await.unwrap();

        assert_eq!(app.push_position(Position::new(52.37, 4.89)), 1);
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.reminder_id.as_deref(), Some("g1"));

        let delivered = app.scheduler.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].title, "Geo Reminder");
        assert_eq!(delivered[0].body, "You entered geo zone");

        app.dispose().await;
    }

    #[tokio::test]
    async fn malformed_reminders_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::create_dir_all(&config.storage.data_dir).unwrap();
        std::fs::write(config.storage.reminders_path(), "[{").unwrap();

        let app = App::create(config).await.unwrap();
        let err = app.start().await.unwrap_err();
        assert!(matches!(err, AppError::Storage(StorageError::Corruption(_))));
        app.dispose().await;
    }
}
