//! Scheduled reminder notifications for GeoNote
//!
//! Keeps the durable reminder-id to trigger-handle registry, schedules and
//! cancels one-shot alerts, and replays alerts missed while the process was
//! not running.

pub mod highlight;
pub mod local;
pub mod reconciler;
pub mod registry;
pub mod scheduler;
pub mod store;

pub use highlight::HighlightSignal;
pub use local::LocalScheduler;
pub use reconciler::{NotificationReconciler, ReconcileReport};
pub use registry::{ScheduleRegistry, REGISTRY_KEY};
pub use scheduler::{
    NotificationEvent, NotificationEventKind, NotificationScheduler, PendingTrigger,
    ScheduleHandle, TriggerSpec,
};
pub use store::{KeyValueStore, MemoryKvStore, SqliteKvStore};
