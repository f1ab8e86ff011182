//! Location and permission seams, plus a manually fed provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::distance::haversine_distance;
use crate::types::{LocationError, Position, WatchId, WatchOptions};

/// One update from a location subscription
pub type LocationUpdate = Result<Position, LocationError>;

/// An active location subscription.
///
/// Updates arrive in provider order. Dropping the receiver ends the
/// subscription from the consumer side; `LocationProvider::clear_watch`
/// releases it on the provider side.
#[derive(Debug)]
pub struct LocationSubscription {
    pub id: WatchId,
    pub updates: mpsc::UnboundedReceiver<LocationUpdate>,
}

/// Source of device positions.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Begin watching the device position.
    ///
    /// # Errors
    /// Returns `LocationError` if the provider cannot start a subscription.
    async fn watch(&self, options: WatchOptions) -> Result<LocationSubscription, LocationError>;

    /// Release a subscription. Unknown ids are ignored.
    fn clear_watch(&self, id: WatchId);
}

/// Answers whether the app may read the device location.
///
/// Only checks; asking the user is someone else's job.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn has_location_permission(&self) -> bool;
}

/// Permission gate with a fixed, switchable answer.
#[derive(Debug)]
pub struct StaticPermission {
    granted: AtomicBool,
}

impl StaticPermission {
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
        }
    }

    pub fn set(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }
}

#[async_trait]
impl PermissionGate for StaticPermission {
    async fn has_location_permission(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct Watcher {
    tx: mpsc::UnboundedSender<LocationUpdate>,
    options: WatchOptions,
    last_delivered: Option<Position>,
}

/// Location provider fed by hand.
///
/// Every pushed fix fans out to all live subscriptions, honouring each
/// subscription's minimum distance filter.
#[derive(Debug)]
pub struct ManualLocationProvider {
    next_id: AtomicU64,
    available: AtomicBool,
    watchers: Mutex<HashMap<WatchId, Watcher>>,
}

impl Default for ManualLocationProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualLocationProvider {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            available: AtomicBool::new(true),
            watchers: Mutex::new(HashMap::new()),
        }
    }

    /// When unavailable, new `watch` calls fail with `ServiceUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Deliver a fix to every subscription. Returns how many received it.
    pub fn push(&self, position: Position) -> usize {
        let mut watchers = self.watchers.lock();
        watchers.retain(|_, w| !w.tx.is_closed());

        let mut delivered = 0;
        for watcher in watchers.values_mut() {
            if let Some(last) = watcher.last_delivered {
                let moved = haversine_distance(
                    last.latitude,
                    last.longitude,
                    position.latitude,
                    position.longitude,
                );
                if moved < watcher.options.min_distance_meters {
                    continue;
                }
            }

            if watcher.tx.send(Ok(position)).is_ok() {
                watcher.last_delivered = Some(position);
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver a provider error to every subscription.
    pub fn push_error(&self, error: LocationError) -> usize {
        let watchers = self.watchers.lock();
        watchers
            .values()
            .filter(|w| w.tx.send(Err(error.clone())).is_ok())
            .count()
    }

    /// Number of subscriptions that are still being listened to.
    pub fn active_watches(&self) -> usize {
        self.watchers
            .lock()
            .values()
            .filter(|w| !w.tx.is_closed())
            .count()
    }

    /// Total number of subscriptions ever handed out.
    pub fn watches_started(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst) - 1
    }
}

#[async_trait]
impl LocationProvider for ManualLocationProvider {
    async fn watch(&self, options: WatchOptions) -> Result<LocationSubscription, LocationError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(LocationError::ServiceUnavailable);
        }

        let id = WatchId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, updates) = mpsc::unbounded_channel();
        self.watchers.lock().insert(
            id,
            Watcher {
                tx,
                options,
                last_delivered: None,
            },
        );

        tracing::debug!("Location watch {:?} started", id);
        Ok(LocationSubscription { id, updates })
    }

    fn clear_watch(&self, id: WatchId) {
        if self.watchers.lock().remove(&id).is_some() {
            tracing::debug!("Location watch {:?} cleared", id);
        }
    }
}
