//! Transient "this reminder just notified" signal for the view layer.
//!
//! One slot, last write wins. Each flash clears itself after the window
//! unless a newer flash replaced it in the meantime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct HighlightSignal {
    tx: Arc<watch::Sender<Option<String>>>,
    generation: Arc<AtomicU64>,
    window: Duration,
}

impl Default for HighlightSignal {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

impl HighlightSignal {
    pub fn new(window: Duration) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            generation: Arc::new(AtomicU64::new(0)),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Currently highlighted reminder, if any.
    pub fn current(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }

    /// Highlight `reminder_id` for the configured window.
    ///
    /// Must be called from within a tokio runtime.
    pub fn flash(&self, reminder_id: impl Into<String>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.tx.send_replace(Some(reminder_id.into()));

        let tx = self.tx.clone();
        let latest = self.generation.clone();
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            tx.send_if_modified(|current| {
                if latest.load(Ordering::SeqCst) != generation || current.is_none() {
                    return false;
                }
                *current = None;
                true
            });
        });
    }

    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.tx.send_replace(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn settle(duration: Duration) {
        tokio::time::sleep(duration).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn flash_clears_after_window() {
        let signal = HighlightSignal::new(Duration::from_secs(3));
        signal.flash("r1");
        assert_eq!(signal.current().as_deref(), Some("r1"));

        settle(Duration::from_millis(2900)).await;
        assert_eq!(signal.current().as_deref(), Some("r1"));

        settle(Duration::from_millis(200)).await;
        assert_eq!(signal.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_flash_wins_and_keeps_its_full_window() {
        let signal = HighlightSignal::new(Duration::from_secs(3));
        signal.flash("r1");
        settle(Duration::from_secs(2)).await;
        signal.flash("r2");
        assert_eq!(signal.current().as_deref(), Some("r2"));

        // r1's timer expires here but must not clear r2
        settle(Duration::from_millis(1500)).await;
        assert_eq!(signal.current().as_deref(), Some("r2"));

        settle(Duration::from_secs(2)).await;
        assert_eq!(signal.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_changes() {
        let signal = HighlightSignal::new(Duration::from_secs(1));
        let mut rx = signal.subscribe();

        signal.flash("r1");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_deref(), Some("r1"));

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), None);
    }

    #[tokio::test]
    async fn clear_resets_immediately() {
        let signal = HighlightSignal::default();
        signal.flash("r1");
        signal.clear();
        assert_eq!(signal.current(), None);
    }
}
