//! Zone-entry edge detection.

use std::collections::HashSet;

use geonote_core::Reminder;

use crate::distance::contains;
use crate::types::Position;

/// Remembers which reminders' zones currently contain the device.
///
/// Only the outside to inside transition is reported. Leaving a zone forgets
/// it, so coming back reports again.
#[derive(Debug, Default)]
pub struct ZoneTracker {
    inside: HashSet<String>,
}

impl ZoneTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one fix against every geo reminder.
    ///
    /// Returns the reminders whose zone was entered by this fix.
    pub fn observe<'a>(&mut self, position: &Position, reminders: &'a [Reminder]) -> Vec<&'a Reminder> {
        let mut entered = Vec::new();

        for reminder in reminders {
            let inside = reminder.zone().is_some_and(|zone| contains(position, zone));

            if inside {
                if self.inside.insert(reminder.id.clone()) {
                    entered.push(reminder);
                }
            } else {
                self.inside.remove(&reminder.id);
            }
        }

        entered
    }

    pub fn is_inside(&self, reminder_id: &str) -> bool {
        self.inside.contains(reminder_id)
    }

    pub fn len(&self) -> usize {
        self.inside.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inside.is_empty()
    }

    pub fn clear(&mut self) {
        self.inside.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use geonote_core::Zone;

    const INSIDE: Position = Position {
        latitude: 52.3700,
        longitude: 4.8900,
        accuracy_meters: None,
    };
    const OUTSIDE: Position = Position {
        latitude: 52.3800,
        longitude: 4.8900,
        accuracy_meters: None,
    };

    fn zone_reminder(id: &str) -> Reminder {
        Reminder::geo(id, "Buy milk", Zone::new(52.3700, 4.8900, 100.0))
    }

    #[test]
    fn entry_edge_fires_once_while_inside() {
        let reminders = vec![zone_reminder("r1")];
        let mut tracker = ZoneTracker::new();

        assert_eq!(tracker.observe(&INSIDE, &reminders).len(), 1);
        assert!(tracker.observe(&INSIDE, &reminders).is_empty());
        assert!(tracker.observe(&INSIDE, &reminders).is_empty());
        assert!(tracker.is_inside("r1"));
    }

    #[test]
    fn re_entry_fires_again() {
        let reminders = vec![zone_reminder("r1")];
        let mut tracker = ZoneTracker::new();

        let fired: usize = [OUTSIDE, INSIDE, INSIDE, OUTSIDE, INSIDE]
            .iter()
            .map(|p| tracker.observe(p, &reminders).len())
            .sum();

        assert_eq!(fired, 2);
    }

    #[test]
    fn leaving_forgets_membership() {
        let reminders = vec![zone_reminder("r1")];
        let mut tracker = ZoneTracker::new();

        tracker.observe(&INSIDE, &reminders);
        tracker.observe(&OUTSIDE, &reminders);
        assert!(!tracker.is_inside("r1"));
        assert!(tracker.is_empty());
    }

    #[test]
    fn non_geo_and_incomplete_reminders_never_fire() {
        let broken = Reminder::geo(
            "broken",
            "",
            Zone {
                longitude: None,
                ..Zone::new(52.3700, 4.8900, 100.0)
            },
        );
        let reminders = vec![Reminder::timed("timed", "", Utc::now()), broken, zone_reminder("r1")];
        let mut tracker = ZoneTracker::new();

        let entered = tracker.observe(&INSIDE, &reminders);
        assert_eq!(entered.len(), 1);
        assert_eq!(entered[0].id, "r1");
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn overlapping_zones_fire_independently() {
        let reminders = vec![
            zone_reminder("a"),
            Reminder::geo("b", "Bakery", Zone::new(52.3705, 4.8900, 200.0)),
        ];
        let mut tracker = ZoneTracker::new();

        assert_eq!(tracker.observe(&INSIDE, &reminders).len(), 2);
        tracker.clear();
        assert_eq!(tracker.observe(&INSIDE, &reminders).len(), 2);
    }
}
