//! Event bus for user-facing notifications

use racetrack_core::{Event, EventType};

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// Event bus distributing engine events to the UI layer
pub struct EventBus {
    /// Broadcast sender for events
    sender: broadcast::Sender<Event>,
    /// Event history (last N events)
    history: Arc<RwLock<VecDeque<Event>>>,
    /// Maximum history size
    max_history: usize,
    /// Event counter
    event_count: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);

        Self {
            sender,
            history: Arc::new(RwLock::new(VecDeque::with_capacity(256))),
            max_history: 256,
            event_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publish an event
    pub fn publish(&self, event: Event) {
        {
            let mut history = self.history.write();
            history.push_back(event.clone());
            if history.len() > self.max_history {
                history.pop_front();
            }
        }

        let total = self.event_count.fetch_add(1, Ordering::Relaxed) + 1;

        // No subscribers is fine; history still holds the event
        let _ = self.sender.send(event);

        debug!("Event published, total: {}", total);
    }

    /// Get recent events, oldest first
    pub fn get_recent(&self, count: usize) -> Vec<Event> {
        let history = self.history.read();
        let start = history.len().saturating_sub(count);
        history.iter().skip(start).cloned().collect()
    }

    /// Count events of one type still held in history
    pub fn count_of(&self, event_type: EventType) -> usize {
        self.history
            .read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    /// Get event count
    pub fn get_event_count(&self) -> u64 {
        self.event_count.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            history: self.history.clone(),
            max_history: self.max_history,
            event_count: self.event_count.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus_creation() {
        let bus = EventBus::new(100);
        assert_eq!(bus.get_event_count(), 0);
    }

    #[test]
    fn test_event_history_is_bounded() {
        let bus = EventBus::new(16);

        for i in 0..300 {
            bus.publish(Event::pending_points_changed(i, 0));
        }

        assert_eq!(bus.get_event_count(), 300);
        assert_eq!(bus.get_recent(1000).len(), 256);
        assert_eq!(bus.get_recent(3).len(), 3);
        assert_eq!(bus.count_of(EventType::PendingPointsChanged), 256);
    }

    #[tokio::test]
    async fn test_subscription() {
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();

        bus.publish(Event::connectivity_changed(false));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.event_type, EventType::ConnectivityChanged);
    }

    #[test]
    fn test_clones_share_history() {
        let bus = EventBus::new(8);
        let other = bus.clone();
        other.publish(Event::low_battery(10, 60));
        assert_eq!(bus.count_of(EventType::LowBattery), 1);
    }
}
