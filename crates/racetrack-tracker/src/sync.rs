//! Offline queue and sync manager
//!
//! Every telemetry point gets one immediate delivery attempt. Points that
//! fail, or that arrive while offline, go to a durable FIFO queue that is
//! drained in one bulk request when connectivity returns or when a sync is
//! requested manually.

use crate::error::{TrackingError, TrackingResult};
use crate::events::EventBus;
use crate::remote::TelemetrySink;
use racetrack_core::{CrossingEvent, Event, QueuedPoint, TelemetryPoint};
use racetrack_store::QueueRepository;
use racetrack_telemetry::MetricsCollector;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info, warn};

// ============================================================================
// OFFLINE QUEUE
// ============================================================================

/// Marker for a drain in flight: how many points were handed to the sink
/// and how many evictions had happened at that moment.
#[derive(Debug, Clone, Copy)]
pub struct DrainTicket {
    count: usize,
    evicted_mark: u64,
}

/// Durable FIFO of telemetry points awaiting delivery
pub struct OfflineQueue {
    repo: QueueRepository,
    points: tokio::sync::Mutex<VecDeque<QueuedPoint>>,
    len: AtomicUsize,
    max_len: Option<usize>,
    evicted: AtomicU64,
}

impl OfflineQueue {
    /// Load the persisted queue; unreadable data is logged and replaced
    pub async fn load(repo: QueueRepository, max_len: Option<usize>) -> Self {
        let points: VecDeque<QueuedPoint> = match repo.load().await {
            Ok(points) => points.into(),
            Err(e) => {
                warn!("Persisted offline queue unreadable, starting empty: {}", e);
                VecDeque::new()
            }
        };

        if !points.is_empty() {
            info!("Restored {} queued points", points.len());
        }

        Self {
            len: AtomicUsize::new(points.len()),
            points: tokio::sync::Mutex::new(points),
            repo,
            max_len,
            evicted: AtomicU64::new(0),
        }
    }

    /// Append a point and persist the queue. Returns how many old points
    /// the size bound evicted. The point stays queued in memory even when
    /// persisting fails.
    pub async fn push(&self, point: QueuedPoint) -> TrackingResult<u64> {
        let mut points = self.points.lock().await;
        points.push_back(point);

        let mut evicted = 0u64;
        if let Some(max) = self.max_len {
            while points.len() > max.max(1) {
                points.pop_front();
                evicted += 1;
            }
        }
        self.evicted.fetch_add(evicted, Ordering::Relaxed);
        self.len.store(points.len(), Ordering::Relaxed);

        self.repo.save(points.iter()).await?;
        Ok(evicted)
    }

    /// Copy of the queue contents plus a ticket for removing them later
    pub async fn begin_drain(&self) -> (Vec<QueuedPoint>, DrainTicket) {
        let points = self.points.lock().await;
        let ticket = DrainTicket {
            count: points.len(),
            evicted_mark: self.evicted.load(Ordering::Relaxed),
        };
        (points.iter().cloned().collect(), ticket)
    }

    /// Remove the points covered by `ticket`. Points appended after the
    /// drain began stay queued; points already evicted are not counted twice.
    pub async fn complete_drain(&self, ticket: DrainTicket) -> TrackingResult<usize> {
        let mut points = self.points.lock().await;
        let evicted_since = self.evicted.load(Ordering::Relaxed) - ticket.evicted_mark;
        let remove = ticket
            .count
            .saturating_sub(evicted_since as usize)
            .min(points.len());

        points.drain(..remove);
        self.len.store(points.len(), Ordering::Relaxed);

        if points.is_empty() {
            self.repo.clear().await?;
        } else {
            self.repo.save(points.iter()).await?;
        }
        Ok(points.len())
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Points evicted by the size bound since startup
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    pub async fn snapshot(&self) -> Vec<QueuedPoint> {
        self.points.lock().await.iter().cloned().collect()
    }
}

// ============================================================================
// SYNC MANAGER
// ============================================================================

/// What happened to a point handed to [`SyncManager::deliver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Queued,
}

/// Result of a successful drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub delivered: usize,
    pub remaining: usize,
}

/// Online/offline delivery state machine over the offline queue
pub struct SyncManager {
    sink: Arc<dyn TelemetrySink>,
    queue: OfflineQueue,
    online: AtomicBool,
    syncing: AtomicBool,
    delivered: AtomicU64,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    events: EventBus,
    metrics: Option<Arc<MetricsCollector>>,
}

/// Clears the in-progress flag when a drain ends, however it ends
struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncManager {
    pub fn new(
        sink: Arc<dyn TelemetrySink>,
        queue: OfflineQueue,
        online: bool,
        events: EventBus,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        if let Some(m) = &metrics {
            m.set_online(online);
            m.set_queue_depth(queue.len());
        }

        Self {
            sink,
            queue,
            online: AtomicBool::new(online),
            syncing: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            last_sync: Mutex::new(None),
            events,
            metrics,
        }
    }

    /// Attempt immediate delivery; queue the point on failure or while offline
    pub async fn deliver(&self, point: TelemetryPoint) -> DeliveryOutcome {
        if self.is_online() {
            match self.sink.send_point(&point).await {
                Ok(()) => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                    if let Some(m) = &self.metrics {
                        m.record_delivered(1);
                    }
                    return DeliveryOutcome::Delivered;
                }
                Err(e) => {
                    let err = TrackingError::TelemetryDelivery(e);
                    warn!("{}; queueing point", err);
                }
            }
        }

        self.enqueue(point).await;
        DeliveryOutcome::Queued
    }

    async fn enqueue(&self, point: TelemetryPoint) {
        match self.queue.push(point).await {
            Ok(evicted) if evicted > 0 => {
                warn!("Offline queue full, evicted {} oldest points", evicted);
                if let Some(m) = &self.metrics {
                    m.record_dropped(evicted);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Queued point held in memory only: {}", e),
        }

        if let Some(m) = &self.metrics {
            m.record_queued();
            m.set_queue_depth(self.queue.len());
        }
        self.events
            .publish(Event::pending_points_changed(self.queue.len(), self.queue.evicted()));
        debug!("Point queued ({} pending)", self.queue.len());
    }

    /// Deliver a crossing event through the immediate path.
    ///
    /// Crossing events are not queued: a failure is logged, counted and
    /// announced on the event bus, then returned to the caller.
    pub async fn deliver_crossing(&self, crossing: &CrossingEvent, checkpoint_name: &str) -> TrackingResult<()> {
        match self.sink.send_crossing(crossing).await {
            Ok(()) => {
                info!(
                    "Crossing of {} delivered for bib {}",
                    crossing.checkpoint_id, crossing.bib_number
                );
                Ok(())
            }
            Err(e) => {
                warn!("Crossing of {} not delivered: {}", crossing.checkpoint_id, e);
                if let Some(m) = &self.metrics {
                    m.record_crossing_failure();
                }
                self.events.publish(Event::crossing_delivery_failed(
                    crossing.clone(),
                    checkpoint_name.to_string(),
                    e.to_string(),
                ));
                Err(TrackingError::CrossingDelivery(e))
            }
        }
    }

    /// Apply a reachability change; going online drains the queue
    pub async fn set_online(&self, online: bool) {
        let was_online = self.online.swap(online, Ordering::AcqRel);
        if was_online == online {
            return;
        }

        info!("Network {}", if online { "online" } else { "offline" });
        if let Some(m) = &self.metrics {
            m.set_online(online);
        }
        self.events.publish(Event::connectivity_changed(online));

        if online && !self.queue.is_empty() {
            if let Err(e) = self.sync_now().await {
                warn!("Reconnect sync did not complete: {}", e);
            }
        }
    }

    /// Drain the whole queue in one bulk delivery.
    ///
    /// Success removes exactly the drained points; failure leaves the queue
    /// untouched. Only one drain runs at a time.
    pub async fn sync_now(&self) -> TrackingResult<SyncReport> {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TrackingError::SyncInProgress);
        }
        let _guard = SyncGuard(&self.syncing);

        let (points, ticket) = self.queue.begin_drain().await;
        if points.is_empty() {
            return Ok(SyncReport {
                delivered: 0,
                remaining: 0,
            });
        }

        info!("Syncing {} queued points", points.len());
        if let Err(e) = self.sink.send_points(&points).await {
            if let Some(m) = &self.metrics {
                m.record_sync(false);
            }
            self.events.publish(Event::sync_failed(self.queue.len(), e.to_string()));
            return Err(TrackingError::SyncDrain(e));
        }

        let delivered = points.len();
        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        *self.last_sync.lock() = Some(Utc::now());

        let remaining = match self.queue.complete_drain(ticket).await {
            Ok(remaining) => remaining,
            Err(e) => {
                warn!("Drained points removed in memory only: {}", e);
                self.queue.len()
            }
        };

        if let Some(m) = &self.metrics {
            m.record_sync(true);
            m.record_delivered(delivered as u64);
            m.set_queue_depth(remaining);
        }
        self.events.publish(Event::sync_completed(delivered, remaining));
        self.events
            .publish(Event::pending_points_changed(remaining, self.queue.evicted()));
        info!("Sync complete: {} delivered, {} pending", delivered, remaining);

        Ok(SyncReport { delivered, remaining })
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped(&self) -> u64 {
        self.queue.evicted()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.lock()
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }
}

// ============================================================================
// TESTS
// ============================================================================
