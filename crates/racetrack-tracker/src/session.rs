//! Session manager
//!
//! Owns one tracking session at a time and drives the state machine
//! `Idle -> Starting -> Tracking -> Stopping -> Idle`. While tracking, a
//! position watch and a backup poll both feed [`SessionInner::process_fix`];
//! a one-second ticker keeps the elapsed time current and a network
//! listener flips the sync manager between online and offline.

use crate::error::{TrackingError, TrackingResult};
use crate::events::EventBus;
use crate::frequency::FrequencyController;
use crate::geofence::{Crossing, GeofenceMatcher};
use crate::location::{LocationAdapter, WatchHandle};
use crate::platform::{BatteryMonitor, Feedback, WakeLock};
use crate::recorder::TelemetryRecorder;
use crate::remote::MetadataSource;
use crate::state::{CheckpointSnapshot, FixSnapshot, SessionSnapshot, SessionState};
use crate::sync::{OfflineQueue, SyncManager, SyncReport};
use crate::{TrackerConfig, TrackerDeps};
use racetrack_core::{
    CrossingEvent, Event, FixSource, PositionFix, Registration, RegistrationId, TelemetryPoint,
    TrackingSession, TrackingStats, route_distance_m,
};
use racetrack_store::StoreClient;
use racetrack_telemetry::MetricsCollector;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runtime handles of the session in memory
struct ActiveSession {
    session: TrackingSession,
    /// Present only while capturing; crossings need the bib number
    registration: Option<Registration>,
    cancel: CancellationToken,
    watch: Option<WatchHandle>,
    tasks: Vec<JoinHandle<()>>,
    capturing: bool,
}

impl ActiveSession {
    /// Stop future callbacks; work already running finishes on its own
    fn cancel(&self) {
        self.cancel.cancel();
        if let Some(watch) = &self.watch {
            watch.cancel();
        }
    }
}

struct SessionInner {
    config: TrackerConfig,
    location: LocationAdapter,
    metadata: Arc<dyn MetadataSource>,
    store: Arc<StoreClient>,
    sync: SyncManager,
    battery: Option<Arc<dyn BatteryMonitor>>,
    wake_lock: Option<Arc<dyn WakeLock>>,
    feedback: Option<Arc<dyn Feedback>>,
    metrics: Option<Arc<MetricsCollector>>,
    events: EventBus,

    state: Mutex<SessionState>,
    active: Mutex<Option<ActiveSession>>,
    recorder: Mutex<TelemetryRecorder>,
    geofence: Mutex<GeofenceMatcher>,
    frequency: Mutex<Option<FrequencyController>>,
    battery_level: Mutex<Option<u8>>,
    elapsed: AtomicU64,

    /// Serializes start, stop, restore and shutdown
    lifecycle: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
}

/// Tracking session orchestrator
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    /// Build the manager, reload the offline queue and start listening
    /// for reachability changes
    pub async fn new(config: TrackerConfig, deps: TrackerDeps) -> Self {
        let TrackerDeps {
            location,
            metadata,
            sink,
            store,
            battery,
            wake_lock,
            feedback,
            network,
            metrics,
            events,
        } = deps;

        let queue = OfflineQueue::load(store.queue().clone(), config.max_queued_points).await;
        let online = network.as_ref().map(|rx| *rx.borrow()).unwrap_or(true);
        let sync = SyncManager::new(sink, queue, online, events.clone(), metrics.clone());

        let inner = Arc::new(SessionInner {
            config,
            location: LocationAdapter::new(location),
            metadata,
            store,
            sync,
            battery,
            wake_lock,
            feedback,
            metrics,
            events,
            state: Mutex::new(SessionState::Idle),
            active: Mutex::new(None),
            recorder: Mutex::new(TelemetryRecorder::new()),
            geofence: Mutex::new(GeofenceMatcher::default()),
            frequency: Mutex::new(None),
            battery_level: Mutex::new(None),
            elapsed: AtomicU64::new(0),
            lifecycle: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
        });

        match network {
            Some(rx) => {
                tokio::spawn(network_listener(
                    Arc::downgrade(&inner),
                    rx,
                    inner.shutdown.clone(),
                ));
            }
            None => debug!("No reachability signal, delivery always attempted"),
        }

        info!("Session manager ready ({} points queued)", inner.sync.pending());
        Self { inner }
    }

    /// Start tracking `registration_id`.
    ///
    /// A restored session that only keeps its timer running is replaced.
    pub async fn start(&self, registration_id: &RegistrationId) -> TrackingResult<TrackingSession> {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;

        inner.ensure_running("start a session")?;
        let state = inner.state();
        let timer_only = state == SessionState::Tracking && !inner.is_capturing();
        if state != SessionState::Idle && !timer_only {
            return Err(TrackingError::invalid_state(state, "start a session"));
        }

        // A restored session keeps ticking until its replacement is running
        let restored = if timer_only { inner.active.lock().take() } else { None };

        inner.set_state(SessionState::Starting);
        info!("Starting session for registration {}", registration_id);

        match self.begin(registration_id, Utc::now()).await {
            Ok(session) => {
                if let Some(previous) = restored {
                    info!(
                        "Replaced restored session for {}",
                        previous.session.registration_id
                    );
                    previous.cancel();
                }
                inner.events.publish(Event::session_started(
                    session.registration_id.clone(),
                    session.start_time,
                ));
                Ok(session)
            }
            Err(e) => {
                warn!("Session start failed: {}", e);
                match restored {
                    Some(previous) => {
                        debug!(
                            "Keeping restored session for {}",
                            previous.session.registration_id
                        );
                        *inner.active.lock() = Some(previous);
                        inner.set_state(SessionState::Tracking);
                    }
                    None => inner.set_state(SessionState::Idle),
                }
                Err(e)
            }
        }
    }

    /// Shared Starting -> Tracking path for fresh and resumed sessions
    async fn begin(
        &self,
        registration_id: &RegistrationId,
        start_time: DateTime<Utc>,
    ) -> TrackingResult<TrackingSession> {
        let inner = &self.inner;

        if let Err(e) = inner.location.ensure_permission().await {
            inner.record_location_error(&e);
            inner.events.publish(Event::permission_denied(e.to_string()));
            return Err(e);
        }

        let registration = inner
            .metadata
            .registration(registration_id)
            .await
            .map_err(TrackingError::Metadata)?;
        let race = inner
            .metadata
            .race(&registration.race_id)
            .await
            .map_err(TrackingError::Metadata)?;
        let checkpoints = inner
            .metadata
            .checkpoints(&registration.race_id, &registration.distance_id)
            .await
            .map_err(TrackingError::Metadata)?;

        let base_seconds = race
            .base_frequency_for(&registration.distance_id)
            .unwrap_or(inner.config.default_frequency.as_secs() as u32)
            .max(1);
        let mut frequency = FrequencyController::new(
            Duration::from_secs(base_seconds as u64),
            inner.config.conservation_interval,
            inner.config.low_battery_threshold,
        );

        let level = inner.sample_battery().await;
        let decision = frequency.update(level);

        let mut session = TrackingSession::new(&registration, start_time, decision.interval.as_secs() as u32);
        session.conservation_mode = decision.conservation;
        if let (true, Some(level)) = (decision.advisory, level) {
            inner.announce_low_battery(level, session.interval_seconds);
        }

        info!(
            "Race {} distance {}: {} checkpoints, sampling every {}s",
            race.name,
            registration.distance_id,
            checkpoints.len(),
            session.interval_seconds
        );

        inner.recorder.lock().reset();
        *inner.geofence.lock() = GeofenceMatcher::new(checkpoints);
        *inner.frequency.lock() = Some(frequency);
        inner
            .elapsed
            .store(session.elapsed_seconds_at(Utc::now()), Ordering::Relaxed);

        let cancel = inner.shutdown.child_token();
        *inner.active.lock() = Some(ActiveSession {
            session: session.clone(),
            registration: Some(registration),
            cancel: cancel.clone(),
            watch: None,
            tasks: Vec::new(),
            capturing: true,
        });

        match inner
            .location
            .current_fix(inner.config.accuracy, inner.config.fix_timeout, FixSource::Initial)
            .await
        {
            Ok(fix) => inner.process_fix(fix).await,
            Err(e) => {
                warn!("No initial fix ({}); continuing with watch and poll", e);
                inner.record_location_error(&e);
            }
        }

        let weak = Arc::downgrade(&self.inner);
        let watch = {
            let weak = weak.clone();
            inner.location.watch(inner.config.accuracy, move |fix| {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.process_fix(fix).await;
                    }
                }
            })
        };
        let watch = match watch {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Position watch unavailable ({}); relying on backup poll", e);
                inner.record_location_error(&e);
                None
            }
        };

        let tasks = vec![
            tokio::spawn(poll_loop(weak.clone(), cancel.clone())),
            tokio::spawn(tick_loop(weak, cancel, inner.config.tick_interval)),
        ];
        {
            let mut active = inner.active.lock();
            if let Some(active) = active.as_mut() {
                active.watch = watch;
                active.tasks = tasks;
            }
        }

        if let Some(lock) = &inner.wake_lock {
            if let Err(e) = lock.acquire().await {
                warn!("Wake lock not acquired: {}", e);
            }
        }

        if let Err(e) = inner.store.sessions().save(&session).await {
            warn!("Session record not persisted: {}", e);
        }

        inner.set_state(SessionState::Tracking);
        if let Some(m) = &inner.metrics {
            m.set_session_active(true);
            m.set_sampling(session.interval_seconds, session.conservation_mode);
        }
        info!(
            "Tracking registration {} since {}",
            session.registration_id, session.start_time
        );

        Ok(session)
    }

    /// Stop the running session, delete its record and attempt a final
    /// best-effort drain of the offline queue
    pub async fn stop(&self) -> TrackingResult<TrackingSession> {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;

        let state = inner.state();
        if state != SessionState::Tracking {
            return Err(TrackingError::invalid_state(state, "stop tracking"));
        }

        let active = inner.active.lock().take();
        let Some(active) = active else {
            inner.set_state(SessionState::Idle);
            return Err(TrackingError::invalid_state(SessionState::Idle, "stop tracking"));
        };

        inner.set_state(SessionState::Stopping);
        active.cancel();

        if active.capturing {
            if let Some(lock) = &inner.wake_lock {
                if let Err(e) = lock.release().await {
                    warn!("Wake lock not released: {}", e);
                }
            }
        }

        if let Err(e) = inner.store.sessions().clear().await {
            warn!("Session record not cleared: {}", e);
        }

        *inner.frequency.lock() = None;
        inner.set_state(SessionState::Idle);
        if let Some(m) = &inner.metrics {
            m.set_session_active(false);
        }

        let session = active.session;
        inner.events.publish(Event::session_stopped(
            session.registration_id.clone(),
            session.start_time,
        ));
        info!(
            "Session for {} stopped after {}s",
            session.registration_id,
            inner.elapsed.load(Ordering::Relaxed)
        );

        if inner.sync.pending() > 0 {
            let weak = Arc::downgrade(&self.inner);
            tokio::spawn(async move {
                let Some(inner) = weak.upgrade() else { return };
                match inner.sync.sync_now().await {
                    Ok(report) => debug!("Final drain delivered {} points", report.delivered),
                    Err(e) => warn!("Final drain failed, points stay queued: {}", e),
                }
            });
        }

        Ok(session)
    }

    /// Reload a session left active by a previous run.
    ///
    /// By default only the elapsed-time display comes back; capture resumes
    /// only when `resume_capture_on_restore` is set.
    pub async fn restore(&self) -> TrackingResult<Option<TrackingSession>> {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;

        inner.ensure_running("restore a session")?;
        let state = inner.state();
        if state != SessionState::Idle {
            return Err(TrackingError::invalid_state(state, "restore a session"));
        }

        let Some(mut session) = inner.store.sessions().load_active().await? else {
            debug!("No active session to restore");
            return Ok(None);
        };

        let now = Utc::now();
        if session.start_time > now {
            warn!(
                "Stored start time {} is in the future, clamping to now",
                session.start_time
            );
            session.start_time = now;
            if let Err(e) = inner.store.sessions().save(&session).await {
                warn!("Clamped session record not persisted: {}", e);
            }
        }

        if inner.config.resume_capture_on_restore {
            inner.set_state(SessionState::Starting);
            let registration_id = session.registration_id.clone();
            return match self.begin(&registration_id, session.start_time).await {
                Ok(resumed) => {
                    inner.events.publish(Event::session_restored(
                        resumed.registration_id.clone(),
                        resumed.start_time,
                    ));
                    Ok(Some(resumed))
                }
                Err(e) => {
                    warn!("Session resume failed: {}", e);
                    inner.set_state(SessionState::Idle);
                    Err(e)
                }
            };
        }

        inner
            .elapsed
            .store(session.elapsed_seconds_at(now), Ordering::Relaxed);

        let cancel = inner.shutdown.child_token();
        let ticker = tokio::spawn(tick_loop(
            Arc::downgrade(&self.inner),
            cancel.clone(),
            inner.config.tick_interval,
        ));

        *inner.active.lock() = Some(ActiveSession {
            session: session.clone(),
            registration: None,
            cancel,
            watch: None,
            tasks: vec![ticker],
            capturing: false,
        });
        inner.set_state(SessionState::Tracking);
        if let Some(m) = &inner.metrics {
            m.set_session_active(true);
        }

        inner.events.publish(Event::session_restored(
            session.registration_id.clone(),
            session.start_time,
        ));
        info!(
            "Restored session for {} ({}s elapsed, capture not resumed)",
            session.registration_id,
            inner.elapsed.load(Ordering::Relaxed)
        );

        Ok(Some(session))
    }

    /// Cancel every task and wait for them to finish. The session record is
    /// kept so the next run can restore it. The manager cannot start new
    /// sessions afterwards.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;

        inner.shutdown.cancel();

        let active = inner.active.lock().take();
        if let Some(active) = active {
            active.cancel();
            if active.capturing {
                if let Some(lock) = &inner.wake_lock {
                    if let Err(e) = lock.release().await {
                        warn!("Wake lock not released: {}", e);
                    }
                }
            }
            futures::future::join_all(active.tasks).await;
            info!(
                "Session for {} suspended, record kept for restore",
                active.session.registration_id
            );
        }

        inner.set_state(SessionState::Idle);
        if let Some(m) = &inner.metrics {
            m.set_session_active(false);
        }
        info!("Session manager shut down");
    }

    /// Drain the offline queue now
    pub async fn sync_now(&self) -> TrackingResult<SyncReport> {
        self.inner.sync.sync_now().await
    }

    pub fn stats(&self) -> TrackingStats {
        let inner = &self.inner;
        let (distance_m, speed_kmh) = {
            let recorder = inner.recorder.lock();
            (recorder.distance_m(), recorder.speed_kmh())
        };
        let (checkpoints_visited, checkpoints_total) = {
            let geofence = inner.geofence.lock();
            (geofence.visited_count(), geofence.checkpoint_count())
        };
        let conservation_mode = inner
            .active
            .lock()
            .as_ref()
            .is_some_and(|a| a.session.conservation_mode);

        TrackingStats {
            points_delivered: inner.sync.delivered(),
            distance_m,
            speed_kmh,
            elapsed_seconds: inner.elapsed.load(Ordering::Relaxed),
            last_sync: inner.sync.last_sync(),
            pending_points: inner.sync.pending(),
            dropped_points: inner.sync.dropped(),
            online: inner.sync.is_online(),
            conservation_mode,
            checkpoints_visited,
            checkpoints_total,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = &self.inner;
        let (session, capturing) = inner
            .active
            .lock()
            .as_ref()
            .map(|a| (Some(a.session.clone()), a.capturing))
            .unwrap_or((None, false));
        let last_fix = inner.recorder.lock().last_fix().map(FixSnapshot::from);
        let (checkpoints, route_distance_m) = {
            let geofence = inner.geofence.lock();
            let snapshots = geofence
                .checkpoints()
                .iter()
                .map(|c| CheckpointSnapshot::new(c, geofence.is_visited(&c.id)))
                .collect();
            (snapshots, route_distance_m(geofence.checkpoints()))
        };

        SessionSnapshot {
            state: inner.state(),
            interval_seconds: session.as_ref().map(|s| s.interval_seconds),
            session,
            capturing,
            battery_level: *inner.battery_level.lock(),
            last_fix,
            checkpoints,
            route_distance_m,
            stats: self.stats(),
            timestamp: Utc::now(),
        }
    }

    /// Effective sampling interval of the running session
    pub fn current_interval(&self) -> Duration {
        self.inner.current_interval()
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn session(&self) -> Option<TrackingSession> {
        self.inner.active.lock().as_ref().map(|a| a.session.clone())
    }

    pub fn is_capturing(&self) -> bool {
        self.inner.is_capturing()
    }

    pub fn is_online(&self) -> bool {
        self.inner.sync.is_online()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn sync(&self) -> &SyncManager {
        &self.inner.sync
    }
}

impl SessionInner {
    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn set_state(&self, state: SessionState) {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        if previous != state {
            debug!("Session state {} -> {}", previous, state);
        }
    }

    fn is_capturing(&self) -> bool {
        self.active.lock().as_ref().is_some_and(|a| a.capturing)
    }

    fn current_interval(&self) -> Duration {
        self.frequency
            .lock()
            .as_ref()
            .map(|f| f.effective_interval())
            .unwrap_or(self.config.default_frequency)
    }

    /// Session and registration of a capturing session
    fn capture_context(&self) -> Option<(TrackingSession, Registration)> {
        let active = self.active.lock();
        let active = active.as_ref().filter(|a| a.capturing)?;
        let registration = active.registration.clone()?;
        Some((active.session.clone(), registration))
    }

    /// Single pipeline for watch, poll and initial fixes
    async fn process_fix(&self, fix: PositionFix) {
        let Some((session, registration)) = self.capture_context() else {
            debug!("Fix from {} ignored, no session capturing", fix.source);
            return;
        };

        let distance_m = {
            let mut recorder = self.recorder.lock();
            recorder.record(&fix);
            recorder.distance_m()
        };
        debug!(
            "Fix ({}) {:.6},{:.6}, total {:.1}m",
            fix.source, fix.latitude, fix.longitude, distance_m
        );
        if let Some(m) = &self.metrics {
            m.record_fix(&fix.source.to_string());
            m.set_distance(distance_m);
        }

        // Visited set is updated before any await
        let crossings = self.geofence.lock().check(&fix);
        for crossing in crossings {
            self.handle_crossing(&registration, &fix, crossing).await;
        }

        let battery = *self.battery_level.lock();
        let point = TelemetryPoint::from_fix(&session, &fix, battery);
        self.sync.deliver(point).await;
    }

    async fn handle_crossing(&self, registration: &Registration, fix: &PositionFix, crossing: Crossing) {
        let Crossing { checkpoint, distance_m } = crossing;
        let event = CrossingEvent::gps_auto(registration, &checkpoint, fix.timestamp, distance_m);

        if let Some(m) = &self.metrics {
            m.record_crossing(checkpoint.id.as_str());
        }
        self.events.publish(Event::checkpoint_crossed(
            event.clone(),
            checkpoint.name.clone(),
            distance_m,
        ));

        if let Some(feedback) = &self.feedback {
            let feedback = feedback.clone();
            let checkpoint = checkpoint.clone();
            tokio::spawn(async move {
                if let Err(e) = feedback.checkpoint_crossed(&checkpoint).await {
                    warn!("Crossing feedback failed: {}", e);
                }
            });
        }

        if let Err(e) = self.sync.deliver_crossing(&event, &checkpoint.name).await {
            debug!("Crossing {} left undelivered: {}", checkpoint.id, e);
        }
    }

    async fn sample_battery(&self) -> Option<u8> {
        let battery = self.battery.as_ref()?;
        let level = battery.level().await.map(|l| l.min(100));
        if let Some(level) = level {
            *self.battery_level.lock() = Some(level);
            if let Some(m) = &self.metrics {
                m.set_battery(level);
            }
        }
        level
    }

    /// Re-read the battery and adjust the sampling interval
    async fn refresh_battery(&self) {
        let level = self.sample_battery().await;
        let decision = match self.frequency.lock().as_mut() {
            Some(frequency) => frequency.update(level),
            None => return,
        };

        let interval_seconds = decision.interval.as_secs() as u32;
        let changed = {
            let mut active = self.active.lock();
            active.as_mut().and_then(|a| {
                let changed = a.session.interval_seconds != interval_seconds
                    || a.session.conservation_mode != decision.conservation;
                a.session.interval_seconds = interval_seconds;
                a.session.conservation_mode = decision.conservation;
                changed.then(|| a.session.clone())
            })
        };

        if let (true, Some(level)) = (decision.advisory, level) {
            self.announce_low_battery(level, interval_seconds);
        }

        if let Some(session) = changed {
            info!(
                "Sampling interval now {}s (conservation: {})",
                interval_seconds, decision.conservation
            );
            if let Some(m) = &self.metrics {
                m.set_sampling(interval_seconds, decision.conservation);
            }
            if let Err(e) = self.store.sessions().save(&session).await {
                warn!("Session record not updated: {}", e);
            }
        }
    }

    fn announce_low_battery(&self, level: u8, interval_seconds: u32) {
        warn!(
            "Battery at {}%, sampling reduced to every {}s",
            level, interval_seconds
        );
        self.events
            .publish(Event::low_battery(level, interval_seconds));
    }

    fn tick(&self, now: DateTime<Utc>) {
        let elapsed = self
            .active
            .lock()
            .as_ref()
            .map(|a| a.session.elapsed_seconds_at(now));
        if let Some(elapsed) = elapsed {
            self.elapsed.store(elapsed, Ordering::Relaxed);
        }
    }

    /// A shut down manager refuses new sessions; its task tree is cancelled
    fn ensure_running(&self, action: &str) -> TrackingResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(TrackingError::invalid_state("shut down", action));
        }
        Ok(())
    }

    fn record_location_error(&self, error: &TrackingError) {
        if let Some(m) = &self.metrics {
            m.record_location_error(error.kind());
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ============================================================================
// BACKGROUND TASKS
// ============================================================================

/// Backup poll: one fix per effective interval, battery re-read first
async fn poll_loop(weak: Weak<SessionInner>, cancel: CancellationToken) {
    loop {
        let interval = match weak.upgrade() {
            Some(inner) => inner.current_interval(),
            None => break,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(inner) = weak.upgrade() else { break };
        inner.refresh_battery().await;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = inner.location.current_fix(
                inner.config.accuracy,
                inner.config.fix_timeout,
                FixSource::Poll,
            ) => result,
        };

        match result {
            Ok(fix) => inner.process_fix(fix).await,
            Err(TrackingError::FixTimeout(timeout)) => {
                debug!("Poll fix timed out after {:?}, tick skipped", timeout);
                inner.record_location_error(&TrackingError::FixTimeout(timeout));
            }
            Err(e) => {
                warn!("Poll fix failed: {}", e);
                inner.record_location_error(&e);
            }
        }
    }
    debug!("Backup poll stopped");
}

/// Recompute elapsed time every tick, independent of fixes
async fn tick_loop(weak: Weak<SessionInner>, cancel: CancellationToken, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(inner) = weak.upgrade() else { break };
        inner.tick(Utc::now());
    }
}

async fn network_listener(
    weak: Weak<SessionInner>,
    mut rx: watch::Receiver<bool>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    debug!("Reachability signal closed");
                    break;
                }
            }
        }

        let online = *rx.borrow_and_update();
        let Some(inner) = weak.upgrade() else { break };
        inner.sync.set_online(online).await;
    }
}

// ============================================================================
// TESTS
// ============================================================================
