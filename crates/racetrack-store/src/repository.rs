//! Typed repositories over the key-value store

use crate::{KeyValueStore, QUEUE_KEY, SESSION_KEY, StoreResult};
use racetrack_core::{QueuedPoint, TrackingSession};

use std::sync::Arc;
use tracing::debug;

/// Repository for the single active session record
#[derive(Clone)]
pub struct SessionRepository {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionRepository {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub async fn load(&self) -> StoreResult<Option<TrackingSession>> {
        match self.kv.get(SESSION_KEY).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Load the record only when it is flagged active
    pub async fn load_active(&self) -> StoreResult<Option<TrackingSession>> {
        Ok(self.load().await?.filter(|s| s.active))
    }

    pub async fn save(&self, session: &TrackingSession) -> StoreResult<()> {
        let raw = serde_json::to_string(session)?;
        self.kv.set(SESSION_KEY, raw).await?;
        debug!("Session record saved for {}", session.registration_id);
        Ok(())
    }

    pub async fn clear(&self) -> StoreResult<()> {
        self.kv.remove(SESSION_KEY).await
    }
}

/// Repository for the offline telemetry queue.
///
/// The queue is stored as one JSON array and rewritten wholesale on every
/// mutation; array order is queue order.
#[derive(Clone)]
pub struct QueueRepository {
    kv: Arc<dyn KeyValueStore>,
}

impl QueueRepository {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub async fn load(&self) -> StoreResult<Vec<QueuedPoint>> {
        match self.kv.get(QUEUE_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn save<'a, I>(&self, points: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = &'a QueuedPoint>,
    {
        let points: Vec<&QueuedPoint> = points.into_iter().collect();
        let raw = serde_json::to_string(&points)?;
        self.kv.set(QUEUE_KEY, raw).await?;
        debug!("Offline queue persisted ({} points)", points.len());
        Ok(())
    }

    pub async fn clear(&self) -> StoreResult<()> {
        self.kv.remove(QUEUE_KEY).await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStore, StoreError};
    use chrono::{Duration, Utc};
    use racetrack_core::{Registration, RegistrationId};

    fn registration() -> Registration {
        Registration {
            id: RegistrationId::new("reg-7"),
            race_id: "race-1".into(),
            distance_id: "d-21k".into(),
            bib_number: "77".into(),
            participant_name: None,
        }
    }

    fn point(n: i64) -> QueuedPoint {
        QueuedPoint {
            race_id: "race-1".into(),
            registration_id: RegistrationId::new("reg-7"),
            latitude: 40.0 + n as f64 * 0.001,
            longitude: -3.0,
            altitude: None,
            accuracy: Some(5.0),
            speed: None,
            battery_level: Some(80),
            timestamp: Utc::now() + Duration::seconds(n),
        }
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let repo = SessionRepository::new(Arc::new(MemoryStore::new()));
        assert!(repo.load().await.unwrap().is_none());

        let session = TrackingSession::new(&registration(), Utc::now(), 10);
        repo.save(&session).await.unwrap();

        let loaded = repo.load_active().await.unwrap().unwrap();
        assert_eq!(loaded.registration_id, session.registration_id);
        assert_eq!(loaded.start_time, session.start_time);

        repo.clear().await.unwrap();
        assert!(repo.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inactive_session_is_ignored() {
        let repo = SessionRepository::new(Arc::new(MemoryStore::new()));
        let mut session = TrackingSession::new(&registration(), Utc::now(), 10);
        session.active = false;
        repo.save(&session).await.unwrap();

        assert!(repo.load_active().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_queue_preserves_order() {
        let repo = QueueRepository::new(Arc::new(MemoryStore::new()));
        let points: Vec<QueuedPoint> = (0..3).map(point).collect();
        repo.save(&points).await.unwrap();

        let loaded = repo.load().await.unwrap();
        assert_eq!(loaded, points);
    }

    #[tokio::test]
    async fn test_corrupt_queue_reports_error() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(QUEUE_KEY, "not json".into()).await.unwrap();

        let repo = QueueRepository::new(kv);
        assert!(matches!(repo.load().await, Err(StoreError::Serialization(_))));
    }
}
