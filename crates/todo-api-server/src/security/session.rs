//! Session records kept in the remote store.
//!
//! A session id is the user id handed back by the platform on register/login.
//! Records live under [`session_key`] with a TTL set once at creation; refreshing
//! `lastActivity` re-writes the record with whatever TTL remains, so activity
//! never extends the original expiry.
//!
//! Writes for one session id are serialised in-process. A refresh only lands on
//! the record it was read from: it is dropped once the session is destroyed or
//! replaced by a newer login.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::services::{RemoteError, RemoteStore, SetOptions};
use crate::utils::KeyedLocks;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            email: email.into(),
            created_at: now,
            last_activity: now,
        }
    }
}

/// Session attached to an authenticated request
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub session_id: String,
    pub session: Session,
}

impl AuthSession {
    pub fn user_id(&self) -> &str {
        &self.session.user_id
    }
}

/// Remote key for a session id; hyphens become underscores
pub fn session_key(session_id: &str) -> String {
    format!("session_{}", session_id.trim().replace('-', "_"))
}

/// Why a session lookup failed
#[derive(Debug)]
pub enum SessionLookupError {
    /// Record present but empty or undecodable
    Invalid,
    NotFound,
    Remote(RemoteError),
}

pub struct SessionManager {
    store: Arc<dyn RemoteStore>,
    ttl_seconds: u64,
    locks: KeyedLocks,
}

impl SessionManager {
    pub fn new(store: Arc<dyn RemoteStore>, ttl_seconds: u64) -> Self {
        Self {
            store,
            ttl_seconds,
            locks: KeyedLocks::new(),
        }
    }

    /// Write a fresh session record for `user_id` with the full TTL
    pub async fn create(&self, user_id: &str, email: &str) -> Result<Session, RemoteError> {
        let session = Session::new(user_id, email);
        let value = serde_json::to_value(&session).map_err(|e| RemoteError::Decode(e.to_string()))?;

        let key = session_key(user_id);
        let _guard = self.locks.lock(&key).await;
        self.store
            .set(&key, value, SetOptions::with_ttl(self.ttl_seconds))
            .await?;

        info!("Session created for user: {}", user_id);
        Ok(session)
    }

    pub async fn lookup(&self, session_id: &str) -> Result<Session, SessionLookupError> {
        match self.store.get(&session_key(session_id)).await {
            Ok(Some(value)) => serde_json::from_value::<Session>(value).map_err(|e| {
                warn!("Undecodable session record for {}: {}", session_id, e);
                SessionLookupError::Invalid
            }),
            Ok(None) => Err(SessionLookupError::Invalid),
            Err(e) if e.is_not_found() => Err(SessionLookupError::NotFound),
            Err(e) => Err(SessionLookupError::Remote(e)),
        }
    }

    /// TTL left on a session created at `created_at`, never below one second
    pub fn remaining_ttl(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
        let elapsed = (now - created_at).num_seconds().max(0) as u64;
        self.ttl_seconds.saturating_sub(elapsed).max(1)
    }

    /// Re-write the record with `lastActivity = now`, keeping the original expiry.
    ///
    /// Returns `Ok(false)` without writing when the record is gone or now belongs
    /// to a different login than `session`.
    pub async fn touch(&self, session_id: &str, mut session: Session) -> Result<bool, RemoteError> {
        let key = session_key(session_id);
        let _guard = self.locks.lock(&key).await;

        let current = match self.store.get(&key).await {
            Ok(Some(value)) => serde_json::from_value::<Session>(value).ok(),
            Ok(None) => None,
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        if !matches!(current, Some(current) if current.created_at == session.created_at) {
            debug!("Session {} ended or replaced, refresh skipped", session_id);
            return Ok(false);
        }

        let now = Utc::now();
        let ttl = self.remaining_ttl(session.created_at, now);
        session.last_activity = now;

        let value = serde_json::to_value(&session).map_err(|e| RemoteError::Decode(e.to_string()))?;
        self.store.set(&key, value, SetOptions::with_ttl(ttl)).await?;

        debug!("Session {} activity refreshed (ttl={}s)", session_id, ttl);
        Ok(true)
    }

    /// Detached [`SessionManager::touch`]; failures are only logged
    pub fn spawn_touch(self: &Arc<Self>, session_id: String, session: Session) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = manager.touch(&session_id, session).await {
                warn!("Failed to refresh session {}: {}", session_id, e);
            }
        });
    }

    /// Remove the record; an already-missing record counts as success
    pub async fn destroy(&self, session_id: &str) -> Result<(), RemoteError> {
        let key = session_key(session_id);
        let _guard = self.locks.lock(&key).await;
        match self.store.delete(&key).await {
            Ok(()) => {
                info!("Session destroyed: {}", session_id);
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryStore;
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    fn manager() -> (InMemoryStore, SessionManager) {
        let store = InMemoryStore::new();
        let manager = SessionManager::new(Arc::new(store.clone()), 3600);
        (store, manager)
    }

    #[test]
    fn test_session_key_normalizes_hyphens() {
        assert_eq!(
            session_key("3f2a-77b1-9c"),
            "session_3f2a_77b1_9c".to_string()
        );
        assert_eq!(session_key(" abc "), "session_abc");
    }

    #[test]
    fn test_remaining_ttl() {
        let (_, manager) = manager();
        let created = Utc::now();
        assert_eq!(manager.remaining_ttl(created, created), 3600);
        assert_eq!(manager.remaining_ttl(created, created + Duration::seconds(600)), 3000);
        assert_eq!(manager.remaining_ttl(created, created + Duration::days(2)), 1);
    }

    #[tokio::test]
    async fn test_create_then_lookup() {
        let (store, manager) = manager();
        let created = manager.create("user-1", "ada@example.com").await.unwrap();

        let found = manager.lookup("user-1").await.unwrap();
        assert_eq!(found, created);
        assert!(store.ttl_of("session_user_1").is_some());
    }

    #[tokio::test]
    async fn test_lookup_failures() {
        let (store, manager) = manager();
        assert!(matches!(
            manager.lookup("ghost").await,
            Err(SessionLookupError::NotFound)
        ));

        store
            .set("session_broken", serde_json::json!({ "foo": 1 }), SetOptions::default())
            .await
            .unwrap();
        assert!(matches!(
            manager.lookup("broken").await,
            Err(SessionLookupError::Invalid)
        ));
    }

    #[tokio::test]
    async fn test_touch_updates_last_activity_without_extending_ttl() {
        let (store, manager) = manager();
        let mut session = Session::new("u2", "u2@example.com");
        session.created_at = session.created_at - Duration::seconds(1800);
        session.last_activity = session.created_at;
        store
            .set(
                "session_u2",
                serde_json::to_value(&session).unwrap(),
                SetOptions::with_ttl(1800),
            )
            .await
            .unwrap();

        assert!(manager.touch("u2", session.clone()).await.unwrap());

        let refreshed = manager.lookup("u2").await.unwrap();
        assert!(refreshed.last_activity > session.last_activity);
        assert_eq!(refreshed.created_at, session.created_at);
        let ttl = store.ttl_of("session_u2").unwrap();
        assert!(ttl.as_secs() <= 1800);
    }

    #[tokio::test]
    async fn test_touch_after_destroy_does_not_resurrect() {
        let (_, manager) = manager();
        let session = manager.create("u4", "u4@example.com").await.unwrap();
        manager.destroy("u4").await.unwrap();

        assert!(!manager.touch("u4", session).await.unwrap());
        assert!(matches!(
            manager.lookup("u4").await,
            Err(SessionLookupError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_stale_touch_keeps_newer_login() {
        let (_, manager) = manager();
        let mut stale = manager.create("u5", "u5@example.com").await.unwrap();
        stale.created_at = stale.created_at - Duration::seconds(60);
        let fresh = manager.create("u5", "u5@example.com").await.unwrap();

        assert!(!manager.touch("u5", stale).await.unwrap());
        assert_eq!(manager.lookup("u5").await.unwrap(), fresh);
    }

    /// Store whose writes complete only after a delay
    struct SlowWrites {
        inner: InMemoryStore,
        delay: StdDuration,
    }

    #[async_trait::async_trait]
    impl RemoteStore for SlowWrites {
        async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, RemoteError> {
            self.inner.get(key).await
        }

        async fn set(
            &self,
            key: &str,
            value: serde_json::Value,
            options: SetOptions,
        ) -> Result<(), RemoteError> {
            tokio::time::sleep(self.delay).await;
            self.inner.set(key, value, options).await
        }

        async fn delete(&self, key: &str) -> Result<(), RemoteError> {
            self.inner.delete(key).await
        }

        async fn register(
            &self,
            payload: crate::services::RegisterPayload,
        ) -> Result<serde_json::Value, RemoteError> {
            self.inner.register(payload).await
        }

        async fn login(
            &self,
            payload: crate::services::LoginPayload,
        ) -> Result<serde_json::Value, RemoteError> {
            self.inner.login(payload).await
        }
    }

    #[tokio::test]
    async fn test_slow_refresh_cannot_undo_destroy() {
        let store = SlowWrites {
            inner: InMemoryStore::new(),
            delay: StdDuration::from_millis(50),
        };
        let manager = Arc::new(SessionManager::new(Arc::new(store), 3600));
        let session = manager.create("u6", "u6@example.com").await.unwrap();

        manager.spawn_touch("u6".to_string(), session);
        tokio::task::yield_now().await;
        manager.destroy("u6").await.unwrap();

        tokio::time::sleep(StdDuration::from_millis(200)).await;
        assert!(matches!(
            manager.lookup("u6").await,
            Err(SessionLookupError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let (_, manager) = manager();
        manager.create("u3", "u3@example.com").await.unwrap();
        manager.destroy("u3").await.unwrap();
        manager.destroy("u3").await.unwrap();
        assert!(matches!(
            manager.lookup("u3").await,
            Err(SessionLookupError::NotFound)
        ));
    }
}
