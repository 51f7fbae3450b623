use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use super::remote_store::{LoginPayload, RegisterPayload, RemoteError, RemoteStore, SetOptions};

struct StoredEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

struct UserRecord {
    user_id: String,
    email: String,
    first_name: String,
    last_name: String,
    password_hash: String,
}

/// In-process [`RemoteStore`] for local development and tests.
/// Honours TTLs lazily on read and keeps argon2 hashes in its user directory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<DashMap<String, StoredEntry>>,
    users: Arc<DashMap<String, UserRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        info!("Initializing in-memory remote store");
        Self::default()
    }

    /// Number of live (non-expired) keys
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.value().is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time-to-live of a key, if it has one
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        let entry = self.entries.get(key)?;
        entry
            .expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    fn hash_password(password: &str) -> Result<String, RemoteError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| RemoteError::Upstream {
                status: 500,
                message: format!("Hash error: {}", e),
            })
    }

    fn verify_password(password: &str, hash: &str) -> bool {
        PasswordHash::new(hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, RemoteError> {
        let expired = match self.entries.get(key) {
            None => return Err(RemoteError::NotFound(format!("Key {} not found", key))),
            Some(entry) if !entry.is_expired() => {
                let value = entry.value.clone();
                return Ok((!value.is_null()).then_some(value));
            }
            Some(_) => true,
        };

        if expired {
            self.entries.remove(key);
            debug!("Key {} expired, removed", key);
        }
        Err(RemoteError::NotFound(format!("Key {} not found", key)))
    }

    async fn set(&self, key: &str, value: Value, options: SetOptions) -> Result<(), RemoteError> {
        let expires_at = options
            .ttl
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        self.entries
            .insert(key.to_string(), StoredEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        match self.entries.remove(key) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(format!("Key {} not found", key))),
        }
    }

    async fn register(&self, payload: RegisterPayload) -> Result<Value, RemoteError> {
        let email = payload.email.trim().to_lowercase();
        let password_hash = Self::hash_password(&payload.password)?;

        match self.users.entry(email.clone()) {
            Entry::Occupied(_) => Err(RemoteError::Upstream {
                status: 409,
                message: "User with this email already exists".to_string(),
            }),
            Entry::Vacant(slot) => {
                let record = UserRecord {
                    user_id: Uuid::new_v4().to_string(),
                    email,
                    first_name: payload.first_name,
                    last_name: payload.last_name,
                    password_hash,
                };
                let data = json!({
                    "user_id": record.user_id,
                    "email": record.email,
                    "firstName": record.first_name,
                    "lastName": record.last_name,
                });
                slot.insert(record);
                Ok(data)
            }
        }
    }

    async fn login(&self, payload: LoginPayload) -> Result<Value, RemoteError> {
        let email = payload.email.trim().to_lowercase();
        let user = self.users.get(&email);

        match user {
            Some(user) if Self::verify_password(&payload.password, &user.password_hash) => Ok(json!({
                "user_id": user.user_id,
                "email": user.email,
                "token": Uuid::new_v4().to_string(),
            })),
            _ => Err(RemoteError::Upstream {
                status: 401,
                message: "Invalid email or password".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(email: &str) -> RegisterPayload {
        RegisterPayload {
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            email: email.into(),
            password: "cobol-1959".into(),
        }
    }

    #[tokio::test]
    async fn test_get_set_delete() {
        let store = InMemoryStore::new();
        assert!(store.get("k").await.unwrap_err().is_not_found());

        store.set("k", json!([1, 2]), SetOptions::default()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!([1, 2])));
        assert_eq!(store.len(), 1);

        store.delete("k").await.unwrap();
        assert!(store.is_empty());
        assert!(store.delete("k").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_null_value_has_no_payload() {
        let store = InMemoryStore::new();
        store.set("k", Value::Null, SetOptions::default()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_key_is_not_found() {
        let store = InMemoryStore::new();
        store.set("k", json!(1), SetOptions::with_ttl(0)).await.unwrap();
        assert!(store.get("k").await.unwrap_err().is_not_found());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_ttl_is_tracked() {
        let store = InMemoryStore::new();
        store.set("k", json!(1), SetOptions::with_ttl(3600)).await.unwrap();
        let ttl = store.ttl_of("k").unwrap();
        assert!(ttl > Duration::from_secs(3500));
        assert!(store.ttl_of("missing").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let store = InMemoryStore::new();
        let data = store.register(registration("grace@example.com")).await.unwrap();
        assert!(data["user_id"].is_string());

        let err = store
            .register(registration("Grace@Example.com"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_login_checks_password() {
        let store = InMemoryStore::new();
        let registered = store.register(registration("grace@example.com")).await.unwrap();

        let data = store
            .login(LoginPayload {
                email: "grace@example.com".into(),
                password: "cobol-1959".into(),
            })
            .await
            .unwrap();
        assert_eq!(data["user_id"], registered["user_id"]);

        let err = store
            .login(LoginPayload {
                email: "grace@example.com".into(),
                password: "wrong".into(),
            })
            .await
            .unwrap_err();
        assert!(!err.is_conflict());
    }
}
