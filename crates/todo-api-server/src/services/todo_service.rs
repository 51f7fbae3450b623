//! Per-user todo list kept as one JSON array in the remote store.
//!
//! Every mutation reads the whole array, changes it and writes it back. Mutations
//! for the same user are serialised inside this process; writers in other processes
//! still race (last write wins).

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{Todo, TodoFilter, TodoList, TodoPatch, TodoStats};
use crate::services::{RemoteError, RemoteStore, SetOptions};
use crate::utils::error::ApiError;
use crate::utils::KeyedLocks;

/// Remote key of a user's list: `todos_<user id>` with non-alphanumerics as `_`, lower-cased
pub fn todos_key(user_id: &str) -> String {
    format!("todos_{}", user_id)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

pub struct TodoService {
    store: Arc<dyn RemoteStore>,
    locks: KeyedLocks,
}

impl TodoService {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// A missing key or empty payload is an empty list
    async fn load(&self, user_id: &str) -> Result<TodoList, RemoteError> {
        let value = match self.store.get(&todos_key(user_id)).await {
            Ok(value) => value,
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        TodoList::from_value(value).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn save(&self, user_id: &str, list: &TodoList) -> Result<(), RemoteError> {
        let value = list
            .to_value()
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        self.store
            .set(&todos_key(user_id), value, SetOptions::default())
            .await?;
        debug!("Saved {} todos for user {}", list.len(), user_id);
        Ok(())
    }

    pub async fn list(&self, user_id: &str, filter: TodoFilter) -> Result<Vec<Todo>, ApiError> {
        let list = self
            .load(user_id)
            .await
            .map_err(|e| ApiError::remote("Failed to fetch todos", e))?;
        Ok(list.filtered(filter))
    }

    pub async fn stats(&self, user_id: &str) -> Result<TodoStats, ApiError> {
        let list = self
            .load(user_id)
            .await
            .map_err(|e| ApiError::remote("Failed to fetch todo stats", e))?;
        Ok(list.stats())
    }

    pub async fn create(&self, user_id: &str, text: &str) -> Result<Todo, ApiError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ApiError::Validation("Todo text is required".to_string()));
        }

        let _guard = self.locks.lock(user_id).await;

        let mut list = self.load(user_id).await.unwrap_or_else(|e| {
            warn!("Could not read todos for {}, starting fresh: {}", user_id, e);
            TodoList::default()
        });

        let todo = Todo::new(text);
        list.prepend(todo.clone());

        self.save(user_id, &list)
            .await
            .map_err(|e| ApiError::remote("Failed to create todo", e))?;

        info!("Todo {} created for user {}", todo.id, user_id);
        Ok(todo)
    }

    pub async fn update(&self, user_id: &str, id: &str, mut patch: TodoPatch) -> Result<Todo, ApiError> {
        if let Some(text) = patch.text.take() {
            let text = text.trim();
            if text.is_empty() {
                return Err(ApiError::Validation("Todo text cannot be empty".to_string()));
            }
            patch.text = Some(text.to_string());
        }

        let _guard = self.locks.lock(user_id).await;

        let mut list = self
            .load(user_id)
            .await
            .map_err(|e| ApiError::remote("Failed to update todo", e))?;

        let updated = list
            .apply(id, patch)
            .cloned()
            .ok_or_else(|| ApiError::NotFound("Todo not found".to_string()))?;

        self.save(user_id, &list)
            .await
            .map_err(|e| ApiError::remote("Failed to update todo", e))?;

        Ok(updated)
    }

    pub async fn delete(&self, user_id: &str, id: &str) -> Result<(), ApiError> {
        let _guard = self.locks.lock(user_id).await;

        let mut list = self
            .load(user_id)
            .await
            .map_err(|e| ApiError::remote("Failed to delete todo", e))?;

        if !list.remove(id) {
            return Err(ApiError::NotFound("Todo not found".to_string()));
        }

        self.save(user_id, &list)
            .await
            .map_err(|e| ApiError::remote("Failed to delete todo", e))?;

        info!("Todo {} deleted for user {}", id, user_id);
        Ok(())
    }

    /// Returns how many todos were removed; writes back even when none were
    pub async fn clear_completed(&self, user_id: &str) -> Result<usize, ApiError> {
        let _guard = self.locks.lock(user_id).await;

        let mut list = self
            .load(user_id)
            .await
            .map_err(|e| ApiError::remote("Failed to clear completed todos", e))?;

        let removed = list.clear_completed();

        self.save(user_id, &list)
            .await
            .map_err(|e| ApiError::remote("Failed to clear completed todos", e))?;

        debug!("Cleared {} completed todos for user {}", removed, user_id);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryStore;
    use serde_json::json;

    fn service() -> (InMemoryStore, Arc<TodoService>) {
        let store = InMemoryStore::new();
        let service = Arc::new(TodoService::new(Arc::new(store.clone())));
        (store, service)
    }

    #[test]
    fn test_todos_key_is_slugified() {
        assert_eq!(todos_key("AbC-12.x"), "todos_abc_12_x");
    }

    #[tokio::test]
    async fn test_create_trims_and_prepends() {
        let (_, service) = service();
        service.create("u1", "first").await.unwrap();
        let todo = service.create("u1", "  buy milk  ").await.unwrap();

        assert_eq!(todo.text, "buy milk");
        assert!(!todo.completed);

        let todos = service.list("u1", TodoFilter::All).await.unwrap();
        assert_eq!(todos[0].id, todo.id);
        assert_eq!(todos.len(), 2);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_text() {
        let (store, service) = service();
        let err = service.create("u1", "   ").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_update_blank_text_rejected() {
        let (_, service) = service();
        let todo = service.create("u1", "a").await.unwrap();
        let patch = TodoPatch {
            text: Some("  ".into()),
            completed: None,
        };
        assert!(matches!(
            service.update("u1", &todo.id, patch).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_list_behaves_as_empty() {
        let (store, service) = service();
        assert!(service.list("nobody", TodoFilter::All).await.unwrap().is_empty());
        assert!(matches!(
            service.delete("nobody", "x").await,
            Err(ApiError::NotFound(_))
        ));
        assert!(store.is_empty());

        assert_eq!(service.clear_completed("nobody").await.unwrap(), 0);
        assert_eq!(store.get(&todos_key("nobody")).await.unwrap(), Some(json!([])));
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_an_error_for_reads() {
        let (store, service) = service();
        store
            .set(&todos_key("u1"), json!({ "oops": true }), SetOptions::default())
            .await
            .unwrap();
        assert!(matches!(
            service.list("u1", TodoFilter::All).await,
            Err(ApiError::Remote { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_are_not_lost() {
        let (_, service) = service();

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.create("busy", &format!("task {}", i)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let todos = service.list("busy", TodoFilter::All).await.unwrap();
        assert_eq!(todos.len(), 20);
        assert!(service.locks.is_empty());
    }
}
