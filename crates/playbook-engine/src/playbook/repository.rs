//! Read-only playbook lookup used by the engine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{EngineError, EngineResult};
use crate::playbook::types::Playbook;

/// Source of playbook definitions. The engine only reads from it.
#[async_trait]
pub trait PlaybookRepository: Send + Sync {
    /// Get a playbook by id.
    async fn get(&self, playbook_id: &str) -> EngineResult<Arc<Playbook>>;
}

/// Playbook repository backed by a map, for local runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryPlaybookRepository {
    playbooks: RwLock<HashMap<String, Arc<Playbook>>>,
}

impl InMemoryPlaybookRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a playbook.
    pub async fn insert(&self, playbook: Playbook) {
        self.playbooks
            .write()
            .await
            .insert(playbook.id.clone(), Arc::new(playbook));
    }
}

#[async_trait]
impl PlaybookRepository for InMemoryPlaybookRepository {
    async fn get(&self, playbook_id: &str) -> EngineResult<Arc<Playbook>> {
        self.playbooks
            .read()
            .await
            .get(playbook_id)
            .cloned()
            .ok_or_else(|| EngineError::PlaybookNotFound(playbook_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbook::types::PlaybookStatus;

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = InMemoryPlaybookRepository::new();
        repo.insert(Playbook {
            id: "pb-1".to_string(),
            name: "Contain host".to_string(),
            description: None,
            status: PlaybookStatus::Draft,
            components: vec![],
            tags: vec![],
        })
        .await;

        let playbook = repo.get("pb-1").await.unwrap();
        assert_eq!(playbook.name, "Contain host");
    }

    #[tokio::test]
    async fn test_get_missing() {
        let repo = InMemoryPlaybookRepository::new();
        let err = repo.get("nope").await.unwrap_err();
        assert!(matches!(err, EngineError::PlaybookNotFound(ref id) if id == "nope"));
    }
}
