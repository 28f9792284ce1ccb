//! Collaborator seams for entity and playlist lookup

use crate::types::{Entity, EntityId, Parent};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{watch, RwLock};

/// Playable entity lookup
#[async_trait]
pub trait EntityRepository: Send + Sync {
    async fn get(&self, id: EntityId) -> Result<Option<Entity>>;

    async fn observe(&self, id: EntityId) -> Result<watch::Receiver<Option<Entity>>>;

    /// Record that the entity was played
    async fn report_played(&self, id: EntityId) -> Result<()>;
}

/// Parent playlist lookup
#[async_trait]
pub trait ParentRepository: Send + Sync {
    async fn get(&self, url: &str) -> Result<Option<Parent>>;

    async fn observe(&self, url: &str) -> Result<watch::Receiver<Option<Parent>>>;
}

/// In-memory entity and playlist catalog
#[derive(Default)]
pub struct MemoryCatalog {
    entities: RwLock<HashMap<EntityId, watch::Sender<Option<Entity>>>>,
    parents: RwLock<HashMap<String, watch::Sender<Option<Parent>>>>,
    played: RwLock<Vec<EntityId>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_entity(&self, entity: Entity) {
        self.entities
            .write()
            .await
            .entry(entity.id)
            .or_insert_with(|| watch::channel(None).0)
            .send_replace(Some(entity));
    }

    pub async fn remove_entity(&self, id: EntityId) {
        if let Some(tx) = self.entities.read().await.get(&id) {
            tx.send_replace(None);
        }
    }

    pub async fn insert_parent(&self, parent: Parent) {
        self.parents
            .write()
            .await
            .entry(parent.url.clone())
            .or_insert_with(|| watch::channel(None).0)
            .send_replace(Some(parent));
    }

    /// Entities reported as played, oldest first
    pub async fn played(&self) -> Vec<EntityId> {
        self.played.read().await.clone()
    }
}

#[async_trait]
impl EntityRepository for MemoryCatalog {
    async fn get(&self, id: EntityId) -> Result<Option<Entity>> {
        Ok(self
            .entities
            .read()
            .await
            .get(&id)
            .and_then(|tx| tx.borrow().clone()))
    }

    async fn observe(&self, id: EntityId) -> Result<watch::Receiver<Option<Entity>>> {
        let mut entities = self.entities.write().await;
        Ok(entities
            .entry(id)
            .or_insert_with(|| watch::channel(None).0)
            .subscribe())
    }

    async fn report_played(&self, id: EntityId) -> Result<()> {
        self.played.write().await.push(id);
        Ok(())
    }
}

#[async_trait]
impl ParentRepository for MemoryCatalog {
    async fn get(&self, url: &str) -> Result<Option<Parent>> {
        Ok(self
            .parents
            .read()
            .await
            .get(url)
            .and_then(|tx| tx.borrow().clone()))
    }

    async fn observe(&self, url: &str) -> Result<watch::Receiver<Option<Parent>>> {
        let mut parents = self.parents.write().await;
        Ok(parents
            .entry(url.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParentSource;

    fn entity(id: EntityId) -> Entity {
        Entity {
            id,
            url: format!("http://example.com/live/{id}"),
            title: format!("Channel {id}"),
            parent_url: "http://example.com/list.m3u".into(),
            drm: None,
        }
    }

    #[tokio::test]
    async fn test_entity_lookup_and_observe() {
        let catalog = MemoryCatalog::new();
        assert!(EntityRepository::get(&catalog, 1).await.unwrap().is_none());

        let mut rx = EntityRepository::observe(&catalog, 1).await.unwrap();
        assert!(rx.borrow().is_none());

        catalog.insert_entity(entity(1)).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().map(|e| e.id), Some(1));

        catalog.remove_entity(1).await;
        assert!(EntityRepository::get(&catalog, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_parent_lookup() {
        let catalog = MemoryCatalog::new();
        catalog
            .insert_parent(Parent {
                url: "http://example.com/list.m3u".into(),
                title: "List".into(),
                user_agent: Some("VLC/3.0".into()),
                source: ParentSource::M3u,
            })
            .await;
        let parent = ParentRepository::get(&catalog, "http://example.com/list.m3u")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(parent.user_agent.as_deref(), Some("VLC/3.0"));
    }

    #[tokio::test]
    async fn test_report_played() {
        let catalog = MemoryCatalog::new();
        catalog.report_played(3).await.unwrap();
        catalog.report_played(5).await.unwrap();
        assert_eq!(catalog.played().await, vec![3, 5]);
    }
}
