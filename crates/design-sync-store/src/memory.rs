//! In-memory implementation of the DesignStore trait.
//!
//! Same semantics as SQLite, nothing persisted. Writes can be made to fail
//! on demand to exercise the sync layer's failure handling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use design_sync_core::{
    now_millis, DesignDocument, DesignPatch, DesignSummary, ProjectId, UserId,
};
use tracing::warn;

use crate::error::{Result, StoreError};
use crate::subscription::{Subscribers, Subscription};
use crate::traits::DesignStore;

/// Designs held in a process-local map, with switchable outages for tests.
///
/// Contents vanish with the value.
#[derive(Default)]
pub struct MemoryDesignStore {
    designs: RwLock<HashMap<ProjectId, DesignDocument>>,
    subscribers: Subscribers,
    unavailable: AtomicBool,
    updates: AtomicUsize,
}

impl MemoryDesignStore {
    /// An empty store that is online.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a design under a chosen id, bypassing id generation.
    pub fn insert(&self, project: ProjectId, document: DesignDocument) {
        if let Ok(mut designs) = self.designs.write() {
            designs.insert(project, document);
        }
    }

    /// Make every write fail with `Unavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful `update_design` calls.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Live subscriber count for a project.
    pub fn subscriber_count(&self, project: &ProjectId) -> usize {
        self.subscribers.count(project)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            warn!("memory store offline, rejecting write");
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("lock poisoned".into())
    }
}

#[async_trait]
impl DesignStore for MemoryDesignStore {
    async fn init_sync(&self, project: &ProjectId) -> Result<Subscription> {
        let current = self
            .designs
            .read()
            .map_err(|_| Self::poisoned())?
            .get(project)
            .cloned();
        Ok(self.subscribers.subscribe(project, current))
    }

    async fn update_design(&self, project: &ProjectId, patch: &DesignPatch) -> Result<()> {
        self.check_available()?;
        let updated = {
            let mut designs = self.designs.write().map_err(|_| Self::poisoned())?;
            let doc = designs
                .get_mut(project)
                .ok_or_else(|| StoreError::NotFound(project.to_string()))?;
            doc.apply_patch(patch);
            doc.clone()
        };
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.subscribers.notify(project, &updated);
        Ok(())
    }

    async fn create_design(&self, document: &DesignDocument, owner: &UserId) -> Result<ProjectId> {
        self.check_available()?;
        let mut designs = self.designs.write().map_err(|_| Self::poisoned())?;

        let mut project = ProjectId::generate();
        while designs.contains_key(&project) {
            project = ProjectId::generate();
        }

        let mut doc = document.clone();
        doc.owner_id = Some(owner.clone());
        if doc.last_modified == 0 {
            doc.last_modified = now_millis();
        }
        designs.insert(project.clone(), doc);
        Ok(project)
    }

    async fn delete_design(&self, project: &ProjectId, owner: &UserId) -> Result<()> {
        self.check_available()?;
        {
            let mut designs = self.designs.write().map_err(|_| Self::poisoned())?;
            let doc = designs
                .get(project)
                .ok_or_else(|| StoreError::NotFound(project.to_string()))?;
            if doc.owner_id.as_ref() != Some(owner) {
                return Err(StoreError::NotOwner {
                    project: project.to_string(),
                    user: owner.to_string(),
                });
            }
            designs.remove(project);
        }
        self.subscribers.close_project(project);
        Ok(())
    }

    async fn get_user_designs(&self, owner: &UserId) -> Result<Vec<DesignSummary>> {
        let designs = self.designs.read().map_err(|_| Self::poisoned())?;
        let mut summaries: Vec<DesignSummary> = designs
            .iter()
            .filter(|(_, doc)| doc.owner_id.as_ref() == Some(owner))
            .map(|(id, doc)| doc.summary(id.clone()))
            .collect();
        summaries.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(summaries)
    }

    async fn stop_sync(&self, subscription: Subscription) {
        self.subscribers.remove(&subscription);
    }

    async fn load_design(&self, project: &ProjectId) -> Result<Option<DesignDocument>> {
        Ok(self
            .designs
            .read()
            .map_err(|_| Self::poisoned())?
            .get(project)
            .cloned())
    }
}
