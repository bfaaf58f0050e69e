//! Owner-scoped access to the designs in the durable store.

use std::sync::Arc;

use design_sync_core::{DesignDocument, DesignSummary, ProjectId, UserId};
use design_sync_store::DesignStore;
use tracing::info;

use crate::error::Result;

/// The designs a user can list, open, create and delete.
#[derive(Clone)]
pub struct DesignLibrary {
    store: Arc<dyn DesignStore>,
}

impl DesignLibrary {
    pub fn new(store: Arc<dyn DesignStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DesignStore> {
        &self.store
    }

    /// Persist a new design owned by `owner` and return its project id.
    pub async fn create(&self, document: &DesignDocument, owner: &UserId) -> Result<ProjectId> {
        Ok(self.store.create_design(document, owner).await?)
    }

    /// Designs owned by `owner`, most recently modified first.
    pub async fn list(&self, owner: &UserId) -> Result<Vec<DesignSummary>> {
        Ok(self.store.get_user_designs(owner).await?)
    }

    /// Delete a design. Fails unless `owner` owns it.
    pub async fn delete(&self, project: &ProjectId, owner: &UserId) -> Result<()> {
        self.store.delete_design(project, owner).await?;
        info!(project = %project, owner = %owner, "design deleted");
        Ok(())
    }

    pub async fn load(&self, project: &ProjectId) -> Result<Option<DesignDocument>> {
        Ok(self.store.load_design(project).await?)
    }
}
