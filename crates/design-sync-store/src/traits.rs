//! DesignStore trait: the abstract interface to the durable document service.
//!
//! Implementations include SQLite (local persistence) and in-memory (tests).
//! A hosted key-value document service is expected to implement the same
//! trait outside this workspace.

use async_trait::async_trait;
use design_sync_core::{DesignDocument, DesignPatch, DesignSummary, ProjectId, UserId};

use crate::error::Result;
use crate::subscription::Subscription;

/// Async interface for durable design persistence.
///
/// # Design Notes
///
/// - **Subscriptions**: `init_sync` delivers the current copy first (when one
///   exists), then every later write, including the caller's own.
/// - **Ownership**: `create_design` stamps the owner; `update_design` never
///   changes it; `delete_design` rejects non-owners with `NotOwner`.
/// - **Failures**: callers on the edit path treat write failures as
///   non-fatal and retry on the next change.
#[async_trait]
pub trait DesignStore: Send + Sync {
    /// Begin delivering changes to `project`'s durable copy.
    async fn init_sync(&self, project: &ProjectId) -> Result<Subscription>;

    /// Apply a partial update to an existing design.
    async fn update_design(&self, project: &ProjectId, patch: &DesignPatch) -> Result<()>;

    /// Persist a new design owned by `owner`, returning its fresh project id.
    async fn create_design(&self, document: &DesignDocument, owner: &UserId) -> Result<ProjectId>;

    /// Delete a design. Only its owner may do so.
    async fn delete_design(&self, project: &ProjectId, owner: &UserId) -> Result<()>;

    /// List the designs owned by `owner`, most recently modified first.
    async fn get_user_designs(&self, owner: &UserId) -> Result<Vec<DesignSummary>>;

    /// End a subscription started by `init_sync`.
    async fn stop_sync(&self, subscription: Subscription);

    /// Fetch the current durable copy, if any.
    async fn load_design(&self, project: &ProjectId) -> Result<Option<DesignDocument>>;
}
