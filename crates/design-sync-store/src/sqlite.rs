//! SQLite-backed [`DesignStore`].
//!
//! Documents are stored as JSON text next to the scalar columns used for
//! listing. Change subscriptions only observe writes made through the same
//! store value.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use design_sync_core::{
    now_millis, AccessLevel, DesignDocument, DesignPatch, DesignSummary, ProjectId, UserId,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::subscription::{Subscribers, Subscription};
use crate::traits::DesignStore;

/// Designs persisted in one SQLite database.
///
/// The connection sits behind a mutex and every query runs on the blocking
/// pool, so no async task ever waits on disk.
pub struct SqliteDesignStore {
    conn: Arc<Mutex<Connection>>,
    subscribers: Subscribers,
}

impl SqliteDesignStore {
    /// Open (or create) the database file at `path` and migrate it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// A private database that lives as long as the store.
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            subscribers: Subscribers::new(),
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let joined = tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection mutex poisoned".into()))?;
            f(&mut guard)
        })
        .await;
        joined.map_err(|e| {
            warn!(error = %e, "sqlite task did not finish");
            StoreError::Unavailable(format!("blocking task failed: {e}"))
        })?
    }
}

fn access_str(level: AccessLevel) -> &'static str {
    match level {
        AccessLevel::Public => "public",
        AccessLevel::Private => "private",
    }
}

fn load(conn: &Connection, project: &str) -> Result<Option<DesignDocument>> {
    let text: Option<String> = conn
        .query_row(
            "SELECT document FROM designs WHERE project_id = ?1",
            params![project],
            |row| row.get(0),
        )
        .optional()?;
    text.map(|t| serde_json::from_str(&t).map_err(StoreError::from))
        .transpose()
}

#[async_trait]
impl DesignStore for SqliteDesignStore {
    async fn init_sync(&self, project: &ProjectId) -> Result<Subscription> {
        let current = self.load_design(project).await?;
        Ok(self.subscribers.subscribe(project, current))
    }

    async fn update_design(&self, project: &ProjectId, patch: &DesignPatch) -> Result<()> {
        let id = project.to_string();
        let patch = patch.clone();

        let updated = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let mut doc = load(&tx, &id)?.ok_or_else(|| StoreError::NotFound(id.clone()))?;
                doc.apply_patch(&patch);

                tx.execute(
                    "UPDATE designs
                     SET name = ?2, access_level = ?3, last_modified = ?4,
                         document = ?5, updated_at = ?6
                     WHERE project_id = ?1",
                    params![
                        id,
                        doc.name,
                        access_str(doc.access_level),
                        doc.last_modified,
                        serde_json::to_string(&doc)?,
                        now_millis(),
                    ],
                )?;
                tx.commit()?;
                Ok(doc)
            })
            .await?;

        debug!(project = %project, last_modified = updated.last_modified, "design updated");
        self.subscribers.notify(project, &updated);
        Ok(())
    }

    async fn create_design(&self, document: &DesignDocument, owner: &UserId) -> Result<ProjectId> {
        let mut doc = document.clone();
        doc.owner_id = Some(owner.clone());
        if doc.last_modified == 0 {
            doc.last_modified = now_millis();
        }
        let owner = owner.to_string();

        self.with_conn(move |conn| {
            let mut project = ProjectId::generate();
            while load(conn, project.as_str())?.is_some() {
                project = ProjectId::generate();
            }

            let now = now_millis();
            conn.execute(
                "INSERT INTO designs (
                    project_id, owner_id, name, access_level, last_modified,
                    document, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    project.as_str(),
                    owner,
                    doc.name,
                    access_str(doc.access_level),
                    doc.last_modified,
                    serde_json::to_string(&doc)?,
                    now,
                    now,
                ],
            )?;
            Ok(project)
        })
        .await
    }

    async fn delete_design(&self, project: &ProjectId, owner: &UserId) -> Result<()> {
        let id = project.to_string();
        let user = owner.to_string();

        self.with_conn(move |conn| {
            let stored_owner: Option<String> = conn
                .query_row(
                    "SELECT owner_id FROM designs WHERE project_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;

            match stored_owner {
                None => Err(StoreError::NotFound(id)),
                Some(o) if o != user => Err(StoreError::NotOwner { project: id, user }),
                Some(_) => {
                    conn.execute("DELETE FROM designs WHERE project_id = ?1", params![id])?;
                    Ok(())
                }
            }
        })
        .await?;

        debug!(project = %project, "design deleted");
        self.subscribers.close_project(project);
        Ok(())
    }

    async fn get_user_designs(&self, owner: &UserId) -> Result<Vec<DesignSummary>> {
        let owner = owner.to_string();

        let rows: Vec<(String, String)> = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT project_id, document FROM designs
                     WHERE owner_id = ?1
                     ORDER BY last_modified DESC",
                )?;
                let rows = stmt
                    .query_map(params![owner], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(id, text)| {
                let project = ProjectId::parse(id)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                let doc: DesignDocument = serde_json::from_str(&text)?;
                Ok(doc.summary(project))
            })
            .collect()
    }

    async fn stop_sync(&self, subscription: Subscription) {
        self.subscribers.remove(&subscription);
    }

    async fn load_design(&self, project: &ProjectId) -> Result<Option<DesignDocument>> {
        let id = project.to_string();
        self.with_conn(move |conn| load(conn, &id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserId {
        UserId::new("alice")
    }

    #[tokio::test]
    async fn test_create_and_load() {
        let store = SqliteDesignStore::open_memory().unwrap();
        let project = store
            .create_design(&DesignDocument::new("poster", alice()), &alice())
            .await
            .unwrap();

        let loaded = store.load_design(&project).await.unwrap().unwrap();
        assert_eq!(loaded.name, "poster");
        assert_eq!(loaded.owner_id, Some(alice()));
    }

    #[tokio::test]
    async fn test_update_persists_and_notifies() {
        let store = SqliteDesignStore::open_memory().unwrap();
        let project = store
            .create_design(&DesignDocument::new("poster", alice()), &alice())
            .await
            .unwrap();
        let mut sub = store.init_sync(&project).await.unwrap();
        sub.next().await.unwrap();

        let mut edited = DesignDocument::new("renamed", UserId::new("bob"));
        edited.last_modified = 1234;
        edited.access_level = AccessLevel::Public;
        store
            .update_design(&project, &DesignPatch::from(&edited))
            .await
            .unwrap();

        let seen = sub.next().await.unwrap();
        assert_eq!(seen.name, "renamed");
        assert_eq!(seen.owner_id, Some(alice()));

        let loaded = store.load_design(&project).await.unwrap().unwrap();
        assert_eq!(loaded.last_modified, 1234);
        assert_eq!(loaded.access_level, AccessLevel::Public);
    }

    #[tokio::test]
    async fn test_delete_checks_owner() {
        let store = SqliteDesignStore::open_memory().unwrap();
        let project = store
            .create_design(&DesignDocument::new("poster", alice()), &alice())
            .await
            .unwrap();

        assert!(matches!(
            store.delete_design(&project, &UserId::new("bob")).await,
            Err(StoreError::NotOwner { .. })
        ));
        store.delete_design(&project, &alice()).await.unwrap();
        assert!(matches!(
            store.delete_design(&project, &alice()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_user_designs_ordered() {
        let store = SqliteDesignStore::open_memory().unwrap();
        for (name, ts) in [("a", 10), ("b", 30), ("c", 20)] {
            let mut doc = DesignDocument::new(name, alice());
            doc.last_modified = ts;
            store.create_design(&doc, &alice()).await.unwrap();
        }

        let names: Vec<String> = store
            .get_user_designs(&alice())
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["b", "c", "a"]);
        assert!(store.get_user_designs(&UserId::new("bob")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_file_keeps_designs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("designs.db");

        let project = {
            let store = SqliteDesignStore::open(&path).unwrap();
            store
                .create_design(&DesignDocument::new("kept", alice()), &alice())
                .await
                .unwrap()
        };

        let store = SqliteDesignStore::open(&path).unwrap();
        let loaded = store.load_design(&project).await.unwrap().unwrap();
        assert_eq!(loaded.name, "kept");
    }
}
