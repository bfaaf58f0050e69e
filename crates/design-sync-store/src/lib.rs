//! # Design Sync Store
//!
//! The durable design store, abstracted behind the [`DesignStore`] trait so
//! the sync layer never depends on a particular backend.
//!
//! ## Key Types
//!
//! - [`DesignStore`] - Async trait mirroring the remote document service
//! - [`Subscription`] - Live feed of a project's durable copy
//! - [`MemoryDesignStore`] - In-memory backend with fault injection, for tests
//! - [`SqliteDesignStore`] - Local SQLite backend
//!
//! ## Usage
//!
//! ```rust,no_run
//! use design_sync_core::{DesignDocument, UserId};
//! use design_sync_store::{DesignStore, SqliteDesignStore};
//!
//! async fn example() {
//!     let store = SqliteDesignStore::open("designs.db").unwrap();
//!     let owner = UserId::new("alice");
//!
//!     let project = store
//!         .create_design(&DesignDocument::new("poster", owner.clone()), &owner)
//!         .await
//!         .unwrap();
//!
//!     let mut sub = store.init_sync(&project).await.unwrap();
//!     let current = sub.next().await;
//!     store.stop_sync(sub).await;
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Whole-document writes**: `update_design` takes a patch but the sync
//!   layer always sends every field; there is no field-level merge.
//! - **Ownership**: only the owner may delete; updates never change the owner.
//! - **Own-write echo**: subscribers see every write, including their own.
//!   Consumers filter by `last_modified`.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod subscription;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryDesignStore;
pub use sqlite::SqliteDesignStore;
pub use subscription::{Subscribers, Subscription};
pub use traits::DesignStore;
