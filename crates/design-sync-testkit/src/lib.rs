//! # Design Sync Testkit
//!
//! Testing utilities for Design Sync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Exact `chunk-part` frames for known inputs, for
//!   checking wire compatibility with other clients
//! - **Generators**: Proptest strategies for documents and envelopes
//! - **Fixtures**: Sample documents and a shared in-memory network, store
//!   and side-channel for multi-client tests
//!
//! ## Golden Vectors
//!
//! ```rust
//! use design_sync_testkit::vectors::verify_all_vectors;
//!
//! for (name, ok, detail) in verify_all_vectors() {
//!     assert!(ok, "{name}: {detail}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use design_sync_testkit::generators::design_document;
//!
//! proptest! {
//!     #[test]
//!     fn survives_the_codec(doc in design_document()) {
//!         // ...
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use design_sync_testkit::fixtures::{sample_document, TestFabric};
//! use design_sync_core::{ProjectId, UserId};
//!
//! let fabric = TestFabric::new();
//! let project = ProjectId::parse("p-abc123").unwrap();
//! fabric.seed_project(&project, sample_document(&UserId::new("alice")));
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{large_document, public_document, sample_document, users, TestFabric};
pub use generators::{design_document, sync_envelope};
pub use vectors::{all_vectors, frames_for_vector, verify_all_vectors, ChunkVector};
