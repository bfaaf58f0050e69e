//! Design documents: the whole-document snapshots clients exchange.
//!
//! The sync layer treats layer contents and adjustments as opaque JSON. Only
//! `last_modified`, `owner_id` and `access_level` carry meaning here.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{ProjectId, UserId};

/// Who may open a design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// Anyone holding the share link.
    Public,
    /// Only the owner.
    #[default]
    Private,
}

/// Canvas dimensions in design units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl Default for CanvasSize {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1080,
        }
    }
}

/// One page of a design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub name: String,
    /// Layer objects, owned by the editor.
    #[serde(default)]
    pub layers: Vec<Value>,
}

impl Page {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            layers: Vec::new(),
        }
    }
}

/// A full snapshot of a design's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub active_page_id: Option<String>,
    #[serde(default)]
    pub canvas_size: CanvasSize,
    /// Image adjustments, owned by the editor.
    #[serde(default)]
    pub adjustments: Map<String, Value>,
    /// Unix milliseconds of the last local edit that produced this snapshot.
    #[serde(default)]
    pub last_modified: i64,
    #[serde(default)]
    pub owner_id: Option<UserId>,
    #[serde(default)]
    pub access_level: AccessLevel,
}

impl DesignDocument {
    /// An empty single-page design owned by `owner`.
    pub fn new(name: impl Into<String>, owner: UserId) -> Self {
        let page = Page::new("page-1", "Page 1");
        Self {
            name: name.into(),
            active_page_id: Some(page.id.clone()),
            pages: vec![page],
            canvas_size: CanvasSize::default(),
            adjustments: Map::new(),
            last_modified: 0,
            owner_id: Some(owner),
            access_level: AccessLevel::Private,
        }
    }

    /// Whether `user` may view and apply this document.
    ///
    /// Public documents are open to everyone; private documents only to a
    /// matching owner. A private document without an owner is open to nobody.
    pub fn grants_access_to(&self, user: Option<&UserId>) -> bool {
        match self.access_level {
            AccessLevel::Public => true,
            AccessLevel::Private => match (&self.owner_id, user) {
                (Some(owner), Some(user)) => owner == user,
                _ => false,
            },
        }
    }

    /// Whether this snapshot is strictly newer than `other`.
    pub fn is_newer_than(&self, other: &DesignDocument) -> bool {
        self.last_modified > other.last_modified
    }

    /// Apply a partial update in place. Ownership never changes.
    pub fn apply_patch(&mut self, patch: &DesignPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(pages) = &patch.pages {
            self.pages = pages.clone();
        }
        if let Some(active) = &patch.active_page_id {
            self.active_page_id = active.clone();
        }
        if let Some(size) = patch.canvas_size {
            self.canvas_size = size;
        }
        if let Some(adjustments) = &patch.adjustments {
            self.adjustments = adjustments.clone();
        }
        if let Some(ts) = patch.last_modified {
            self.last_modified = ts;
        }
        if let Some(level) = patch.access_level {
            self.access_level = level;
        }
    }

    /// Summarize for design listings.
    pub fn summary(&self, project_id: ProjectId) -> DesignSummary {
        DesignSummary {
            project_id,
            name: self.name.clone(),
            owner_id: self.owner_id.clone(),
            access_level: self.access_level,
            last_modified: self.last_modified,
            page_count: self.pages.len(),
        }
    }
}

/// A partial document for `update_design`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<Page>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_page_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_size: Option<CanvasSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustments: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_level: Option<AccessLevel>,
}

impl From<&DesignDocument> for DesignPatch {
    /// Every field except ownership.
    fn from(doc: &DesignDocument) -> Self {
        Self {
            name: Some(doc.name.clone()),
            pages: Some(doc.pages.clone()),
            active_page_id: Some(doc.active_page_id.clone()),
            canvas_size: Some(doc.canvas_size),
            adjustments: Some(doc.adjustments.clone()),
            last_modified: Some(doc.last_modified),
            access_level: Some(doc.access_level),
        }
    }
}

/// Listing entry for a user's designs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignSummary {
    pub project_id: ProjectId,
    pub name: String,
    pub owner_id: Option<UserId>,
    pub access_level: AccessLevel,
    pub last_modified: i64,
    pub page_count: usize,
}

/// Wall-clock milliseconds since the Unix epoch, the unit of
/// `last_modified`. A clock before the epoch reads as zero.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
