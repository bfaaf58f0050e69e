//! Proptest strategies for design documents, envelopes and raw chunk parts.

use proptest::prelude::*;
use serde_json::{json, Map, Value};

use design_sync_core::{
    AccessLevel, CanvasSize, ChunkPart, DesignDocument, Page, ProjectId, SyncEnvelope, UserId,
};

/// Generate a valid project id.
pub fn project_id() -> impl Strategy<Value = ProjectId> {
    "[a-z0-9][a-z0-9_-]{0,63}".prop_filter_map("valid project id", |s| ProjectId::parse(s).ok())
}

/// Generate a user id.
pub fn user_id() -> impl Strategy<Value = UserId> {
    "[a-z]{1,12}".prop_map(UserId::new)
}

/// Generate an access level.
pub fn access_level() -> impl Strategy<Value = AccessLevel> {
    prop_oneof![Just(AccessLevel::Public), Just(AccessLevel::Private)]
}

/// Generate one editor layer. Text may contain any printable character.
pub fn layer() -> impl Strategy<Value = Value> {
    ("[a-z0-9-]{1,16}", "\\PC{0,40}", -2000i64..2000, -2000i64..2000)
        .prop_map(|(id, text, x, y)| json!({"id": id, "type": "text", "text": text, "x": x, "y": y}))
}

/// Generate a page with up to `max_layers` layers.
pub fn page(max_layers: usize) -> impl Strategy<Value = Page> {
    (
        "page-[a-z0-9]{1,8}",
        "\\PC{0,20}",
        prop::collection::vec(layer(), 0..=max_layers),
    )
        .prop_map(|(id, name, layers)| {
            let mut page = Page::new(id, name);
            page.layers = layers;
            page
        })
}

/// Generate a full design document.
pub fn design_document() -> impl Strategy<Value = DesignDocument> {
    (
        "\\PC{0,30}",
        prop::collection::vec(page(6), 1..4),
        (1u32..8000, 1u32..8000),
        prop::option::of(-4i32..=4),
        0i64..=4_000_000_000_000i64,
        prop::option::of(user_id()),
        access_level(),
    )
        .prop_map(|(name, pages, (width, height), brightness, ts, owner, access)| {
            let mut adjustments = Map::new();
            if let Some(quarters) = brightness {
                // Quarter steps stay exact through JSON text.
                adjustments.insert("brightness".into(), json!(f64::from(quarters) / 4.0));
            }
            DesignDocument {
                name,
                active_page_id: pages.first().map(|p| p.id.clone()),
                pages,
                canvas_size: CanvasSize { width, height },
                adjustments,
                last_modified: ts,
                owner_id: owner,
                access_level: access,
            }
        })
}

/// Generate any sync envelope.
pub fn sync_envelope() -> impl Strategy<Value = SyncEnvelope> {
    prop_oneof![
        Just(SyncEnvelope::RequestState),
        design_document().prop_map(|document| SyncEnvelope::FullState { document }),
        design_document().prop_map(|document| SyncEnvelope::StateUpdate { document }),
    ]
}

/// Generate a possibly malformed chunk part, for fuzzing reassembly.
pub fn chunk_part() -> impl Strategy<Value = ChunkPart> {
    ("[a-f0-9]{1,4}", 0u32..8, 0u32..8, "\\PC{0,8}").prop_map(|(id, index, total, fragment)| {
        ChunkPart {
            transfer_id: id,
            index,
            total,
            fragment,
        }
    })
}
