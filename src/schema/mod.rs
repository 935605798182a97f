//! Built-in JSON schema converter.
//!
//! Serializes each frame into one pretty-printed JSON document. The full
//! schema ([`PayloadType::Full`]) writes every field of the frame tree; the
//! minimal schema ([`PayloadType::Minimal`]) keeps identifiers, geometry and
//! labels. Every document gets a fresh UUID v4 `messageid` and a wall-clock
//! `timestamp` in seconds.

mod document;

pub use document::DS_VERSION;

use crate::converter::{ContextHandle, MessageConverter};
use crate::error::Result;
use crate::metadata::FrameMeta;
use crate::payload::{Payload, PayloadType};
use document::FrameDocument;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Serialize one frame with the given schema.
///
/// Returns `Ok(None)` for payload types without a built-in schema.
pub fn render_frame(frame: &FrameMeta, payload_type: PayloadType) -> Result<Option<Vec<u8>>> {
    let full = match payload_type {
        PayloadType::Full => true,
        PayloadType::Minimal => false,
        PayloadType::Reserved | PayloadType::Custom => return Ok(None),
    };

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let messageid = Uuid::new_v4().hyphenated().to_string();

    let document = FrameDocument::new(frame, full, messageid, timestamp);
    Ok(Some(serde_json::to_vec_pretty(&document)?))
}

/// Per-context state of the schema converter.
#[derive(Debug, Clone, Copy)]
struct SchemaContext {
    payload_type: PayloadType,
}

/// The built-in converter.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaConverter;

impl SchemaConverter {
    /// Create the converter.
    pub fn new() -> Self {
        Self
    }
}

impl MessageConverter for SchemaConverter {
    fn name(&self) -> &str {
        "schema"
    }

    fn create_context(&self, payload_type: PayloadType) -> Option<ContextHandle> {
        Some(ContextHandle::from_box(Box::new(SchemaContext { payload_type })))
    }

    fn destroy_context(&self, context: ContextHandle) {
        // SAFETY: Contexts of this converter are always boxed SchemaContexts.
        drop(unsafe { context.into_box::<SchemaContext>() });
    }

    fn generate(&self, context: &ContextHandle, frame: &FrameMeta, _count: u32) -> Option<Box<Payload>> {
        // SAFETY: Contexts of this converter are always boxed SchemaContexts.
        let context = unsafe { context.as_ref::<SchemaContext>() };

        match render_frame(frame, context.payload_type) {
            Ok(Some(bytes)) => Some(Box::new(Payload::new(bytes))),
            Ok(None) => None,
            Err(e) => {
                tracing::error!(
                    frame_num = frame.frame_num,
                    source_id = frame.source_id,
                    "failed to serialize frame: {}",
                    e
                );
                None
            }
        }
    }

    fn release(&self, _context: &ContextHandle, payload: Box<Payload>) {
        drop(payload);
    }
}
