use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// SHA-256 hex digest of an image's bytes.
pub type ImageHash = String;

/// An image attachment as seen by the enrichment pipeline. The bytes are
/// only held for the duration of enrichment (see `bytes_ref`); only the
/// hash and metadata are ever persisted downstream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub hash: ImageHash,
    pub mime: String,
    pub dims: Option<(u32, u32)>,
    #[serde(skip)]
    pub bytes_ref: Option<std::sync::Arc<Vec<u8>>>,
}

impl ImageAttachment {
    pub fn new(hash: ImageHash, mime: impl Into<String>) -> Self {
        Self {
            hash,
            mime: mime.into(),
            dims: None,
            bytes_ref: None,
        }
    }
}

/// Distinguishes whether `content_timestamp` came from the source's own
/// header/field or was synthesized (e.g. file mtime fallback).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ContentTimestampType {
    SourceDate,
    FileModified,
    Ingested,
}

/// The normalized payload emitted by a collector, independent of source,
/// suitable for the Gateway ingest contract.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CanonicalDocument {
    pub source_type: String,
    pub external_id: String,
    pub title: Option<String>,
    pub canonical_uri: Option<String>,
    pub content: String,
    pub content_mime: String,
    pub content_timestamp: DateTime<Utc>,
    pub content_timestamp_type: ContentTimestampType,
    pub metadata: BTreeMap<String, Value>,
    pub images: Vec<ImageAttachment>,
}

impl CanonicalDocument {
    /// `sha256("<source_type>:<external_id>:<content_hash>")`, the key
    /// the Gateway Submission Client uses for per-item idempotency.
    pub fn content_hash(&self) -> Option<&str> {
        self.metadata.get("content_hash").and_then(Value::as_str)
    }
}

/// A typed named-entity span extracted from document text.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum EntityType {
    Person,
    Organization,
    Place,
    Date,
    Time,
    Address,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntitySpan {
    pub entity_type: EntityType,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
}

/// Per-image enrichment results (OCR + caption), keyed by the attachment's
/// position in `CanonicalDocument::images`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ImageEnrichment {
    pub hash: ImageHash,
    pub ocr_text: Option<String>,
    pub ocr_boxes: Vec<crate::ocr::OcrBox>,
    pub caption: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DocumentEnrichment {
    pub entities: Vec<EntitySpan>,
}

/// `{ base, image_enrichments, doc_enrichment? }` — the document after the
/// enrichment subset configured for the run has completed, prior to the
/// Enrichment Merger weaving it into the final Gateway payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnrichedDocument {
    pub base: CanonicalDocument,
    pub image_enrichments: Vec<ImageEnrichment>,
    pub doc_enrichment: Option<DocumentEnrichment>,
}

/// Gateway reply to a single or batched submission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestSubmission {
    pub submission_id: String,
    pub document_id: Option<String>,
    pub duplicate: bool,
}
