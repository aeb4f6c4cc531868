//! Weaves per-image and per-document enrichment outputs into the final
//! canonical payload the Gateway receives (component C8).

use serde_json::{json, Value};

use crate::types::{CanonicalDocument, EnrichedDocument, EntityType};

/// Inserts inline image placeholders into `content` in attachment order, so
/// downstream search can associate a caption with its position in the
/// body. Placeholders take the form `[[image:N]]`.
fn insert_image_placeholders(content: &str, image_count: usize) -> String {
    if image_count == 0 {
        return content.to_string();
    }
    let mut out = String::with_capacity(content.len() + image_count * 16);
    out.push_str(content);
    out.push_str("\n\n");
    for i in 0..image_count {
        out.push_str(&format!("[[image:{i}]]\n"));
    }
    out
}

fn entities_by_type(doc: &EnrichedDocument) -> Value {
    let mut people = Vec::new();
    let mut organizations = Vec::new();
    let mut places = Vec::new();
    let mut dates = Vec::new();
    let mut times = Vec::new();
    let mut addresses = Vec::new();

    if let Some(enrichment) = &doc.doc_enrichment {
        for span in &enrichment.entities {
            let bucket = match span.entity_type {
                EntityType::Person => &mut people,
                EntityType::Organization => &mut organizations,
                EntityType::Place => &mut places,
                EntityType::Date => &mut dates,
                EntityType::Time => &mut times,
                EntityType::Address => &mut addresses,
            };
            bucket.push(json!({
                "text": span.text,
                "start": span.start,
                "end": span.end,
                "confidence": span.confidence,
            }));
        }
    }

    json!({
        "version": 1,
        "people": people,
        "organizations": organizations,
        "places": places,
        "dates": dates,
        "times": times,
        "addresses": addresses,
    })
}

/// Merges `EnrichedDocument` into the final `CanonicalDocument` ready for
/// submission: inline placeholders, grouped `enrichment.entities`, and
/// `metadata.imageCaptions`. Per-item "additional metadata" already present
/// on `base.metadata` is preserved verbatim.
pub fn merge(doc: EnrichedDocument) -> CanonicalDocument {
    let EnrichedDocument { mut base, image_enrichments, .. } = doc.clone();

    base.content = insert_image_placeholders(&base.content, base.images.len());
    base.metadata.insert("enrichment.entities".to_string(), entities_by_type(&doc));

    let captions: Vec<Value> = image_enrichments
        .iter()
        .filter_map(|enrichment| {
            enrichment.caption.as_ref().map(|caption| {
                json!({ "hash": enrichment.hash, "caption": caption })
            })
        })
        .collect();
    if !captions.is_empty() {
        base.metadata.insert("metadata.imageCaptions".to_string(), Value::Array(captions));
    }

    base
}
