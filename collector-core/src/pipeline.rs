//! Wires the OCR, Caption, and Entity Extraction components (C4-C7) into
//! one `orchestrator::EnrichmentPipeline` implementation. Each stage is
//! optional: a collector that hasn't been given a backend for a module
//! simply skips that module's output, the same way an unconfigured
//! caption backend already does (`caption::UnimplementedBackend`).

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::caption::{self, CaptionBackend};
use crate::entity::EntityExtractor;
use crate::image::{self, Destination};
use crate::ocr::{OcrProvider, OcrRequest};
use crate::orchestrator::ModuleEnables;
use crate::types::{CanonicalDocument, DocumentEnrichment, EnrichedDocument, ImageEnrichment};

pub struct EnrichmentPipelineImpl {
    ocr: Option<Arc<dyn OcrProvider>>,
    caption: Option<Arc<dyn CaptionBackend>>,
    entities: Option<Arc<dyn EntityExtractor>>,
    image_destination: Destination,
}

impl EnrichmentPipelineImpl {
    pub fn new(
        ocr: Option<Arc<dyn OcrProvider>>,
        caption: Option<Arc<dyn CaptionBackend>>,
        entities: Option<Arc<dyn EntityExtractor>>,
        image_destination: Destination,
    ) -> Self {
        Self { ocr, caption, entities, image_destination }
    }

    async fn enrich_image(&self, bytes: &[u8], mime: &str, hash: String, enabled: ModuleEnables) -> ImageEnrichment {
        let cancel = CancellationToken::new();
        let processed = match image::prepare(bytes.to_vec(), self.image_destination, cancel).await {
            Ok(processed) => processed,
            Err(err) => {
                warn!(error = %err, "image preprocessing failed, skipping enrichment for this attachment");
                return ImageEnrichment { hash, ocr_text: None, ocr_boxes: Vec::new(), caption: None };
            }
        };

        let mut ocr_text = None;
        let mut ocr_boxes = Vec::new();
        if enabled.ocr {
            if let Some(provider) = &self.ocr {
                match provider.recognize(&OcrRequest::new(processed.bytes.clone())).await {
                    Ok(output) => {
                        ocr_text = Some(output.ocr_text);
                        ocr_boxes = output.ocr_boxes;
                    }
                    Err(err) => warn!(error = %err, "ocr recognition failed"),
                }
            }
        }

        let mut caption_text = None;
        if enabled.caption {
            if let Some(backend) = &self.caption {
                match backend.caption(&processed.bytes, &processed.mime, ocr_text.as_deref()).await {
                    Ok(text) => caption_text = Some(caption::truncate_caption(&text)),
                    Err(err) => warn!(error = %err, "captioning failed"),
                }
            }
        }

        ImageEnrichment { hash, ocr_text, ocr_boxes, caption: caption_text }
    }
}

#[async_trait]
impl crate::orchestrator::EnrichmentPipeline for EnrichmentPipelineImpl {
    async fn enrich(&self, document: &CanonicalDocument, enabled: ModuleEnables) -> EnrichedDocument {
        let mut image_enrichments = Vec::with_capacity(document.images.len());
        if enabled.ocr || enabled.caption {
            for image in &document.images {
                let Some(bytes) = &image.bytes_ref else { continue };
                image_enrichments.push(self.enrich_image(bytes, &image.mime, image.hash.clone(), enabled).await);
            }
        }

        let doc_enrichment = if enabled.entities {
            match &self.entities {
                Some(extractor) => match extractor.extract(&document.content).await {
                    Ok(entities) => Some(DocumentEnrichment { entities }),
                    Err(err) => {
                        warn!(error = %err, "entity extraction failed");
                        None
                    }
                },
                None => None,
            }
        } else {
            None
        };

        EnrichedDocument { base: document.clone(), image_enrichments, doc_enrichment }
    }
}
