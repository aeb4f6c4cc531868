//! Produces typed named-entity spans from text (component C7). Pluggable
//! so a real NLP backend can be dropped in later; the extractor itself is
//! side-effect-free and invoked at most once per document body.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::types::{EntitySpan, EntityType};

#[derive(Error, Debug)]
pub enum EntityError {
    #[error("entity extraction backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Vec<EntitySpan>, EntityError>;
}

/// Minimum confidence a span must meet to be kept; defaults to 0 (§4.6).
#[derive(Clone, Copy, Debug)]
pub struct ExtractorConfig {
    pub min_confidence: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self { min_confidence: 0.0 }
    }
}

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4}|January|February|March|April|May|June|July|August|September|October|November|December)\b").unwrap()
});
static TIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,2}:\d{2}\s?(?:[AaPp][Mm])?\b").unwrap());
static ADDRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+\s+[A-Za-z0-9.\s]+\b(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr)\b").unwrap()
});
static ORG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z][A-Za-z&]*(?:\s+[A-Z][A-Za-z&]*)*\s+(?:Inc|LLC|Ltd|Corp|Corporation|Company|Co)\.?\b").unwrap()
});
static PERSON_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+\s[A-Z][a-z]+\b").unwrap());

/// A regex-pattern extractor grounded on simple, explainable heuristics —
/// the kind of deterministic baseline a real model-backed extractor would
/// slot in behind the same trait.
#[derive(Default)]
pub struct HeuristicExtractor {
    config: ExtractorConfig,
}

impl HeuristicExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    fn matches(pattern: &Regex, text: &str, entity_type: EntityType, confidence: f32) -> Vec<EntitySpan> {
        pattern
            .find_iter(text)
            .map(|m| EntitySpan {
                entity_type: entity_type.clone(),
                text: m.as_str().to_string(),
                start: m.start(),
                end: m.end(),
                confidence,
            })
            .collect()
    }
}

#[async_trait]
impl EntityExtractor for HeuristicExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<EntitySpan>, EntityError> {
        let mut spans = Vec::new();
        spans.extend(Self::matches(&DATE_PATTERN, text, EntityType::Date, 0.6));
        spans.extend(Self::matches(&TIME_PATTERN, text, EntityType::Time, 0.6));
        spans.extend(Self::matches(&ADDRESS_PATTERN, text, EntityType::Address, 0.5));
        spans.extend(Self::matches(&ORG_PATTERN, text, EntityType::Organization, 0.5));
        spans.extend(Self::matches(&PERSON_PATTERN, text, EntityType::Person, 0.4));
        spans.retain(|span| span.confidence >= self.config.min_confidence);
        Ok(spans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extracts_dates_and_times() {
        let extractor = HeuristicExtractor::default();
        let spans = extractor
            .extract("Meeting on 2024-03-01 at 10:30am with Jane Doe.")
            .await
            .unwrap();
        assert!(spans.iter().any(|s| s.entity_type == EntityType::Date));
        assert!(spans.iter().any(|s| s.entity_type == EntityType::Time));
        assert!(spans.iter().any(|s| s.entity_type == EntityType::Person));
    }

    #[tokio::test]
    async fn min_confidence_filters_low_confidence_spans() {
        let extractor = HeuristicExtractor::new(ExtractorConfig { min_confidence: 0.55 });
        let spans = extractor.extract("Contact John Smith about the order.").await.unwrap();
        assert!(spans.iter().all(|s| s.entity_type != EntityType::Person));
    }

    #[tokio::test]
    async fn extracts_organizations_with_legal_suffix() {
        let extractor = HeuristicExtractor::default();
        let spans = extractor.extract("Invoice from Acme Corp. due Friday.").await.unwrap();
        assert!(spans.iter().any(|s| s.entity_type == EntityType::Organization));
    }
}
