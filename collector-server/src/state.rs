use std::collections::HashMap;
use std::sync::Arc;

use collector_core::types::CollectorId;
use collector_core::RunOrchestrator;
use tokio::sync::RwLock;

/// Maps a configured collector name to its `RunOrchestrator` handle.
/// Built once at startup; lookups are read-mostly so the map itself sits
/// behind an `RwLock` rather than being rebuilt per request.
#[derive(Clone)]
pub struct CollectorRegistry {
    inner: Arc<RwLock<HashMap<CollectorId, Arc<RunOrchestrator>>>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub async fn register(&self, id: CollectorId, orchestrator: Arc<RunOrchestrator>) {
        self.inner.write().await.insert(id, orchestrator);
    }

    pub async fn get(&self, id: &CollectorId) -> Option<Arc<RunOrchestrator>> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        self.inner.read().await.keys().map(|id| id.as_str().to_string()).collect()
    }
}

impl Default for CollectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: CollectorRegistry,
}

#[cfg(test)]
mod tests {
    use super::*;
    use collector_core::filter::{DefaultAction, FilterBuilder};
    use collector_core::orchestrator::{CandidateItem, EnrichmentPipeline, ModuleEnables};
    use collector_core::types::{CanonicalDocument, EnrichedDocument, RunConfig};
    use collector_core::gateway::GatewayClient;
    use collector_core::{CollectorError, Source};
    use async_trait::async_trait;

    struct EmptySource;

    #[async_trait]
    impl Source for EmptySource {
        async fn enumerate(&self, _config: &RunConfig) -> Result<Vec<CandidateItem>, CollectorError> {
            Ok(Vec::new())
        }
    }

    struct NoopEnrichment;

    #[async_trait]
    impl EnrichmentPipeline for NoopEnrichment {
        async fn enrich(&self, document: &CanonicalDocument, _enabled: ModuleEnables) -> EnrichedDocument {
            EnrichedDocument { base: document.clone(), image_enrichments: Vec::new(), doc_enrichment: None }
        }
    }

    #[tokio::test]
    async fn registers_and_looks_up_by_id() {
        let registry = CollectorRegistry::new();
        let id = CollectorId::new("email_local");
        let orchestrator = Arc::new(RunOrchestrator::new(
            id.clone(),
            collector_core::fence::FenceStore::new(tempfile::tempdir().unwrap().keep()),
            collector_core::orchestrator::lock::RunLockRegistry::new(),
            Arc::new(EmptySource),
            FilterBuilder::new().default_action(DefaultAction::Include).build(),
            Arc::new(NoopEnrichment),
            Arc::new(GatewayClient::new(reqwest::Client::new(), "http://localhost", "/ingest", "/ingest/file", "token")),
            ModuleEnables::default(),
        ));

        registry.register(id.clone(), orchestrator).await;
        assert!(registry.get(&id).await.is_some());
        assert!(registry.get(&CollectorId::new("missing")).await.is_none());
    }
}
