use axum::extract::{Path, State};
use axum::Json;
use collector_core::types::{CollectorId, RunConfig, RunResponse, RunState};

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

pub async fn run_collector(
    State(state): State<AppState>,
    Path(collector_action): Path<String>,
    Json(config): Json<RunConfig>,
) -> AppResult<Json<RunResponse>> {
    let collector = collector_action
        .strip_suffix(":run")
        .ok_or_else(|| AppError::bad_request(format!("expected <collector>:run, got {collector_action}")))?;

    let collector_id = CollectorId::new(collector);
    let orchestrator = state
        .registry
        .get(&collector_id)
        .await
        .ok_or_else(|| AppError::not_found(format!("unknown collector: {collector}")))?;

    let response = orchestrator.run(config).await?;
    Ok(Json(response))
}

pub async fn get_collector_state(
    State(state): State<AppState>,
    Path(collector): Path<String>,
) -> AppResult<Json<RunState>> {
    let collector_id = CollectorId::new(collector.clone());
    let orchestrator = state
        .registry
        .get(&collector_id)
        .await
        .ok_or_else(|| AppError::not_found(format!("unknown collector: {collector}")))?;

    Ok(Json(orchestrator.state().await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CollectorRegistry;
    use async_trait::async_trait;
    use collector_core::filter::{DefaultAction, FilterBuilder};
    use collector_core::gateway::GatewayClient;
    use collector_core::orchestrator::{lock::RunLockRegistry, CandidateItem, EnrichmentPipeline, ModuleEnables};
    use collector_core::types::{CanonicalDocument, EnrichedDocument, RunMode, SortOrder};
    use collector_core::{CollectorError, RunOrchestrator, Source};
    use std::sync::Arc;

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

    async fn state_with_one_collector() -> AppState {
        let registry = CollectorRegistry::new();
        let id = CollectorId::new("email_local");
        let orchestrator = Arc::new(RunOrchestrator::new(
            id.clone(),
            collector_core::fence::FenceStore::new(tempfile::tempdir().unwrap().keep()),
            RunLockRegistry::new(),
            Arc::new(EmptySource),
            FilterBuilder::new().default_action(DefaultAction::Include).build(),
            Arc::new(NoopEnrichment),
            Arc::new(GatewayClient::new(reqwest::Client::new(), "http://localhost", "/ingest", "/ingest/file", "token")),
            ModuleEnables::default(),
        ));
        registry.register(id, orchestrator).await;
        AppState { registry }
    }

    #[tokio::test]
    async fn run_unknown_collector_returns_404() {
        let state = state_with_one_collector().await;
        let config = RunConfig {
            mode: RunMode::Simulate,
            limit: 10,
            order: SortOrder::Desc,
            concurrency: 1,
            date_range: None,
            time_window_days: None,
            collector_options: serde_json::Value::Null,
        };
        let err = run_collector(State(state), Path("does_not_exist:run".to_string()), Json(config))
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn run_without_run_suffix_is_a_bad_request() {
        let state = state_with_one_collector().await;
        let config = RunConfig {
            mode: RunMode::Simulate,
            limit: 10,
            order: SortOrder::Desc,
            concurrency: 1,
            date_range: None,
            time_window_days: None,
            collector_options: serde_json::Value::Null,
        };
        let err = run_collector(State(state), Path("email_local".to_string()), Json(config)).await.unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn run_known_collector_completes() {
        let state = state_with_one_collector().await;
        let config = RunConfig {
            mode: RunMode::Simulate,
            limit: 10,
            order: SortOrder::Desc,
            concurrency: 1,
            date_range: None,
            time_window_days: None,
            collector_options: serde_json::Value::Null,
        };
        let response = run_collector(State(state), Path("email_local:run".to_string()), Json(config)).await.unwrap();
        assert_eq!(response.0.status, "ok");
    }

    #[tokio::test]
    async fn state_endpoint_never_triggers_a_run() {
        let state = state_with_one_collector().await;
        let response = get_collector_state(State(state), Path("email_local".to_string())).await.unwrap();
        assert_eq!(response.0.status, collector_core::types::RunStatus::Idle);
    }
}
