//! Exercises the fence, filter, enrichment, and gateway submission stages
//! together through a real `RunOrchestrator`, backed by an actual local
//! mail archive on disk rather than unit-level test doubles.

use std::sync::Arc;

use collector_core::entity::{EntityExtractor, ExtractorConfig, HeuristicExtractor};
use collector_core::fence::FenceStore;
use collector_core::filter::{DefaultAction, FilterBuilder};
use collector_core::gateway::GatewayClient;
use collector_core::orchestrator::{lock::RunLockRegistry, CandidateItem, EnrichmentPipeline, ModuleEnables};
use collector_core::sources::LocalMailSource;
use collector_core::types::{CanonicalDocument, CollectorId, EnrichedDocument, RunConfig, RunMode, SortOrder};
use collector_core::{CollectorError, RunOrchestrator, Source};

const RECEIPT_NO_ATTACHMENT: &str =
    "From: billing@example.com\r\nTo: me@example.com\r\nSubject: Your receipt\r\nDate: Mon, 1 Jan 2024 10:00:00 +0000\r\nContent-Type: text/plain\r\n\r\nThanks for your order, total $42.\r\n";

const RECEIPT_WITH_ATTACHMENT: &str = "From: billing@example.com\r\n\
To: me@example.com\r\n\
Subject: Invoice from Acme Corp.\r\n\
Date: Tue, 2 Jan 2024 09:00:00 +0000\r\n\
Content-Type: multipart/mixed; boundary=\"BOUNDARY\"\r\n\r\n\
--BOUNDARY\r\n\
Content-Type: text/plain\r\n\r\n\
Invoice attached for 123 Main Street, due 2024-01-15.\r\n\
--BOUNDARY\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"invoice.pdf\"\r\n\r\n\
%PDF-1.4 fake invoice bytes\r\n\
--BOUNDARY--\r\n";

fn run_config(mode: RunMode, order: SortOrder) -> RunConfig {
    RunConfig {
        mode,
        limit: 10,
        order,
        concurrency: 2,
        date_range: None,
        time_window_days: None,
        collector_options: serde_json::Value::Null,
    }
}

async fn write_archive() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::create_dir_all(dir.path().join("Inbox/Receipts")).await.unwrap();
    tokio::fs::write(dir.path().join("Inbox/Receipts/no_attachment.eml"), RECEIPT_NO_ATTACHMENT).await.unwrap();
    tokio::fs::write(dir.path().join("Inbox/Receipts/with_attachment.eml"), RECEIPT_WITH_ATTACHMENT).await.unwrap();
    dir
}

struct EntityOnlyEnrichment {
    extractor: Arc<dyn EntityExtractor>,
}

#[async_trait::async_trait]
impl EnrichmentPipeline for EntityOnlyEnrichment {
    async fn enrich(&self, document: &CanonicalDocument, enabled: ModuleEnables) -> EnrichedDocument {
        let doc_enrichment = if enabled.entities {
            match self.extractor.extract(&document.content).await {
                Ok(entities) => Some(collector_core::types::DocumentEnrichment { entities }),
                Err(_) => None,
            }
        } else {
            None
        };
        EnrichedDocument { base: document.clone(), image_enrichments: Vec::new(), doc_enrichment }
    }
}

fn unreachable_gateway() -> Arc<GatewayClient> {
    Arc::new(GatewayClient::new(
        reqwest::Client::builder().timeout(std::time::Duration::from_millis(200)).build().unwrap(),
        "http://127.0.0.1:1",
        "/ingest",
        "/ingest/file",
        "token",
    ))
}

fn orchestrator(dir: &tempfile::TempDir, fence_root: &std::path::Path, filter_dsl: &str) -> RunOrchestrator {
    let filter = FilterBuilder::new()
        .with_inline(filter_dsl)
        .unwrap()
        .default_action(DefaultAction::Exclude)
        .build();

    RunOrchestrator::new(
        CollectorId::new("email_local"),
        FenceStore::new(fence_root.to_path_buf()),
        RunLockRegistry::new(),
        Arc::new(LocalMailSource::new(dir.path())),
        filter,
        Arc::new(EntityOnlyEnrichment { extractor: Arc::new(HeuristicExtractor::new(ExtractorConfig::default())) }),
        unreachable_gateway(),
        ModuleEnables { ocr: false, caption: false, entities: true },
    )
}

/// Scenario 3 from §8: a receipt without an attachment is skipped by
/// `folder_prefix("Inbox") and has_attachment`; one with an attachment matches.
#[tokio::test]
async fn filter_rejects_messages_without_attachment() {
    let dir = write_archive().await;
    let fence_root = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(&dir, fence_root.path(), "folder_prefix(\"Inbox\") and has_attachment");

    let response = orchestrator.run(run_config(RunMode::Real, SortOrder::Desc)).await.unwrap();

    assert_eq!(response.stats.scanned, 2);
    assert_eq!(response.stats.matched, 1);
    assert_eq!(response.stats.skipped, 1);
}

/// The one matching item can't reach the (unreachable) gateway, so the run
/// finishes `partial` with a recorded item error rather than panicking or
/// silently dropping the failure.
#[tokio::test]
async fn unreachable_gateway_yields_partial_status_with_item_error() {
    let dir = write_archive().await;
    let fence_root = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(&dir, fence_root.path(), "folder_prefix(\"Inbox\") and has_attachment");

    let response = orchestrator.run(run_config(RunMode::Real, SortOrder::Desc)).await.unwrap();

    assert_eq!(response.status, "partial");
    assert_eq!(response.stats.submitted, 0);
    assert_eq!(response.errors.len(), 1);
}

/// Fence containment (§8): once a run's accepted items fail to submit, the
/// fence is untouched (only successful completions widen it), so a second
/// run against the same state sees the same candidates again rather than
/// skipping them.
#[tokio::test]
async fn failed_submission_does_not_advance_the_fence() {
    let dir = write_archive().await;
    let fence_root = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(&dir, fence_root.path(), "folder_prefix(\"Inbox\") and has_attachment");

    let first = orchestrator.run(run_config(RunMode::Real, SortOrder::Desc)).await.unwrap();
    let second = orchestrator.run(run_config(RunMode::Real, SortOrder::Desc)).await.unwrap();

    assert_eq!(first.stats.matched, 1);
    assert_eq!(second.stats.matched, 1, "fence must not widen on a failed submission");
}

struct EmptySource;

#[async_trait::async_trait]
impl Source for EmptySource {
    async fn enumerate(&self, _config: &RunConfig) -> Result<Vec<CandidateItem>, CollectorError> {
        Ok(Vec::new())
    }
}

/// Concurrency clamping invariant from §8: an out-of-range value is
/// clamped and surfaces a warning rather than being rejected outright.
#[tokio::test]
async fn concurrency_out_of_range_is_clamped_with_a_warning() {
    let fence_root = tempfile::tempdir().unwrap();
    let orchestrator = RunOrchestrator::new(
        CollectorId::new("email_local"),
        FenceStore::new(fence_root.path().to_path_buf()),
        RunLockRegistry::new(),
        Arc::new(EmptySource),
        FilterBuilder::new().default_action(DefaultAction::Include).build(),
        Arc::new(EntityOnlyEnrichment { extractor: Arc::new(HeuristicExtractor::default()) }),
        unreachable_gateway(),
        ModuleEnables::default(),
    );

    let mut config = run_config(RunMode::Real, SortOrder::Desc);
    config.concurrency = 100;
    let response = orchestrator.run(config).await.unwrap();

    assert!(response.warnings.iter().any(|w| w.contains("100") && w.contains("clamped")));
}
