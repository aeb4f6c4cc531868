//! State machine per collector run: concurrency, cancellation, stats
//! (component C13). This is where the retry-loop, filter-evaluator, and
//! enrichment-subset rules specified across C1-C12 are actually wired
//! together end to end.

pub mod lock;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::debug_sink::{DebugSinkHandle, RejectedItemRecord};
use crate::error::CollectorError;
use crate::fence::{FenceRange, FenceStore};
use crate::filter::{CompiledExpression, MessageContext};
use crate::gateway::GatewayClient;
use crate::types::{
    CanonicalDocument, CollectorId, EnrichedDocument, ItemError, RunConfig, RunId, RunResponse, RunState,
    RunStatus, Stats,
};

use self::lock::RunLockRegistry;

const DEFAULT_BATCH_SIZE: usize = 16;

/// Which enrichment stages this collector runs. Configured once per
/// collector (not per run) — mirrors the `ModuleEnables` ambient config.
#[derive(Clone, Copy, Debug, Default)]
pub struct ModuleEnables {
    pub ocr: bool,
    pub caption: bool,
    pub entities: bool,
}

/// A pre-parsed item from a source, ready for fence/filter evaluation and
/// enrichment. `document` carries `content_timestamp` and all fields a
/// `CanonicalDocument` needs; `context` is the parallel view the Filter
/// Engine evaluates against.
#[derive(Clone, Debug)]
pub struct CandidateItem {
    pub context: MessageContext,
    pub document: CanonicalDocument,
}

#[async_trait]
pub trait Source: Send + Sync {
    /// Enumerates candidates in `config.order`, already scoped to
    /// `config.date_range`/`time_window_days` where the source can do so
    /// cheaply. The orchestrator still applies the fence skip predicate and
    /// the filter evaluator itself.
    async fn enumerate(&self, config: &RunConfig) -> Result<Vec<CandidateItem>, CollectorError>;
}

#[async_trait]
pub trait EnrichmentPipeline: Send + Sync {
    async fn enrich(&self, document: &CanonicalDocument, enabled: ModuleEnables) -> EnrichedDocument;
}

pub struct RunOrchestrator {
    collector_id: CollectorId,
    fence_store: FenceStore,
    lock_registry: Arc<RunLockRegistry>,
    source: Arc<dyn Source>,
    filter: CompiledExpression,
    enrichment: Arc<dyn EnrichmentPipeline>,
    gateway: Arc<GatewayClient>,
    modules: ModuleEnables,
    batch_size: usize,
    state: Arc<RwLock<RunState>>,
    debug_sink: Option<DebugSinkHandle>,
}

impl RunOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        collector_id: CollectorId,
        fence_store: FenceStore,
        lock_registry: Arc<RunLockRegistry>,
        source: Arc<dyn Source>,
        filter: CompiledExpression,
        enrichment: Arc<dyn EnrichmentPipeline>,
        gateway: Arc<GatewayClient>,
        modules: ModuleEnables,
    ) -> Self {
        Self {
            collector_id,
            fence_store,
            lock_registry,
            source,
            filter,
            enrichment,
            gateway,
            modules,
            batch_size: DEFAULT_BATCH_SIZE,
            state: Arc::new(RwLock::new(RunState::default())),
            debug_sink: None,
        }
    }

    /// Rejected/errored items are appended to this sink as they're skipped
    /// or fail submission (§5, §6).
    pub fn with_debug_sink(mut self, debug_sink: DebugSinkHandle) -> Self {
        self.debug_sink = Some(debug_sink);
        self
    }

    pub async fn state(&self) -> RunState {
        self.state.read().await.clone()
    }

    pub async fn run(&self, config: RunConfig) -> Result<RunResponse, CollectorError> {
        self.run_with_cancellation(config, CancellationToken::new()).await
    }

    #[instrument(skip(self, config, cancel), fields(collector = %self.collector_id))]
    pub async fn run_with_cancellation(
        &self,
        config: RunConfig,
        cancel: CancellationToken,
    ) -> Result<RunResponse, CollectorError> {
        let guard = self
            .lock_registry
            .acquire(&self.collector_id)
            .map_err(|_| CollectorError::StateConflict(format!("run already in progress for {}", self.collector_id)))?;

        let validated = config.validate();
        let mut warnings = validated.warnings;
        let config = validated.config;

        let run_id = RunId::new();
        let started_at = Utc::now();
        {
            let mut state = self.state.write().await;
            state.status = RunStatus::Running;
            state.started_at = Some(started_at);
            state.finished_at = None;
            state.stats = Stats::default();
            state.warnings = warnings.clone();
            state.errors = Vec::new();
        }

        if config.date_range.as_ref().is_some_and(|r| r.is_empty()) {
            warnings.push("date_range reduces to an empty interval".to_string());
            return self.finish(guard, run_id, started_at, RunStatus::Completed, Stats::default(), warnings, Vec::new(), None).await;
        }

        let fences = self.fence_store.load(&self.collector_id).await?;
        let candidates = self.source.enumerate(&config).await?;

        let mut accepted: Vec<CandidateItem> = Vec::new();
        let mut scanned: u64 = 0;
        let mut skipped: u64 = 0;
        for candidate in candidates {
            scanned += 1;
            let fenced = fences.contains(candidate.document.content_timestamp);
            let matches = self.filter.evaluate(&candidate.context);
            if fenced || !matches {
                skipped += 1;
                if let Some(sink) = &self.debug_sink {
                    let reason = if fenced { "already fenced" } else { "filtered out" };
                    sink.record(RejectedItemRecord {
                        collector: self.collector_id.to_string(),
                        item_id: Some(candidate.document.external_id.clone()),
                        reason: reason.to_string(),
                        recorded_at: Utc::now(),
                    });
                }
                continue;
            }
            accepted.push(candidate);
            if accepted.len() as u32 >= config.limit {
                break;
            }
        }
        let matched = accepted.len() as u64;

        if accepted.is_empty() {
            let mut stats = Stats::default();
            stats.scanned = scanned;
            stats.skipped = skipped;
            return self.finish(guard, run_id, started_at, RunStatus::Completed, stats, warnings, Vec::new(), None).await;
        }

        let (tx, rx) = mpsc::channel::<CanonicalDocument>(2 * config.concurrency as usize);
        let semaphore = Arc::new(Semaphore::new(config.concurrency as usize));
        let enrichment = self.enrichment.clone();
        let modules = self.modules;

        let mut producer_handles = Vec::with_capacity(accepted.len());
        for candidate in accepted {
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            let enrichment = enrichment.clone();
            let cancel = cancel.clone();
            producer_handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                if cancel.is_cancelled() {
                    return;
                }
                let enriched = enrichment.enrich(&candidate.document, modules).await;
                let merged = crate::enrich::merge(enriched);
                let _ = tx.send(merged).await;
            }));
        }
        drop(tx);

        let batch_size = self.batch_size;
        let gateway = self.gateway.clone();
        let collector_id = self.collector_id.to_string();
        let debug_sink = self.debug_sink.clone();
        let submitter = tokio::spawn(submit_loop(rx, gateway, batch_size, collector_id, debug_sink));

        for handle in producer_handles {
            let _ = handle.await;
        }
        let (submitted, batches, errors, earliest, latest) = submitter.await.unwrap_or_default();

        let mut stats = Stats::default();
        stats.scanned = scanned;
        stats.matched = matched;
        stats.submitted = submitted;
        stats.skipped = skipped;
        stats.batches = batches;
        stats.errors = errors.len() as u64;

        let status = if submitted == 0 && !errors.is_empty() {
            RunStatus::Failed
        } else if !errors.is_empty() {
            RunStatus::Partial
        } else if cancel.is_cancelled() {
            RunStatus::Partial
        } else {
            RunStatus::Completed
        };

        let fence_update = match (earliest, latest) {
            (Some(e), Some(l)) => Some(FenceRange::new(e, l)),
            _ => None,
        };

        self.finish(guard, run_id, started_at, status, stats, warnings, errors, fence_update).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        guard: lock::RunLockGuard,
        run_id: RunId,
        started_at: chrono::DateTime<Utc>,
        status: RunStatus,
        stats: Stats,
        warnings: Vec<String>,
        errors: Vec<ItemError>,
        fence_update: Option<FenceRange>,
    ) -> Result<RunResponse, CollectorError> {
        if let Some(range) = fence_update {
            let mut fences = self.fence_store.load(&self.collector_id).await?;
            fences.add(range);
            self.fence_store.store(&self.collector_id, &fences).await?;
        }

        let finished_at = Utc::now();
        {
            let mut state = self.state.write().await;
            state.status = status;
            state.finished_at = Some(finished_at);
            state.stats = stats.clone();
            state.warnings = warnings.clone();
            state.errors = errors.clone();
        }
        info!(status = ?status, stats = ?stats, "run finished");
        drop(guard);

        Ok(RunResponse {
            collector: self.collector_id.to_string(),
            run_id,
            started_at,
            finished_at,
            status: status.as_response_str().to_string(),
            stats,
            warnings,
            errors,
        })
    }
}

type SubmitOutcome = (u64, u64, Vec<ItemError>, Option<chrono::DateTime<Utc>>, Option<chrono::DateTime<Utc>>);

/// Drains the batch queue in batches of `batch_size`, submitting via the
/// Gateway client with fallback to per-item, and tracks the min/max
/// `content_timestamp` across *successfully* submitted items only (§5: the
/// fence reflects successful completions, independent of processing order).
async fn submit_loop(
    mut rx: mpsc::Receiver<CanonicalDocument>,
    gateway: Arc<GatewayClient>,
    batch_size: usize,
    collector_id: String,
    debug_sink: Option<DebugSinkHandle>,
) -> SubmitOutcome {
    let mut submitted = 0u64;
    let mut batches = 0u64;
    let mut errors = Vec::new();
    let mut earliest: Option<chrono::DateTime<Utc>> = None;
    let mut latest: Option<chrono::DateTime<Utc>> = None;

    let mut buffer = Vec::with_capacity(batch_size);
    loop {
        let received = rx.recv_many(&mut buffer, batch_size).await;
        if received == 0 {
            break;
        }
        batches += 1;

        let results = match gateway.submit_batch(&buffer).await {
            Ok(Some(results)) => results,
            Ok(None) => gateway.submit_all_per_item(&buffer).await,
            Err(err) => {
                for doc in &buffer {
                    errors.push(ItemError { item_id: Some(doc.external_id.clone()), reason: err.to_string() });
                    if let Some(sink) = &debug_sink {
                        sink.record(RejectedItemRecord {
                            collector: collector_id.clone(),
                            item_id: Some(doc.external_id.clone()),
                            reason: err.to_string(),
                            recorded_at: Utc::now(),
                        });
                    }
                }
                buffer.clear();
                continue;
            }
        };

        for result in results {
            let Some(doc) = buffer.get(result.index) else { continue };
            if result.is_success() {
                submitted += 1;
                let ts = doc.content_timestamp;
                earliest = Some(earliest.map_or(ts, |e| e.min(ts)));
                latest = Some(latest.map_or(ts, |l| l.max(ts)));
            } else {
                warn!(item_id = %doc.external_id, status = result.status_code, "item submission failed");
                let reason = result.error.clone().unwrap_or_else(|| format!("gateway returned {}", result.status_code));
                errors.push(ItemError { item_id: Some(doc.external_id.clone()), reason: reason.clone() });
                if let Some(sink) = &debug_sink {
                    sink.record(RejectedItemRecord {
                        collector: collector_id.clone(),
                        item_id: Some(doc.external_id.clone()),
                        reason,
                        recorded_at: Utc::now(),
                    });
                }
            }
        }
        buffer.clear();
    }

    (submitted, batches, errors, earliest, latest)
}
