use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::RunId;

pub const MIN_CONCURRENCY: u32 = 1;
pub const MAX_CONCURRENCY: u32 = 12;
pub const MIN_LIMIT: u32 = 1;
pub const MAX_LIMIT: u32 = 10_000;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Simulate,
    Real,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DateRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl DateRange {
    /// `since`/`until` reduce to an empty interval.
    pub fn is_empty(&self) -> bool {
        matches!((self.since, self.until), (Some(since), Some(until)) if since >= until)
    }
}

/// Per-collector run configuration. Immutable for the duration of a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    pub mode: RunMode,
    pub limit: u32,
    #[serde(default = "default_order")]
    pub order: SortOrder,
    pub concurrency: u32,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub time_window_days: Option<u32>,
    #[serde(default)]
    pub collector_options: Value,
}

fn default_order() -> SortOrder {
    SortOrder::Desc
}

/// Result of validating and clamping a `RunConfig`.
pub struct ValidatedRunConfig {
    pub config: RunConfig,
    pub warnings: Vec<String>,
}

impl RunConfig {
    /// Clamp `concurrency` into `[MIN_CONCURRENCY, MAX_CONCURRENCY]` and
    /// `limit` into `[MIN_LIMIT, MAX_LIMIT]`, recording a warning for each
    /// field that was out of range. Mirrors the clamping rule in the
    /// orchestrator algorithm (§4.1 step 1).
    pub fn validate(mut self) -> ValidatedRunConfig {
        let mut warnings = Vec::new();

        let clamped_concurrency = self.concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        if clamped_concurrency != self.concurrency {
            warnings.push(format!(
                "concurrency value {} out of range, clamped to {}",
                self.concurrency, clamped_concurrency
            ));
            self.concurrency = clamped_concurrency;
        }

        let clamped_limit = self.limit.clamp(MIN_LIMIT, MAX_LIMIT);
        if clamped_limit != self.limit {
            warnings.push(format!(
                "limit value {} out of range, clamped to {}",
                self.limit, clamped_limit
            ));
            self.limit = clamped_limit;
        }

        ValidatedRunConfig {
            config: self,
            warnings,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub scanned: u64,
    pub matched: u64,
    pub submitted: u64,
    pub skipped: u64,
    pub batches: u64,
    pub errors: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemError {
    pub item_id: Option<String>,
    pub reason: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Partial,
    Failed,
}

impl RunStatus {
    /// The HTTP-facing status vocabulary (§6) collapses `completed` into
    /// `ok`; `idle`/`running` never appear in a `RunResponse`.
    pub fn as_response_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "ok",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunState {
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stats: Stats,
    pub warnings: Vec<String>,
    pub errors: Vec<ItemError>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            status: RunStatus::Idle,
            started_at: None,
            finished_at: None,
            stats: Stats::default(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub collector: String,
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: String,
    pub stats: Stats,
    pub warnings: Vec<String>,
    pub errors: Vec<ItemError>,
}
