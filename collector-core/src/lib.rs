pub mod caption;
pub mod debug_sink;
pub mod entity;
pub mod enrich;
pub mod error;
pub mod fence;
pub mod filter;
pub mod gateway;
pub mod image;
pub mod imap;
pub mod metrics;
pub mod ocr;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod secret;
pub mod sources;
pub mod types;

pub use error::CollectorError;
pub use metrics::MetricsCollector;
pub use orchestrator::{CandidateItem, EnrichmentPipeline, ModuleEnables, RunOrchestrator, Source};
pub use pipeline::EnrichmentPipelineImpl;
pub use retry::BackoffPolicy;
