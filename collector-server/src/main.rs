mod errors;
mod handlers;
mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use collector_config::{CaptionBackendKind, Config as ExtConfig};
use collector_core::caption::{CaptionBackend, OllamaBackend, OpenAiBackend};
use collector_core::entity::{ExtractorConfig, HeuristicExtractor};
use collector_core::fence::FenceStore;
use collector_core::filter::{CompiledExpression, DefaultAction, FilterBuilder};
use collector_core::gateway::GatewayClient;
use collector_core::image::Destination;
use collector_core::orchestrator::{lock::RunLockRegistry, ModuleEnables};
use collector_core::sources::LocalMailSource;
use collector_core::types::CollectorId;
use collector_core::{EnrichmentPipelineImpl, MetricsCollector, RunOrchestrator};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use state::{AppState, CollectorRegistry};

/// Command line arguments for the collector HTTP adapter.
#[derive(Parser, Debug)]
#[command(name = "collector-server")]
#[command(about = "HTTP adapter for collector run orchestration")]
struct Args {
    /// Server port (overrides config).
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Directory of `.eml`/`.emlx` files backing the `email_local` collector.
    #[arg(long, env = "MAIL_ARCHIVE_DIR")]
    mail_archive_dir: Option<PathBuf>,

    /// Directory used for fence/run-state persistence.
    #[arg(long, env = "STATE_DIR", default_value = "~/.haven/state")]
    state_dir: PathBuf,

    /// Optional filter file (`~/.haven/email_collector_filters.yaml`-style).
    #[arg(long, env = "FILTER_FILE")]
    filter_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = ExtConfig::load_from_env()?;
    if let Some(port) = args.port {
        config.service.port = port;
    }

    init_tracing(&config);

    let registry = CollectorRegistry::new();
    let mail_archive_dir = args.mail_archive_dir.unwrap_or_else(|| expand_home("~/.haven/mail_archive"));
    let state_dir = expand_home(args.state_dir.to_string_lossy().as_ref());

    let (debug_sink, _debug_sink_join) =
        collector_core::debug_sink::spawn(state_dir.join("debug").join("rejected.jsonl"), None);

    if config.modules.mail_enabled {
        let orchestrator =
            build_email_local_orchestrator(&config, &mail_archive_dir, &state_dir, args.filter_file.as_deref(), debug_sink)?;
        registry.register(CollectorId::new("email_local"), Arc::new(orchestrator)).await;
    }

    let app_state = AppState { registry };
    let router = routes::create_router(app_state);

    let addr = format!("0.0.0.0:{}", config.service.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "collector-server listening");
    axum::serve(listener, router).await?;
    Ok(())
}

fn build_email_local_orchestrator(
    config: &ExtConfig,
    mail_archive_dir: &std::path::Path,
    state_dir: &std::path::Path,
    filter_file: Option<&std::path::Path>,
    debug_sink: collector_core::debug_sink::DebugSinkHandle,
) -> anyhow::Result<RunOrchestrator> {
    let filter = load_filter(filter_file)?;

    let source = Arc::new(LocalMailSource::new(mail_archive_dir));
    let fence_store = FenceStore::new(state_dir.join("fences"));
    let lock_registry = RunLockRegistry::new();

    let gateway = Arc::new(GatewayClient::new(
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.gateway.timeout_ms))
            .build()?,
        config.gateway.base_url.clone(),
        config.gateway.ingest_path.clone(),
        config.gateway.ingest_file_path.clone(),
        config.gateway.bearer_token.clone().unwrap_or_default(),
    ));

    let entities: Arc<dyn collector_core::entity::EntityExtractor> =
        Arc::new(HeuristicExtractor::new(ExtractorConfig::default()));
    let metrics = MetricsCollector::new();
    let caption = build_caption_backend(config, &metrics)?;
    let enrichment = Arc::new(EnrichmentPipelineImpl::new(None, caption, Some(entities), Destination::LocalOllama));

    let modules = ModuleEnables {
        ocr: config.modules.ocr_enabled,
        caption: config.modules.caption_enabled,
        entities: config.modules.entity_enabled,
    };

    Ok(RunOrchestrator::new(
        CollectorId::new("email_local"),
        fence_store,
        lock_registry,
        source,
        filter,
        enrichment,
        gateway,
        modules,
    )
    .with_debug_sink(debug_sink))
}

/// Builds the configured caption backend when captioning is enabled;
/// `None` otherwise (`EnrichmentPipelineImpl` simply skips the stage).
fn build_caption_backend(config: &ExtConfig, metrics: &MetricsCollector) -> anyhow::Result<Option<Arc<dyn CaptionBackend>>> {
    if !config.modules.caption_enabled {
        return Ok(None);
    }
    let client = reqwest::Client::new();
    let backend: Arc<dyn CaptionBackend> = match config.caption.backend {
        CaptionBackendKind::Ollama => {
            Arc::new(OllamaBackend::new(client, config.caption.endpoint.clone(), config.caption.model.clone()))
        }
        CaptionBackendKind::OpenAi => Arc::new(
            OpenAiBackend::new(client, config.caption.endpoint.clone(), config.caption.model.clone(), config.caption.api_key.clone())?
                .with_metrics(metrics.clone()),
        ),
    };
    Ok(Some(backend))
}

fn load_filter(path: Option<&std::path::Path>) -> anyhow::Result<CompiledExpression> {
    let builder = match path {
        Some(path) if path.exists() => {
            let contents = std::fs::read_to_string(path)?;
            FilterBuilder::new().with_file(&contents)?
        }
        _ => FilterBuilder::new(),
    };
    Ok(builder.default_action(DefaultAction::Include).build())
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(raw)
}

fn init_tracing(config: &ExtConfig) {
    use collector_config::LogFormat;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.logging.format {
        LogFormat::Json => {
            let _ = registry.with(tracing_subscriber::fmt::layer().json()).try_init();
        }
        LogFormat::Logfmt | LogFormat::Text => {
            let _ = registry.with(tracing_subscriber::fmt::layer()).try_init();
        }
    }
}
