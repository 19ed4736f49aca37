use clap::Parser;
use conclave::agent::build_voices;
use conclave::cli::{self, Cli, Commands};
use conclave::config::{AppConfig, LoggingConfig};
use conclave::error::{ConclaveError, Result};
use conclave::market::{FileSnapshotProvider, MarketSnapshotProvider};
use conclave::notify::WebhookNotifier;
use conclave::pattern::{JsonFileLoader, MatcherConfig, PatternLibrary, PatternMatcher};
use conclave::persistence::decision_store;
use conclave::persistence::{JsonlDecisionSink, PostgresDecisionSink, PostgresPatternLoader};
use conclave::DebateOrchestrator;
use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;
    let _guard = init_logging(&config.logging);

    if let Err(problems) = config.validate() {
        for problem in &problems {
            error!("config: {}", problem);
        }
        return Err(ConclaveError::InvalidConfig(problems.join("; ")));
    }

    match cli.command {
        Commands::CheckConfig => {
            println!(
                "Configuration OK: {} voices, rounds {}..{}, threshold {:.2}",
                config.agents.len(),
                config.debate.min_rounds,
                config.debate.max_rounds,
                config.debate.consensus_threshold
            );
            cli::print_agents(&config.agents);
            Ok(())
        }
        Commands::Patterns { id, snapshots } => {
            let features = load_features(&snapshots, &id).await?;
            let pool = connect_store(&config).await?;
            let library = load_library(&config, pool.as_ref()).await?;
            let insights = matcher_for(&config).match_candidate(&features, &library);
            cli::print_insights(&features.id, &insights, cli.json)
        }
        Commands::Debate { id, snapshots } => {
            let features = load_features(&snapshots, &id).await?;
            let pool = connect_store(&config).await?;
            let orchestrator = build_orchestrator(&config, pool).await?;

            match orchestrator.run_debate(features).await {
                Ok(decision) => cli::print_decision(&decision, cli.json),
                Err(e) => {
                    if let Some(decision) = e.aborted_decision() {
                        cli::print_decision(decision, cli.json)?;
                    }
                    Err(e)
                }
            }
        }
    }
}

async fn load_features(snapshots: &Path, id: &str) -> Result<conclave::CandidateFeatures> {
    let provider = FileSnapshotProvider::load(snapshots).await?;
    provider.fetch(id).await
}

async fn connect_store(config: &AppConfig) -> Result<Option<PgPool>> {
    let Some(url) = &config.persistence.database_url else {
        return Ok(None);
    };
    let pool = decision_store::connect(url, config.persistence.max_connections).await?;
    decision_store::ensure_tables(&pool).await?;
    info!("database connected");
    Ok(Some(pool))
}

/// JSON file first, then the database, else an empty library
async fn load_library(config: &AppConfig, pool: Option<&PgPool>) -> Result<PatternLibrary> {
    if let Some(path) = &config.patterns.library_path {
        return PatternLibrary::load_from(&JsonFileLoader::new(path)).await;
    }
    if let Some(pool) = pool {
        return PatternLibrary::load_from(&PostgresPatternLoader::new(pool.clone())).await;
    }
    warn!("no pattern library configured; precedents disabled");
    Ok(PatternLibrary::empty())
}

fn matcher_for(config: &AppConfig) -> PatternMatcher {
    PatternMatcher::new(MatcherConfig {
        top_k: config.patterns.top_k,
        min_similarity: config.patterns.min_similarity,
        ..MatcherConfig::default()
    })
}

async fn build_orchestrator(config: &AppConfig, pool: Option<PgPool>) -> Result<DebateOrchestrator> {
    let library = load_library(config, pool.as_ref()).await?;
    let voices = build_voices(&config.agents, config.debate.per_call_timeout())?;
    let save_timeout = config.persistence.save_timeout();

    let mut orchestrator = DebateOrchestrator::new(voices, library, config.debate.clone())
        .with_matcher(matcher_for(config));

    if let Some(pool) = pool {
        orchestrator =
            orchestrator.with_persistence(Arc::new(PostgresDecisionSink::new(pool)), save_timeout);
    }
    if let Some(path) = &config.persistence.jsonl_path {
        orchestrator =
            orchestrator.with_persistence(Arc::new(JsonlDecisionSink::new(path)), save_timeout);
    }
    if let Some(url) = &config.notifications.webhook_url {
        let min_status = config
            .notifications
            .min_status()
            .ok_or_else(|| ConclaveError::InvalidConfig("notifications.min_status".to_string()))?;
        orchestrator =
            orchestrator.with_notifier(Arc::new(WebhookNotifier::new(url)?), min_status);
    }

    info!(voices = ?orchestrator.voice_names(), "orchestrator ready");
    Ok(orchestrator)
}

fn log_directive(level: &str) -> String {
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else if level == "info" {
        "info,conclave=debug,sqlx=warn".to_string()
    } else {
        format!("{},sqlx=warn", level)
    }
}

fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_directive(&config.level)));

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "conclave.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).json();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let json_layer = config.json.then(|| fmt::layer().json().with_target(true));
    let text_layer = (!config.json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init();

    guard
}
