mod cli;
mod config;
mod error;
mod jobs;
mod orchestrator;
mod providers;
mod query;
mod server;
mod sweeper;
mod ui;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use console::Style;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cli::{Cli, Command, ProviderArg};
use config::{AppConfig, DEFAULT_CONFIG_PATH};
use jobs::{JobInput, JobStatus, JobStore, ProviderModels};
use orchestrator::{InputArtifact, JobOrchestrator};
use providers::{ProviderId, ProviderRegistry};
use query::StatusQuery;
use sweeper::RetentionSweeper;
use ui::JobProgress;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[actix_web::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = AppConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;
            serve(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Transcribe {
            file,
            providers,
            language,
            openai_model,
            deepgram_model,
            json,
        } => {
            config.validate()?;
            let models = ProviderModels {
                openai: openai_model,
                deepgram: deepgram_model,
            };
            transcribe(&config, &file, &providers, language, models, json).await
        }
        Command::Providers => {
            list_providers(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Console logging; `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "multiscribe=debug,actix_web=info"
    } else {
        "multiscribe=info,actix_web=warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_orchestrator(config: &AppConfig) -> anyhow::Result<Arc<JobOrchestrator>> {
    let registry = ProviderRegistry::from_config(config)?;
    if registry.is_empty() {
        bail!("no provider is configured; set OPENAI_API_KEY and/or DEEPGRAM_API_KEY");
    }
    Ok(Arc::new(JobOrchestrator::new(
        Arc::new(JobStore::new()),
        registry,
        config.jobs.provider_timeout(),
    )))
}

async fn serve(config: &AppConfig) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(config)?;
    info!(providers = ?orchestrator.providers().ids(), "providers ready");

    let sweeper = RetentionSweeper::new(
        Arc::clone(orchestrator.store()),
        config.jobs.retention(),
        config.jobs.sweep_interval(),
    )
    .spawn();

    let result = server::run(config, orchestrator).await;
    sweeper.abort();
    result
}

async fn transcribe(
    config: &AppConfig,
    file: &Path,
    providers: &[ProviderArg],
    language: Option<String>,
    models: ProviderModels,
    json: bool,
) -> anyhow::Result<ExitCode> {
    if !file.is_file() {
        bail!("{} is not a readable file", file.display());
    }
    let orchestrator = build_orchestrator(config)?;

    let requested: BTreeSet<ProviderId> = if providers.is_empty() {
        orchestrator.providers().ids().into_iter().collect()
    } else {
        providers.iter().copied().map(ProviderId::from).collect()
    };

    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());
    let progress = JobProgress::start(&file_name);

    let input = JobInput {
        file_name,
        language,
        models,
    };
    let artifact = InputArtifact::File(file.to_path_buf());
    let submission = orchestrator.submit(input, artifact, requested)?;
    let job_id = submission.job_id;
    let query = StatusQuery::new(Arc::clone(orchestrator.store()));

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    while !submission.handle.is_finished() {
        ticker.tick().await;
        if let Some(view) = query.query(job_id) {
            progress.update(&view);
        }
    }
    submission.handle.await.context("job supervisor task failed")?;

    let view = query
        .query(job_id)
        .with_context(|| format!("job {job_id} vanished before it could be reported"))?;
    if json {
        progress.finish_json(&view);
    } else {
        progress.finish(&view);
    }

    Ok(match view.status {
        JobStatus::Completed => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

fn list_providers(config: &AppConfig) {
    let green = Style::new().green();
    let dim = Style::new().dim();
    for id in ProviderId::ALL {
        let provider = match id {
            ProviderId::OpenAi => &config.openai,
            ProviderId::Deepgram => &config.deepgram,
        };
        if provider.is_configured() {
            let model = provider.model.as_deref().unwrap_or("default model");
            println!("  {} {id} ({model})", green.apply_to("✓"));
        } else {
            println!("  {} {id} {}", dim.apply_to("·"), dim.apply_to("not configured"));
        }
    }
}
