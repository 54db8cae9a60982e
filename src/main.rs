use anyhow::Context;
use std::sync::Arc;
use subrun::cli::{Args, ConfigDiscovery, Credentials};
use subrun::container::{ContainerClient, DockerRuntime, DockerRuntimeConfig};
use subrun::{RunRequest, SubmissionRunner, TerminalReason, env};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting submission runner for {}", args.submission_id);

    match run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Run failed: {:#}", e);
            Err(e)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let settings = ConfigDiscovery::discover_settings(args.config.as_deref())
        .context("Failed to load settings")?;
    let credentials = Credentials::from_toml_file(&args.credentials)
        .context("Failed to load credentials")?;

    let store = if args.store {
        Some(
            credentials
                .log_store()
                .context("Log persistence requested but storage is not configured")?,
        )
    } else {
        None
    };

    if credentials.registry.is_none() {
        warn!("No [registry] credentials; pulling anonymously");
    }

    let work_dir = match &args.work_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Cannot determine working directory")?,
    };

    let request = RunRequest {
        submission_id: args.submission_id.clone(),
        image: args.image()?,
        input_dir: args.input_dir.clone(),
        work_dir: work_dir.clone(),
        parent_id: args.parent_id.clone(),
        quota: args.quota(),
        status: args.status.clone(),
        credentials: credentials.registry.clone(),
    };

    let client = ContainerClient::new()
        .await
        .context("Container runtime unavailable")?;
    let runtime = DockerRuntime::with_client(
        client,
        DockerRuntimeConfig {
            gpu_runtime: settings.gpu_runtime.clone(),
            stop_timeout: settings.stop_timeout_secs,
        },
    );

    let runner = SubmissionRunner::new(Arc::new(runtime), store).with_settings(settings);
    let summary = runner.run(&request).await?;

    info!(
        "{} cases: {} completed, {} timed out, {} failed to launch; bundle at {:?}",
        summary.cases.len(),
        summary.count(TerminalReason::Completed),
        summary.count(TerminalReason::TimedOut),
        summary.count(TerminalReason::LaunchFailed),
        summary.archive_path
    );

    let summary_path = env::summary_file_path(&work_dir, &request.submission_id);
    let json = serde_json::to_string_pretty(&summary)?;
    tokio::fs::write(&summary_path, json)
        .await
        .with_context(|| format!("Failed to write {:?}", summary_path))?;

    Ok(())
}
