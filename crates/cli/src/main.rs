use crate::{
    commands::{Commands, InputArgs},
    env::EnvManager,
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use engine_config::{
    report::summary::ImportSummaryReport,
    settings::{ImportSettings, validated::ValidatedSettings},
};
use engine_runtime::{pipeline::ImportPipeline, writer::InMemoryEntityStore};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod env;
mod error;
mod output;
mod rows;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "tally",
    version = "0.1.0",
    about = "Reconcile and bulk-import tabular records"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let code = match run(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "Command failed");
            ExitCode::GeneralError
        }
    };
    std::process::exit(code.as_i32());
}

async fn run(command: Commands) -> Result<ExitCode, CliError> {
    match command {
        Commands::Import {
            input,
            env_file,
            output,
            report,
            progress_json,
        } => {
            import(
                input,
                env_file.as_deref(),
                output.as_deref(),
                report.as_deref(),
                progress_json,
            )
            .await
        }
        Commands::Preview { input, json } => {
            let settings = load_settings(input.config.as_deref(), None)?.validate()?;
            let rows = rows::read_rows(&input.rows)?;
            let entities = rows::read_entities(&input.entities)?;

            let pipeline = ImportPipeline::new(settings.orchestrator()?, settings.pipeline_options());
            let preview = pipeline.preview(&rows, entities);
            output::print_preview(&preview, json)?;
            Ok(ExitCode::Success)
        }
        Commands::Config { config, env_file } => {
            let settings = load_settings(config.as_deref(), env_file.as_deref())?;
            settings.validate()?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(ExitCode::Success)
        }
    }
}

async fn import(
    input: InputArgs,
    env_file: Option<&Path>,
    output: Option<&Path>,
    report: Option<&Path>,
    progress_json: bool,
) -> Result<ExitCode, CliError> {
    let settings = load_settings(input.config.as_deref(), env_file)?.validate()?;
    let rows = rows::read_rows(&input.rows)?;
    let entities = rows::read_entities(&input.entities)?;

    let shutdown = ShutdownCoordinator::new(CancellationToken::new());
    shutdown.register_handlers();

    let mut pipeline = build_pipeline(&settings, shutdown.cancel_token())?;
    pipeline.orchestrator().subscribe(output::progress_logger());
    if progress_json {
        pipeline.orchestrator().subscribe(output::progress_json());
    }

    let store = InMemoryEntityStore::new(entities.clone());
    let result = pipeline.run(rows, entities, &store).await?;
    let import_id = pipeline.orchestrator().import_id().clone();

    let summary =
        ImportSummaryReport::from_pipeline(import_id, &result).with_period(settings.period_label());
    output::print_summary(&summary);
    if let Some(path) = report {
        summary.write_to(path)?;
    }
    if let Some(path) = output {
        rows::write_entities(path, &store.entities().await)?;
        info!(path = %path.display(), "Entity set written");
    }

    if result.outcome.cancelled {
        if shutdown.is_shutdown_requested() {
            warn!("Import interrupted, undispatched rows were left pending");
        }
        return Ok(ExitCode::ShutdownRequested);
    }
    if result.halted {
        warn!("Import halted on the first failed item");
        return Ok(ExitCode::GeneralError);
    }
    Ok(ExitCode::Success)
}

fn build_pipeline(
    settings: &ValidatedSettings,
    cancel_token: CancellationToken,
) -> Result<ImportPipeline, CliError> {
    let orchestrator = settings.orchestrator()?.with_cancel_token(cancel_token);
    Ok(ImportPipeline::new(orchestrator, settings.pipeline_options()))
}

/// Settings file (or defaults) with `TALLY_*` overrides from the process
/// environment and an optional `.env` file.
fn load_settings(
    config: Option<&Path>,
    env_file: Option<&Path>,
) -> Result<ImportSettings, CliError> {
    let mut env = EnvManager::new();
    if let Some(path) = env_file {
        env.load_from_file(path)?;
    }

    Ok(ImportSettings::resolve(config)?.with_env_overrides(|key| env.get(key))?)
}
