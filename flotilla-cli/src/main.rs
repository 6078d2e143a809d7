//! flotilla: reconcile declared cloud resources against a remote API.
//!
//! Exit codes: 0 success, 1 runtime error, 2 partial failure, 3 invalid
//! configuration.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flotilla_core::{
    BatchOptions, BatchReport, DeleteOptions, ErrorKind, Manifest, ManifestError, ReconcileError,
    ReconciliationResult, Reconciler, ReconcilerConfig, ResourceId, RetryPolicy, SettlePolicy,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod backend;
mod output;

use backend::Remote;
use output::{OutputFormat, PlanLine};

const EXIT_RUNTIME: u8 = 1;
const EXIT_PARTIAL_FAILURE: u8 = 2;
const EXIT_FATAL_CONFIG: u8 = 3;

/// Declarative cloud-resource reconciler
#[derive(Parser, Debug)]
#[command(name = "flotilla", version, about)]
struct Cli {
    /// Remote API endpoint (e.g., https://ecs.example.com)
    #[arg(long, env = "FLOTILLA_ENDPOINT", conflicts_with = "state")]
    endpoint: Option<String>,

    /// Use a local JSON state file as the remote instead of an endpoint
    #[arg(long, env = "FLOTILLA_STATE")]
    state: Option<PathBuf>,

    /// Maximum resources reconciled at once
    #[arg(long, env = "FLOTILLA_CONCURRENCY", default_value = "4")]
    concurrency: usize,

    /// Deadline for the whole batch in seconds
    #[arg(long, env = "FLOTILLA_DEADLINE_SECS")]
    deadline_secs: Option<u64>,

    /// Attempts per remote call, including the first
    #[arg(long, env = "FLOTILLA_MAX_ATTEMPTS", default_value = "5")]
    max_attempts: u32,

    /// Backoff before the first retry in milliseconds
    #[arg(long, env = "FLOTILLA_BASE_DELAY_MS", default_value = "200")]
    base_delay_ms: u64,

    /// Timeout for a single HTTP request in seconds
    #[arg(long, env = "FLOTILLA_REQUEST_TIMEOUT_SECS", default_value = "30")]
    request_timeout_secs: u64,

    /// Output format
    #[arg(long, env = "FLOTILLA_OUTPUT", value_enum, default_value = "table")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bring every resource in a document to its declared state
    Reconcile {
        /// Descriptor document (.yaml or .json)
        file: PathBuf,
    },

    /// Show what reconcile would change, without changing anything
    Plan {
        /// Descriptor document (.yaml or .json)
        file: PathBuf,
    },

    /// Delete a resource by identity, or every resource in a document
    Destroy {
        /// Resource identity: kind:name or kind:scope/name
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        identity: Option<String>,

        /// Descriptor document whose resources are deleted
        #[arg(long)]
        file: Option<PathBuf>,

        /// Delete even if the remote would refuse
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                base_delay: Duration::from_millis(self.base_delay_ms),
                ..RetryPolicy::default()
            },
            settle: SettlePolicy::default(),
        }
    }

    fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.concurrency,
            deadline: self.deadline_secs.map(Duration::from_secs),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flotilla=info,flotilla_core=info,audit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if is_fatal_config(&e) {
                ExitCode::from(EXIT_FATAL_CONFIG)
            } else {
                ExitCode::from(EXIT_RUNTIME)
            }
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let remote = Remote::open(
        cli.endpoint.as_deref(),
        cli.state.as_deref(),
        Duration::from_secs(cli.request_timeout_secs),
    )
    .await?;
    let reconciler = Reconciler::new(remote.client(), cli.reconciler_config());
    let options = cli.batch_options();

    match &cli.command {
        Commands::Reconcile { file } => {
            let manifest = Manifest::load(file)?;
            info!(file = %file.display(), resources = manifest.resources.len(), "Reconciling document");

            let report = reconcile_document(&reconciler, manifest, &options).await?;
            remote.save().await?;
            output::print_results(&report.results, cli.output)?;
            Ok(exit_code(&report.results))
        }

        Commands::Plan { file } => {
            let manifest = Manifest::load(file)?;
            let mut lines: Vec<PlanLine> = Vec::with_capacity(manifest.resources.len());
            for descriptor in &manifest.resources {
                let line = reconciler
                    .plan(descriptor)
                    .await
                    .map_err(|e| (descriptor.display_id(), e));
                lines.push(line);
            }
            output::print_plan(&lines, cli.output)?;

            let errors: Vec<&ReconcileError> = lines
                .iter()
                .filter_map(|line| line.as_ref().err())
                .map(|(_, e)| e)
                .collect();
            Ok(if errors.iter().any(|e| e.kind() == ErrorKind::FatalConfig) {
                ExitCode::from(EXIT_FATAL_CONFIG)
            } else if !errors.is_empty() {
                ExitCode::from(EXIT_PARTIAL_FAILURE)
            } else {
                ExitCode::SUCCESS
            })
        }

        Commands::Destroy {
            identity,
            file,
            force,
        } => {
            let mut targets = match (identity, file) {
                (Some(identity), _) => {
                    let id: ResourceId = identity.parse()?;
                    vec![(id, DeleteOptions::default())]
                }
                (None, Some(file)) => Manifest::load(file)?.destroy_targets()?,
                (None, None) => anyhow::bail!("Pass an identity or --file"),
            };
            if *force {
                for (_, delete) in &mut targets {
                    delete.force = Some(true);
                }
            }

            let report = reconciler.destroy_batch(targets, &options).await;
            remote
                .save()
                .await
                .context("Resources were deleted but the state file could not be saved")?;
            output::print_results(&report.results, cli.output)?;
            Ok(exit_code(&report.results))
        }
    }
}

/// Refuses the whole document, before any remote call, if one of its
/// resources could not be created.
async fn reconcile_document(
    reconciler: &Reconciler,
    manifest: Manifest,
    options: &BatchOptions,
) -> Result<BatchReport, ReconcileError> {
    manifest.check_required()?;
    Ok(reconciler.reconcile_batch(manifest.resources, options).await)
}

fn exit_code(results: &[ReconciliationResult]) -> ExitCode {
    let fatal_config = results
        .iter()
        .any(|r| r.error.as_ref().is_some_and(|e| e.kind() == ErrorKind::FatalConfig));
    if fatal_config {
        ExitCode::from(EXIT_FATAL_CONFIG)
    } else if results.iter().any(|r| !r.success) {
        ExitCode::from(EXIT_PARTIAL_FAILURE)
    } else {
        ExitCode::SUCCESS
    }
}

fn is_fatal_config(e: &anyhow::Error) -> bool {
    if let Some(e) = e.downcast_ref::<ManifestError>() {
        return e.kind() == Some(ErrorKind::FatalConfig);
    }
    e.downcast_ref::<ReconcileError>()
        .is_some_and(|e| e.kind() == ErrorKind::FatalConfig)
}
