//! `kale` - tag notebook cells as pipeline steps and deploy them

mod config;
mod console;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::KaleConfig;
use console::{ConsoleNotifier, ConsolePrompt};
use kale_deploy::{
    select_experiment, DeployMode, DeployOrchestrator, DeployProgress, DeployRegistry,
    DeployRequest, KaleSession,
};
use kale_notebook::{rename_step, IpynbStore, StepGraph};
use kale_rpc::{ProcessTransport, RpcGateway};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kale")]
#[command(author, version, about = "Notebook pipeline steps and deployments")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Python interpreter running the kernel-side module
    #[arg(long, global = true)]
    python: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List steps in execution order
    Steps {
        /// Notebook file
        notebook: PathBuf,
    },
    /// Rename a step and update every cell depending on it
    Rename {
        /// Notebook file
        notebook: PathBuf,
        /// Current step name
        old: String,
        /// New step name
        new: String,
    },
    /// Check the step graph and pipeline metadata
    Validate {
        /// Notebook file
        notebook: PathBuf,
    },
    /// List experiments known to the cluster
    Experiments,
    /// List volumes mounted on the notebook server
    Volumes,
    /// Compile the notebook and optionally upload or run it
    Deploy {
        /// Notebook file
        notebook: PathBuf,

        /// What to do after compiling: compile, upload or run
        #[arg(long, default_value = "compile")]
        mode: DeployMode,

        /// Compile with debug output
        #[arg(long)]
        debug: bool,

        /// Skip snapshotting the notebook volumes
        #[arg(long)]
        no_snapshot: bool,

        /// Overwrite an existing pipeline without asking
        #[arg(long, conflicts_with = "no_overwrite")]
        overwrite: bool,

        /// Never overwrite an existing pipeline
        #[arg(long)]
        no_overwrite: bool,

        /// Return once the run started instead of following it
        #[arg(long)]
        detach: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = KaleConfig::load(cli.config.as_deref()).await?;
    if let Some(python) = cli.python {
        config = config.with_python(python);
    }

    match cli.command {
        Commands::Steps { notebook } => steps(&notebook).await,
        Commands::Rename { notebook, old, new } => rename(&notebook, &old, &new).await,
        Commands::Validate { notebook } => validate(&notebook).await,
        Commands::Experiments => {
            for experiment in KaleSession::new(gateway(&config)).list_experiments().await {
                println!("{:<40} {}", experiment.id, experiment.name);
            }
            Ok(())
        }
        Commands::Volumes => {
            let Some(volumes) = KaleSession::new(gateway(&config)).mounted_volumes().await else {
                bail!("could not list mounted volumes");
            };
            for v in volumes {
                println!(
                    "{:<30} {:<24} {}{}",
                    v.name,
                    v.mount_point,
                    v.size.unwrap_or(0),
                    v.size_type.unwrap_or_default()
                );
            }
            Ok(())
        }
        Commands::Deploy {
            notebook,
            mode,
            debug,
            no_snapshot,
            overwrite,
            no_overwrite,
            detach,
        } => {
            let prompt = match (overwrite, no_overwrite) {
                (true, _) => ConsolePrompt::Always(true),
                (_, true) => ConsolePrompt::Always(false),
                _ => ConsolePrompt::Ask,
            };
            let request =
                DeployRequest::new(kernel_path(&notebook).await?, load_metadata(&notebook).await?)
                    .with_mode(mode)
                    .with_debug(debug)
                    .with_snapshot(!no_snapshot);
            deploy(&config, request, prompt, detach).await
        }
    }
}

fn gateway(config: &KaleConfig) -> RpcGateway {
    let mut transport = ProcessTransport::new(&config.python);
    if let Some(dir) = &config.working_dir {
        transport = transport.with_working_dir(dir);
    }
    RpcGateway::new(Arc::new(transport), Arc::new(ConsoleNotifier))
}

async fn steps(path: &Path) -> Result<()> {
    let notebook = IpynbStore::new(path).load().await?;
    let graph = StepGraph::assemble(&notebook);

    for step in graph.topological_order()? {
        let deps = graph.dependencies_of(step);
        if deps.is_empty() {
            println!("{step}");
        } else {
            println!("{step} <- {}", deps.join(", "));
        }
    }
    for dangling in graph.dangling() {
        eprintln!(
            "warning: cell {} depends on unknown step '{}'",
            dangling.cell, dangling.dependency
        );
    }
    Ok(())
}

async fn rename(path: &Path, old: &str, new: &str) -> Result<()> {
    let store = IpynbStore::new(path);
    let mut notebook = store.load().await?;
    let summary = rename_step(&mut notebook, &store, old, new)
        .await
        .with_context(|| format!("cannot rename '{old}' to '{new}'"))?;
    println!(
        "renamed '{old}' to '{new}': {} cells rewritten, {} dependencies updated, {} dropped",
        summary.cells_rewritten, summary.edges_renamed, summary.edges_dropped
    );
    Ok(())
}

async fn validate(path: &Path) -> Result<()> {
    let notebook = IpynbStore::new(path).load().await?;
    StepGraph::assemble(&notebook).validate()?;
    notebook.kale_metadata()?.validate()?;
    println!("{}: ok", path.display());
    Ok(())
}

async fn load_metadata(path: &Path) -> Result<kale_notebook::NotebookMetadata> {
    let notebook = IpynbStore::new(path).load().await?;
    Ok(notebook.kale_metadata()?)
}

/// Absolute notebook path, as the kernel resolves it
async fn kernel_path(path: &Path) -> Result<String> {
    let absolute = tokio::fs::canonicalize(path)
        .await
        .with_context(|| format!("cannot resolve {}", path.display()))?;
    Ok(absolute.to_string_lossy().into_owned())
}

async fn deploy(
    config: &KaleConfig,
    mut request: DeployRequest,
    prompt: ConsolePrompt,
    detach: bool,
) -> Result<()> {
    let gateway = gateway(config);

    if request.metadata.experiment.id.is_empty() {
        let experiments = KaleSession::new(gateway.clone()).list_experiments().await;
        request.metadata.experiment = select_experiment(&request.metadata, &experiments);
    }

    let orchestrator = DeployOrchestrator::new(
        gateway,
        Arc::new(DeployRegistry::new()),
        Arc::new(prompt),
        config.deploy.clone(),
    );
    let outcome = orchestrator.deploy(request).await?;

    if outcome.run.is_some() && !detach {
        orchestrator.wait_for_run(outcome.handle).await;
    }
    if let Some(record) = orchestrator.registry().get(outcome.handle) {
        print_record(&record, &config.deploy.ui_base_url);
    }

    if outcome.state.failed_stage().is_some() {
        bail!("deployment {} {}", outcome.handle, outcome.state);
    }
    Ok(())
}

fn print_record(record: &DeployProgress, base_url: &str) {
    let link = |l: Option<String>| l.map(|l| format!("  {l}")).unwrap_or_default();

    println!("Deployment {}: {}", record.handle, record.state);
    if let Some(label) = record.snapshot_label() {
        println!("  Snapshot: {label}{}", link(record.snapshot_link(base_url)));
    }
    if record.show_upload {
        println!(
            "  Upload:   {}{}",
            record.upload_label(),
            link(record.upload_link(base_url))
        );
    }
    if record.show_run {
        println!(
            "  Run:      {}{}",
            record.run_label(),
            link(record.run_link(base_url))
        );
    }
}
