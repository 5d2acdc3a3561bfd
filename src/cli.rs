//
// cli.rs
// PACS-Sync
//
// Defines the CLI surface with Clap, wires components in dependency order, and dispatches user-selected commands.
//
// Thales Matheus Mendonça Santos - October 2026

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::local::LocalRepository;
use crate::models::{InstanceId, QueuedStudy, StudyId, SyncReport};
use crate::remote::RemoteRepository;
use crate::router::HybridRouter;
use crate::sync::SyncEngine;
use crate::transport::{HttpTransport, SharedTransport};
use crate::{anonymize, embed, metadata};

/// Command-line interface glue code: defines the available verbs and dispatches to modules.
#[derive(Parser)]
#[command(name = "pacs-sync")]
#[command(about = "Synchronize DICOM studies between archives with embedded examination results", long_about = None)]
pub struct Cli {
    /// TOML file with [source] / [target] endpoints and cache_dir
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the local cache directory
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct ResultText {
    /// Examination result text
    #[arg(long, conflicts_with = "result_file")]
    pub result: Option<String>,

    /// Read the examination result from a file
    #[arg(long)]
    pub result_file: Option<PathBuf>,
}

impl ResultText {
    fn resolve(&self) -> anyhow::Result<Option<String>> {
        match (&self.result, &self.result_file) {
            (Some(text), _) => Ok(Some(text.clone())),
            (None, Some(path)) => fs::read_to_string(path)
                .map(Some)
                .with_context(|| format!("Failed to read result file {}", path.display())),
            (None, None) => Ok(None),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List archive and local studies
    Studies,
    /// Show study metadata
    Info { study: StudyId },
    /// List the instances of a study
    Instances { study: StudyId },
    /// Load a single DICOM file into the local cache
    LoadFile { file: PathBuf },
    /// Load every DICOM file below a folder into the local cache
    LoadFolder { directory: PathBuf },
    /// Store an examination result for a local study
    SetResult {
        study: StudyId,
        #[command(flatten)]
        text: ResultText,
    },
    /// Print the examination result of a study or a single instance
    Result {
        study: Option<StudyId>,
        #[arg(long, conflicts_with = "study")]
        instance: Option<InstanceId>,
    },
    /// Send studies to the target archive, replacing same-UID studies there
    Send {
        #[arg(required = true)]
        studies: Vec<StudyId>,
        #[command(flatten)]
        text: ResultText,
        /// Anonymize archive studies too (local studies always are)
        #[arg(long)]
        anonymize: bool,
    },
    /// Send a JSON queue of {"study": .., "result": ..} entries
    SendQueue {
        queue: PathBuf,
        #[arg(long)]
        no_anonymize: bool,
    },
    /// Forget a local study
    Remove { study: StudyId },
    /// Forget every local study
    Clear,
    /// Anonymize a DICOM file
    Anonymize {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Embed an examination result into a DICOM file
    Embed {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        text: ResultText,
    },
    /// Print the examination result embedded in a DICOM file
    Extract { file: PathBuf },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when embedded in a host application.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Build components in dependency order: transport, repositories, router, engine.
pub fn build_engine(config: &AppConfig) -> anyhow::Result<SyncEngine> {
    let transport: SharedTransport = Arc::new(HttpTransport::new()?);
    let remote = RemoteRepository::new(transport.clone(), config.source.clone());
    let local = LocalRepository::open(&config.cache_dir, transport)
        .with_context(|| format!("Failed to open local cache {}", config.cache_dir.display()))?;
    Ok(SyncEngine::new(HybridRouter::new(remote, local)))
}

fn print_report(report: &SyncReport) {
    if let Some(existing) = &report.replaced {
        println!("  replaced destination study {existing}");
    }
    println!(
        "  {} -> {}/{} instances sent",
        report.study,
        report.succeeded.len(),
        report.total()
    );
    for (instance, reason) in &report.failed {
        println!("  failed {instance}: {reason}");
    }
}

fn read_queue(path: &Path) -> anyhow::Result<Vec<QueuedStudy>> {
    let file = fs::File::open(path).with_context(|| format!("Failed to open queue {}", path.display()))?;
    serde_json::from_reader(file).context("Failed to parse queue JSON")
}

pub fn run() -> anyhow::Result<()> {
    // Parse the raw CLI arguments once and dispatch to a subcommand handler.
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // File-level verbs never touch an archive or the cache.
    match &cli.command {
        Commands::Anonymize { input, output } => {
            let written = anonymize::process_file(input, output.clone())?;
            println!("Anonymized file saved to {}", written.display());
            return Ok(());
        }
        Commands::Embed { input, output, text } => {
            let Some(result) = text.resolve()? else {
                bail!("Provide --result or --result-file");
            };
            let bytes = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
            let embedded = embed::try_embed(&bytes, &result)?;
            fs::write(output, embedded).with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Result embedded into {}", output.display());
            return Ok(());
        }
        Commands::Extract { file } => {
            let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
            println!("{}", embed::extract_result(&bytes));
            return Ok(());
        }
        _ => {}
    }

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(cache_dir) = cli.cache_dir {
        config.cache_dir = cache_dir;
    }
    let mut engine = build_engine(&config)?;

    match cli.command {
        Commands::Studies => {
            for study in engine.router().get_all_studies() {
                let origin = if study.is_local() { "LOCAL" } else { "PACS" };
                println!("[{origin}] {study}");
            }
        }
        Commands::Info { study } => {
            let meta = engine.router().get_study_metadata(&study)?;
            metadata::print_info(study.as_str(), &meta);
        }
        Commands::Instances { study } => {
            for instance in engine.router().get_study_instances(&study)? {
                println!("{instance}");
            }
        }
        Commands::LoadFile { file } => {
            let loaded = engine.router_mut().load_local_file(&file)?;
            println!("{} <- {} ({})", loaded.study, file.display(), loaded.metadata.display_text());
        }
        Commands::LoadFolder { directory } => {
            let report = engine.router_mut().load_local_folder(&directory)?;
            for study in &report.studies {
                println!(
                    "{} {} file(s) ({})",
                    study.study,
                    study.file_count,
                    study.metadata.display_text()
                );
            }
            for (path, reason) in &report.failed {
                eprintln!("Could not load {}: {}", path.display(), reason);
            }
        }
        Commands::SetResult { study, text } => {
            let Some(result) = text.resolve()? else {
                bail!("Provide --result or --result-file");
            };
            if !engine.router_mut().set_study_result(&study, &result)? {
                bail!("Results can only be cached for local studies; pass --result to `send` instead");
            }
        }
        Commands::Result { study, instance } => {
            let text = match (study, instance) {
                (_, Some(instance)) => engine.router().get_instance_result(&instance),
                (Some(study), None) => engine.router().get_study_result(&study),
                (None, None) => bail!("Provide a study or --instance"),
            };
            println!("{text}");
        }
        Commands::Send {
            studies,
            text,
            anonymize,
        } => {
            let result = text.resolve()?;
            let mut failures = 0;
            for study in &studies {
                // Local studies fall back to their cached result.
                let cached = match (&result, study.is_local()) {
                    (None, true) => Some(engine.router().get_study_result(study)).filter(|r| !r.is_empty()),
                    _ => None,
                };
                let text = result.as_deref().or(cached.as_deref());
                match engine.sync_study(study, &config.target, text, anonymize) {
                    Ok(report) => {
                        print_report(&report);
                        if !report.is_success() {
                            failures += 1;
                        }
                    }
                    Err(e) => {
                        eprintln!("  {study} failed: {e}");
                        failures += 1;
                    }
                }
            }
            if failures > 0 {
                bail!("{failures}/{} studies were not fully sent", studies.len());
            }
        }
        Commands::SendQueue {
            queue,
            no_anonymize,
        } => {
            let queue = read_queue(&queue)?;
            let batch = engine.send_queue(&queue, &config.target, !no_anonymize);
            println!(
                "{} studies ({} with results, {} local, {} archive) -> {} sent, {} failed",
                batch.total(),
                batch.with_result,
                batch.local,
                batch.remote,
                batch.succeeded.len(),
                batch.failed.len()
            );
            for report in &batch.succeeded {
                print_report(report);
            }
            for (study, reason) in &batch.failed {
                eprintln!("  {study} failed: {reason}");
            }
            if !batch.is_complete_success() {
                bail!("{} queued studies failed", batch.failed.len());
            }
        }
        Commands::Remove { study } => {
            if engine.router_mut().remove_local_study(&study)? {
                println!("Removed {study}");
            } else {
                println!("{study} is not a known local study");
            }
        }
        Commands::Clear => {
            let count = engine.router().local_study_count();
            engine.router_mut().clear_local_studies()?;
            println!("Cleared {count} local studies");
        }
        Commands::Anonymize { .. } | Commands::Embed { .. } | Commands::Extract { .. } => {}
    }

    Ok(())
}
