use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use xena_sting::blob::FsBlobStore;
use xena_sting::config::{ConfigLoader, PipelineConfig};
use xena_sting::discover::XenaCatalog;
use xena_sting::docstore::FsDocumentStore;
use xena_sting::error::PipelineError;
use xena_sting::fetch::{HttpDownloadClient, RetryPolicy};
use xena_sting::output::{JsonOutput, OutputMode, TextOutput};
use xena_sting::pipeline::{CancelToken, Pipeline, RunOptions};
use xena_sting::report;

#[derive(Parser)]
#[command(name = "xena-sting")]
#[command(about = "Ingest cGAS-STING pathway gene expression from TCGA Xena hub datasets")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Discover, fetch, extract, and load datasets")]
    Run(RunArgs),
    #[command(about = "Show archived dataset and loaded record counts")]
    Status(StoreArgs),
    #[command(about = "Summarize loaded expression records per dataset and gene")]
    Report(ReportArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    use_sample_data: bool,

    #[arg(long)]
    include_clinical: bool,

    #[arg(long)]
    max_datasets: Option<usize>,

    #[arg(long)]
    project_tag: Option<String>,
}

#[derive(Args)]
struct StoreArgs {
    #[arg(long)]
    config: Option<String>,
}

#[derive(Args)]
struct ReportArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    dataset: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(pipeline) = report.downcast_ref::<PipelineError>() {
            return ExitCode::from(map_exit_code(pipeline));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PipelineError) -> u8 {
    match error {
        PipelineError::MissingConfig
        | PipelineError::ConfigRead(_)
        | PipelineError::ConfigParse(_) => 2,
        PipelineError::Discovery(_) | PipelineError::Fetch { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Run(args) => run_pipeline(args, output_mode),
        Commands::Status(args) => run_status(args, output_mode),
        Commands::Report(args) => run_report(args, output_mode),
    }
}

fn build_pipeline(
    config: PipelineConfig,
) -> miette::Result<Pipeline<XenaCatalog, HttpDownloadClient, FsBlobStore, FsDocumentStore>> {
    let (blob, documents) = match &config.store_root {
        Some(root) => (
            FsBlobStore::new_with_root(root.join("blobs")),
            FsDocumentStore::new_with_root(root.join("documents")),
        ),
        None => (
            FsBlobStore::new().into_diagnostic()?,
            FsDocumentStore::new().into_diagnostic()?,
        ),
    };
    let catalog = XenaCatalog::new(config.hub_url.clone(), config.download_base.clone())
        .into_diagnostic()?;
    let downloader = HttpDownloadClient::new().into_diagnostic()?;
    Ok(Pipeline::new(
        catalog,
        downloader,
        RetryPolicy::default(),
        blob,
        documents,
        config,
    ))
}

fn run_pipeline(args: RunArgs, output_mode: OutputMode) -> miette::Result<()> {
    let mut config = ConfigLoader::resolve(args.config.as_deref()).into_diagnostic()?;
    if args.use_sample_data {
        config.use_sample_data = true;
    }
    if args.include_clinical {
        config.include_clinical = true;
    }
    if let Some(max_datasets) = args.max_datasets {
        config.max_datasets = max_datasets;
    }
    if let Some(project_tag) = args.project_tag {
        config.project_tag = project_tag;
    }

    let options = RunOptions::from_config(&config);
    let pipeline = build_pipeline(config)?;
    let cancel = CancelToken::new();

    match output_mode {
        OutputMode::NonInteractive => {
            let summary = pipeline
                .run(options, &cancel, &JsonOutput)
                .into_diagnostic()?;
            JsonOutput::print_run(&summary).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let summary = pipeline
                .run(options, &cancel, &TextOutput)
                .into_diagnostic()?;
            TextOutput::print_run_summary(&summary);
        }
    }
    Ok(())
}

fn run_status(args: StoreArgs, output_mode: OutputMode) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref()).into_diagnostic()?;
    let pipeline = build_pipeline(config)?;
    let status = pipeline.status().into_diagnostic()?;

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_status(&status).into_diagnostic()?,
        OutputMode::Interactive => TextOutput::print_status(&status),
    }
    Ok(())
}

fn run_report(args: ReportArgs, output_mode: OutputMode) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref()).into_diagnostic()?;
    let pipeline = build_pipeline(config)?;
    let result =
        report::summarize(pipeline.documents(), args.dataset.as_deref()).into_diagnostic()?;

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_report(&result).into_diagnostic()?,
        OutputMode::Interactive => TextOutput::print_report(&result),
    }
    Ok(())
}
