use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use ica_orchestrator::action::{DataAction, MonitorAction};
use ica_orchestrator::batch::dispatch::DEFAULT_MAX_CONCURRENT;
use ica_orchestrator::batch::report::{write_report, DEFAULT_BATCH_OUTPUT_DIR};
use ica_orchestrator::batch::runner::{BatchPlan, DEFAULT_RESULTS_ROOT};
use ica_orchestrator::batch::sheet::read_sample_sheet;
use ica_orchestrator::batch::ItemStatus;
use ica_orchestrator::config::NotificationConfig;
use ica_orchestrator::error::PollError;
use ica_orchestrator::housekeeping::{cutoff, HousekeepingReport, ProjectData};
use ica_orchestrator::monitor::{Monitor, MonitorExit};
use ica_orchestrator::notify::Notifier;
use ica_orchestrator::params::ParameterSet;
use ica_orchestrator::pipeline::stages::{download_outputs, RetrieveStage, SubmitStage, UploadStage};
use ica_orchestrator::pipeline::{PipelineOutcome, Stage, StagePipeline};
use ica_orchestrator::platform::cli::IcaCli;
use ica_orchestrator::platform::{Platform, RunStatus};
use ica_orchestrator::poll::{StatusPoller, DEFAULT_POLL_INTERVAL_SECS};

#[derive(Parser, Debug)]
#[command(name = "ica-orchestrator")]
#[command(version = "0.1.0")]
#[command(
about = "Upload, run, retrieve and monitor analyses on the remote analysis platform",
long_about = "ica-orchestrator drives the platform command line tool: it uploads sample folders, \
starts pipelines, waits for them to finish and downloads their outputs, one sample at a time or \
a whole sample sheet at once. Monitors watch a run, project storage or project cost and send mail \
and chat alerts."
)]
struct Cli {
    /// Platform command line tool to run
    #[arg(long, env = "ICA_CLI", default_value = "ica", global = true)]
    ica_bin: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process every sample in a sample sheet
    Batch(BatchArgs),
    /// Upload a folder, run a pipeline on it and download the results
    Workflow(WorkflowArgs),
    /// Download the outputs of an analysis, waiting for it to finish first
    Download(DownloadArgs),
    /// Upload a local folder to a project
    Upload(UploadArgs),
    /// Start a pipeline on an uploaded folder and print the analysis id
    Start(StartArgs),
    /// Watch an analysis, project storage or project cost and send alerts
    Monitor(MonitorArgs),
    /// Print project storage usage as JSON
    Storage(StorageArgs),
    /// List, clean up or archive project data
    Data(DataArgs),
}

#[derive(Args, Debug)]
struct PollArgs {
    /// Seconds between status checks
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS, value_parser = parse_seconds)]
    polling_interval: u64,
    /// Give up waiting after this many seconds
    #[arg(long, value_parser = parse_seconds)]
    timeout: Option<u64>,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Name of the platform project
    project: String,
    /// Sample sheet path (CSV, YAML or JSON)
    sample_sheet: PathBuf,
    /// Maximum number of samples processed at once
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT, value_parser = parse_concurrency)]
    max_concurrent: usize,
    /// Where results.json and summary.json are written
    #[arg(long, default_value = DEFAULT_BATCH_OUTPUT_DIR)]
    output_dir: PathBuf,
    /// Per-sample outputs are downloaded to <results-dir>/<sample_id>
    #[arg(long, default_value = DEFAULT_RESULTS_ROOT)]
    results_dir: PathBuf,
    #[command(flatten)]
    poll: PollArgs,
}

#[derive(Args, Debug)]
struct WorkflowArgs {
    /// Local folder to upload
    input_folder: PathBuf,
    /// Name of the platform project
    project: String,
    /// Name of the pipeline to run
    pipeline: String,
    /// Local directory to save results
    output_dir: PathBuf,
    /// Name for the uploaded folder, defaults to the local folder name
    #[arg(long)]
    folder_name: Option<String>,
    /// JSON file containing pipeline parameters
    #[arg(long)]
    params_file: Option<PathBuf>,
    /// Name for the analysis
    #[arg(long)]
    analysis_name: Option<String>,
    #[command(flatten)]
    poll: PollArgs,
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// Name of the platform project
    project: String,
    analysis_id: String,
    /// Local directory to save results
    output_dir: PathBuf,
    /// Fail unless the analysis has already completed
    #[arg(long)]
    no_wait: bool,
    #[command(flatten)]
    poll: PollArgs,
}

#[derive(Args, Debug)]
struct MonitorArgs {
    /// Name of the platform project
    project: String,
    /// Notification config (YAML or JSON)
    #[arg(long)]
    config: PathBuf,
    #[arg(long, value_enum)]
    action: MonitorAction,
    /// Analysis to watch, required for --action pipeline
    #[arg(long)]
    analysis_id: Option<String>,
    /// Storage percent (default 90) or cost budget (required)
    #[arg(long)]
    threshold: Option<f64>,
    /// Seconds between checks, defaults depend on the action
    #[arg(long, value_parser = parse_seconds)]
    check_interval: Option<u64>,
}

#[derive(Args, Debug)]
struct StorageArgs {
    /// Name of the platform project
    project: String,
}

#[derive(Args, Debug)]
struct UploadArgs {
    /// Local folder to upload
    folder_path: PathBuf,
    /// Name of the platform project
    project: String,
    /// Name for the uploaded folder, defaults to the local folder name
    #[arg(long)]
    folder_name: Option<String>,
}

#[derive(Args, Debug)]
struct StartArgs {
    /// Name of the platform project
    project: String,
    /// Name of the pipeline to run
    pipeline: String,
    /// Path of the uploaded input folder on the platform
    input_folder: String,
    /// JSON file containing pipeline parameters
    #[arg(long)]
    params_file: Option<PathBuf>,
    /// Name for the analysis
    #[arg(long)]
    analysis_name: Option<String>,
}

#[derive(Args, Debug)]
struct DataArgs {
    /// Name of the platform project
    project: String,
    #[arg(long, value_enum)]
    action: DataAction,
    /// Only data created more than this many days ago, required for cleanup and archive
    #[arg(long)]
    days: Option<u32>,
    /// Name filter passed to the platform, for list
    #[arg(long)]
    pattern: Option<String>,
    /// Local directory archived data is downloaded to
    #[arg(long)]
    archive_dir: Option<PathBuf>,
    /// Actually delete during cleanup, which otherwise only reports what it would delete
    #[arg(long)]
    execute: bool,
}

fn parse_concurrency(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(format!("'{value}' is not a positive integer")),
    }
}

/// Zero would mean polling the platform in a tight loop
fn parse_seconds(value: &str) -> Result<u64, String> {
    match value.parse::<u64>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(format!("'{value}' is not a positive number of seconds")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("terve! starting up :)");

    let args = Cli::parse();
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            interrupt.cancel();
        }
    });

    match run(args, cancel).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli, cancel: CancellationToken) -> anyhow::Result<ExitCode> {
    let cli = IcaCli::new(&args.ica_bin);
    cli.check_installed()
        .await
        .context("platform CLI not found, install and configure it first")?;
    let platform: Arc<dyn Platform> = Arc::new(cli);

    match args.command {
        Command::Batch(batch) => run_batch(platform, batch, cancel).await,
        Command::Workflow(workflow) => run_workflow(platform, workflow, cancel).await,
        Command::Download(download) => run_download(platform, download, cancel).await,
        Command::Upload(upload) => run_upload(platform, upload).await,
        Command::Start(start) => run_start(platform, start).await,
        Command::Monitor(monitor) => run_monitor(platform, monitor, cancel).await,
        Command::Storage(storage) => run_storage(platform, storage).await,
        Command::Data(data) => run_data(platform, data).await,
    }
}

fn poller(platform: &Arc<dyn Platform>, poll: &PollArgs, cancel: &CancellationToken) -> StatusPoller {
    StatusPoller::new(platform.clone(), Duration::from_secs(poll.polling_interval), cancel.clone())
        .with_timeout(poll.timeout.map(Duration::from_secs))
}

async fn run_batch(platform: Arc<dyn Platform>, args: BatchArgs, cancel: CancellationToken) -> anyhow::Result<ExitCode> {
    let items = read_sample_sheet(&args.sample_sheet)?;
    let plan = BatchPlan {
        project: args.project,
        results_root: args.results_dir,
        concurrency: args.max_concurrent,
        poll_interval: Duration::from_secs(args.poll.polling_interval),
        timeout: args.poll.timeout.map(Duration::from_secs),
    };
    let outcome = plan.run(platform, items, cancel).await?;

    let paths = write_report(&args.output_dir, &outcome.results, &outcome.summary)?;
    println!(
        "{} samples: {} completed, {} failed. Results in {}, summary in {}",
        outcome.summary.total_count,
        outcome.summary.completed_count,
        outcome.summary.failed_count,
        paths.results.display(),
        paths.summary.display()
    );
    Ok(ExitCode::SUCCESS)
}

async fn run_workflow(platform: Arc<dyn Platform>, args: WorkflowArgs, cancel: CancellationToken) -> anyhow::Result<ExitCode> {
    let parameters = read_parameters(args.params_file.as_deref())?;
    let project_id = platform.resolve_project_id(&args.project).await?;
    let remote_name = UploadStage::remote_name_for(&args.input_folder, args.folder_name.as_deref());

    let stages: Vec<Box<dyn Stage>> = vec![
        Box::new(UploadStage {
            platform: platform.clone(),
            project_id: project_id.clone(),
            local_path: args.input_folder.clone(),
            remote_name: remote_name.clone(),
        }),
        Box::new(SubmitStage {
            platform: platform.clone(),
            project_id: project_id.clone(),
            pipeline_name: args.pipeline.clone(),
            parameters,
            analysis_name: args.analysis_name.clone(),
        }),
        Box::new(RetrieveStage {
            platform: platform.clone(),
            project_id,
            poller: poller(&platform, &args.poll, &cancel),
            output_dir: args.output_dir.clone(),
        }),
    ];

    let outcome = StagePipeline::new(stages).run(&remote_name, None).await;
    Ok(single_run("Workflow", outcome, |_| {
        println!("Workflow completed successfully! Results downloaded to: {}", args.output_dir.display())
    }))
}

/// Read a JSON object of run parameters, or start from none
fn read_parameters(path: Option<&Path>) -> anyhow::Result<ParameterSet> {
    let Some(path) = path else {
        return Ok(ParameterSet::new());
    };
    info!("Reading pipeline parameters from {}", path.display());
    let contents = fs::read_to_string(path).with_context(|| format!("can't read {}", path.display()))?;
    serde_json::from_str::<ParameterSet>(&contents)
        .with_context(|| format!("{} is not a JSON object of parameters", path.display()))
}

/// Exit code for a pipeline run outside a batch, printing its final value or its error
fn single_run(what: &str, outcome: PipelineOutcome, on_success: impl FnOnce(&str)) -> ExitCode {
    match outcome.result.status {
        ItemStatus::Completed => {
            on_success(outcome.final_value.as_deref().unwrap_or_default());
            ExitCode::SUCCESS
        }
        ItemStatus::Failed => {
            eprintln!("{what} failed: {}", outcome.result.error.unwrap_or_default());
            ExitCode::FAILURE
        }
    }
}

async fn run_upload(platform: Arc<dyn Platform>, args: UploadArgs) -> anyhow::Result<ExitCode> {
    let project_id = platform.resolve_project_id(&args.project).await?;
    let remote_name = UploadStage::remote_name_for(&args.folder_path, args.folder_name.as_deref());
    let stages: Vec<Box<dyn Stage>> = vec![Box::new(UploadStage {
        platform,
        project_id,
        local_path: args.folder_path.clone(),
        remote_name: remote_name.clone(),
    })];

    let outcome = StagePipeline::new(stages).run(&remote_name, None).await;
    Ok(single_run("Upload", outcome, |uploaded| {
        println!("Successfully uploaded {} as {}", args.folder_path.display(), uploaded)
    }))
}

/// Submit only: the analysis id is printed and nothing waits for the run
async fn run_start(platform: Arc<dyn Platform>, args: StartArgs) -> anyhow::Result<ExitCode> {
    let parameters = read_parameters(args.params_file.as_deref())?;
    let project_id = platform.resolve_project_id(&args.project).await?;
    let stages: Vec<Box<dyn Stage>> = vec![Box::new(SubmitStage {
        platform,
        project_id,
        pipeline_name: args.pipeline.clone(),
        parameters,
        analysis_name: args.analysis_name.clone(),
    })];

    let outcome = StagePipeline::new(stages).run(&args.input_folder, Some(args.input_folder.clone())).await;
    Ok(single_run("Pipeline start", outcome, |analysis_id| {
        println!("Pipeline started successfully! Analysis ID: {analysis_id}");
        println!("Watch it with: ica-orchestrator monitor {} --action pipeline --analysis-id {analysis_id} --config <file>", args.project);
    }))
}

async fn run_download(platform: Arc<dyn Platform>, args: DownloadArgs, cancel: CancellationToken) -> anyhow::Result<ExitCode> {
    let project_id = platform.resolve_project_id(&args.project).await?;

    let folder_id = match args.no_wait {
        true => {
            let run = platform.get_run_status(&args.analysis_id).await?;
            match (run.status, run.output_location_id) {
                (RunStatus::Completed, Some(folder_id)) => folder_id,
                (RunStatus::Completed, None) => return Err(PollError::Inconsistent { run_id: run.id }.into()),
                (status, _) => bail!("analysis {} is {}, not COMPLETED", args.analysis_id, status),
            }
        }
        false => poller(&platform, &args.poll, &cancel).await_terminal(&args.analysis_id).await?,
    };

    let written = download_outputs(platform.as_ref(), &project_id, &folder_id, &args.output_dir).await?;
    println!("Downloaded {} files to {}", written.len(), args.output_dir.display());
    Ok(ExitCode::SUCCESS)
}

/// What a monitor process was asked to watch, validated before anything is contacted
enum Watch {
    Run(String),
    Storage(f64),
    Costs(f64),
}

fn check_threshold(threshold: f64) -> anyhow::Result<f64> {
    match threshold.is_finite() && threshold >= 0.0 {
        true => Ok(threshold),
        false => bail!("--threshold must be a non-negative number, got {threshold}"),
    }
}

async fn run_monitor(platform: Arc<dyn Platform>, args: MonitorArgs, cancel: CancellationToken) -> anyhow::Result<ExitCode> {
    let watch = match args.action {
        MonitorAction::Pipeline => Watch::Run(
            args.analysis_id.clone().ok_or_else(|| anyhow!("--analysis-id is required for pipeline monitoring"))?,
        ),
        MonitorAction::Storage => Watch::Storage(check_threshold(args.threshold.unwrap_or(90.0))?),
        MonitorAction::Costs => Watch::Costs(check_threshold(
            args.threshold.ok_or_else(|| anyhow!("--threshold is required for cost monitoring"))?,
        )?),
    };

    let config = NotificationConfig::from_file(&args.config)?;
    let notifier = Arc::new(Notifier::from_config(&config)?);
    let interval = Duration::from_secs(args.check_interval.unwrap_or(args.action.default_interval_secs()));
    info!("Monitoring {} of project {} every {:?}", args.action, args.project, interval);

    let monitor = Monitor::for_project(platform, &args.project, notifier, interval, cancel).await?;
    match watch {
        Watch::Run(run_id) => match monitor.watch_run(&run_id).await {
            MonitorExit::Finished(RunStatus::Completed) => Ok(ExitCode::SUCCESS),
            MonitorExit::Finished(status) => {
                eprintln!("Analysis {run_id} finished with status {status}");
                Ok(ExitCode::FAILURE)
            }
            MonitorExit::QueryFailed(message) => {
                eprintln!("Failed to get analysis status: {message}");
                Ok(ExitCode::FAILURE)
            }
            MonitorExit::Cancelled => {
                eprintln!("Monitoring cancelled before analysis {run_id} finished");
                Ok(ExitCode::FAILURE)
            }
        },
        Watch::Storage(threshold) => {
            monitor.watch_storage(threshold).await;
            Ok(ExitCode::SUCCESS)
        }
        Watch::Costs(threshold) => {
            monitor.watch_costs(threshold).await;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_storage(platform: Arc<dyn Platform>, args: StorageArgs) -> anyhow::Result<ExitCode> {
    let project_id = platform.resolve_project_id(&args.project).await?;
    let usage = platform.get_storage_usage(&project_id).await?;
    let report = json!({
        "used_gb": usage.used_gb,
        "total_gb": usage.total_gb,
        "usage_percent": usage.usage_percent(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}

/// Housekeeping asked of `data`, validated before the project is resolved
enum Chore {
    List(Option<DateTime<Utc>>),
    Cleanup(DateTime<Utc>),
    Archive(DateTime<Utc>, PathBuf),
}

async fn run_data(platform: Arc<dyn Platform>, args: DataArgs) -> anyhow::Result<ExitCode> {
    let older_than = args.days.map(|days| cutoff(days, Utc::now()));
    let required = || older_than.ok_or_else(|| anyhow!("--days is required for {}", args.action));
    let chore = match args.action {
        DataAction::List => Chore::List(older_than),
        DataAction::Cleanup => Chore::Cleanup(required()?),
        DataAction::Archive => Chore::Archive(
            required()?,
            args.archive_dir.clone().ok_or_else(|| anyhow!("--archive-dir is required for archive"))?,
        ),
    };

    let data = ProjectData::open(platform, &args.project).await?;
    let report = match chore {
        Chore::List(older_than) => {
            let entries = data.list(older_than, args.pattern.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(ExitCode::SUCCESS);
        }
        Chore::Cleanup(older_than) => {
            let report = data.cleanup(older_than, !args.execute).await?;
            match report.dry_run {
                true => println!("Would delete {} items, rerun with --execute to delete them", report.processed.len()),
                false => println!("Deleted {} items", report.processed.len()),
            }
            report
        }
        Chore::Archive(older_than, archive_dir) => {
            let report = data.archive(older_than, &archive_dir).await?;
            println!("Archived {} items to {}", report.processed.len(), archive_dir.display());
            report
        }
    };
    Ok(housekeeping_exit(&report))
}

fn housekeeping_exit(report: &HousekeepingReport) -> ExitCode {
    for (name, err) in &report.failed {
        eprintln!("Failed on {name}: {err}");
    }
    match report.is_clean() {
        true => ExitCode::SUCCESS,
        false => ExitCode::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_batch_defaults() {
        let cli = Cli::try_parse_from(["ica-orchestrator", "batch", "Exomes", "samples.csv"]).expect("parses");
        match cli.command {
            Command::Batch(args) => {
                assert_eq!(args.max_concurrent, 5);
                assert_eq!(args.output_dir, PathBuf::from("batch_results"));
                assert_eq!(args.results_dir, PathBuf::from("results"));
                assert_eq!(args.poll.polling_interval, 60);
                assert_eq!(args.poll.timeout, None);
            }
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let result = Cli::try_parse_from(["ica-orchestrator", "batch", "Exomes", "s.csv", "--max-concurrent", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        for args in [
            vec!["ica-orchestrator", "batch", "Exomes", "s.csv", "--polling-interval", "0"],
            vec!["ica-orchestrator", "download", "Exomes", "abc", "out", "--timeout", "0"],
            vec!["ica-orchestrator", "monitor", "Exomes", "--config", "n.yaml", "--action", "storage", "--check-interval", "0"],
        ] {
            assert!(Cli::try_parse_from(&args).is_err(), "{args:?}");
        }
    }

    #[test]
    fn test_upload_and_start_arguments() {
        let cli = Cli::try_parse_from(["ica-orchestrator", "upload", "/data/S1", "Exomes", "--folder-name", "S1-run2"]).expect("parses");
        match cli.command {
            Command::Upload(args) => {
                assert_eq!(args.folder_path, PathBuf::from("/data/S1"));
                assert_eq!(args.folder_name.as_deref(), Some("S1-run2"));
            }
            other => panic!("expected upload, got {other:?}"),
        }

        let cli = Cli::try_parse_from(["ica-orchestrator", "start", "Exomes", "dragen-germline", "/S1", "--analysis-name", "S1"])
            .expect("parses");
        match cli.command {
            Command::Start(args) => {
                assert_eq!(args.pipeline, "dragen-germline");
                assert_eq!(args.input_folder, "/S1");
                assert_eq!(args.params_file, None);
            }
            other => panic!("expected start, got {other:?}"),
        }
    }

    #[test]
    fn test_data_arguments() {
        let cli = Cli::try_parse_from(["ica-orchestrator", "data", "Exomes", "--action", "cleanup", "--days", "90"]).expect("parses");
        match cli.command {
            Command::Data(args) => {
                assert_eq!(args.action, DataAction::Cleanup);
                assert_eq!(args.days, Some(90));
                assert!(!args.execute);
            }
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[test]
    fn test_monitor_arguments() {
        let cli = Cli::try_parse_from([
            "ica-orchestrator", "monitor", "Exomes", "--config", "notify.yaml",
            "--action", "costs", "--threshold", "1500", "--check-interval", "600",
        ]).expect("parses");
        match cli.command {
            Command::Monitor(args) => {
                assert_eq!(args.action, MonitorAction::Costs);
                assert_eq!(args.threshold, Some(1500.0));
                assert_eq!(args.check_interval, Some(600));
            }
            other => panic!("expected monitor, got {other:?}"),
        }
    }
}
