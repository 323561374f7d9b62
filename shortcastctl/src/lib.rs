use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use shortcast_core::media::{MediaSettings, MediaToolkit};
use shortcast_core::pipeline::{
    AssetUploader, DirectoryUploader, Orchestrator, OrchestratorSettings, PipelineError, Workspace,
};
use shortcast_core::providers::ProviderSet;
use shortcast_core::timing::{
    render_ass, render_srt, segment_script, CaptionStyle, CaptionTiming, DurationDecision,
    DurationPolicy,
};
use shortcast_core::{
    display_filename, load_config, Emotion, EmotionVector, Job, JobFilter, JobRequest, JobStage,
    JobStatus, ShortcastConfig, SqliteJobStore, VideoStyle,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] shortcast_core::ConfigError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("job store error: {0}")]
    Job(#[from] shortcast_core::JobError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("required resource missing: {0}")]
    MissingResource(String),
    #[error("job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },
}

impl From<shortcast_core::ProviderError> for AppError {
    fn from(err: shortcast_core::ProviderError) -> Self {
        AppError::Pipeline(err.into())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Short vertical video renderer", long_about = None)]
pub struct Cli {
    /// Path to shortcast.toml
    #[arg(long, default_value = "configs/shortcast.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Renders a script into a finished video and waits for it
    Render(RenderArgs),
    /// Shows the stored status of one job
    Status(JobIdArgs),
    /// Lists recent jobs
    Jobs(JobsArgs),
    /// Previews which clip length a narration would get
    PlanDuration(PlanDurationArgs),
    /// Prints the caption track a script would get
    Captions(CaptionsArgs),
    /// Deletes every file belonging to a job
    Cleanup(JobIdArgs),
    /// Prints shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Text file holding the narration script
    pub script: PathBuf,
    /// Title shown on the banner
    #[arg(long)]
    pub title: String,
    /// Job identifier; generated when omitted
    #[arg(long)]
    pub id: Option<String>,
    #[arg(long, value_enum, default_value_t = StyleArg::Informative)]
    pub style: StyleArg,
    /// Emotion intensity as name=value (0-100), repeatable
    #[arg(long = "emotion", value_parser = parse_emotion)]
    pub emotions: Vec<(Emotion, u8)>,
    /// Give up waiting after this many seconds
    #[arg(long, default_value_t = 1800)]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StyleArg {
    Emotive,
    Informative,
}

impl From<StyleArg> for VideoStyle {
    fn from(style: StyleArg) -> Self {
        match style {
            StyleArg::Emotive => VideoStyle::Emotive,
            StyleArg::Informative => VideoStyle::Informative,
        }
    }
}

#[derive(Args, Debug)]
pub struct JobIdArgs {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct JobsArgs {
    /// Only jobs in this stage
    #[arg(long)]
    pub stage: Option<String>,
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct PlanDurationArgs {
    /// Measured narration length
    #[arg(required_unless_present = "words", conflicts_with = "words")]
    pub seconds: Option<f64>,
    /// Estimate the narration from a word count instead
    #[arg(long)]
    pub words: Option<usize>,
}

#[derive(Args, Debug)]
pub struct CaptionsArgs {
    /// Text file holding the narration script
    pub script: PathBuf,
    /// Narration length in seconds
    #[arg(long)]
    pub duration: f64,
    #[arg(long = "format", value_enum, default_value_t = CaptionFormat::Srt)]
    pub caption_format: CaptionFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CaptionFormat {
    Ass,
    Srt,
    Json,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}

fn parse_emotion(value: &str) -> std::result::Result<(Emotion, u8), String> {
    let (name, level) = value
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {value:?}"))?;
    let emotion = Emotion::ALL
        .into_iter()
        .find(|emotion| emotion.as_str() == name.trim())
        .ok_or_else(|| format!("unknown emotion {name:?}"))?;
    let level: u8 = level
        .trim()
        .parse()
        .map_err(|_| format!("invalid intensity {level:?}"))?;
    if level > 100 {
        return Err(format!("intensity {level} is above 100"));
    }
    Ok((emotion, level))
}

pub async fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions(args) = &cli.command {
        let mut command = Cli::command();
        let name = command.get_name().to_string();
        clap_complete::generate(args.shell, &mut command, name, &mut io::stdout());
        return Ok(());
    }

    let context = AppContext::new(&cli)?;
    match &cli.command {
        Commands::Render(args) => {
            let report = context.render_video(args, cli.format).await?;
            render(&report, cli.format)?;
            if let Some(message) = report.error {
                return Err(AppError::JobFailed {
                    job_id: report.job_id,
                    message,
                });
            }
        }
        Commands::Status(args) => {
            let status = context.status(&args.id)?;
            render(&status, cli.format)?;
        }
        Commands::Jobs(args) => {
            let list = context.jobs(args)?;
            render(&list, cli.format)?;
        }
        Commands::PlanDuration(args) => {
            let plan = context.plan_duration(args)?;
            render(&plan, cli.format)?;
        }
        Commands::Captions(args) => {
            println!("{}", context.captions(args)?);
        }
        Commands::Cleanup(args) => {
            let report = context.cleanup(&args.id);
            render(&report, cli.format)?;
        }
        Commands::Completions(_) => {}
    }
    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: ShortcastConfig,
    store: SqliteJobStore,
    workspace: Workspace,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config = load_config(&cli.config)?;
        let context = Self::from_config(config)?;
        if let Some(parent) = context.store.path().parent() {
            fs::create_dir_all(parent)?;
        }
        context.store.initialize()?;
        Ok(context)
    }

    fn from_config(config: ShortcastConfig) -> Result<Self> {
        let store = SqliteJobStore::builder()
            .path(config.database_path())
            .create_if_missing(true)
            .build()?;
        let workspace = Workspace::from_config(&config.paths);
        Ok(Self {
            config,
            store,
            workspace,
        })
    }

    async fn render_video(&self, args: &RenderArgs, format: OutputFormat) -> Result<RenderReport> {
        let script = fs::read_to_string(&args.script).map_err(|err| {
            AppError::MissingResource(format!("{}: {err}", args.script.display()))
        })?;
        let emotions = args
            .emotions
            .iter()
            .fold(EmotionVector::default(), |vector, (emotion, level)| {
                vector.with(*emotion, *level)
            });
        let request = match &args.id {
            Some(id) => JobRequest::new(id.clone(), args.title.clone(), script),
            None => JobRequest::generated(args.title.clone(), script),
        }
        .with_style(args.style.into())
        .with_emotions(emotions);

        let providers = ProviderSet::from_config(&self.config.providers)?;
        let media = MediaToolkit::new(MediaSettings::from_config(&self.config));
        let settings = OrchestratorSettings::from_config(&self.config)?;
        let mut builder = Orchestrator::builder(
            self.store.clone(),
            self.workspace.clone(),
            media,
            providers,
            settings,
        );
        if let Some(dir) = &self.config.paths.upload_dir {
            let uploader: Arc<dyn AssetUploader> = Arc::new(DirectoryUploader::new(dir));
            builder = builder.uploader(uploader);
        }
        if format == OutputFormat::Text {
            builder = builder.listener(Arc::new(|status: &JobStatus| {
                eprintln!("[{:>3}%] {}", status.progress, status.current_step);
            }));
        }
        let orchestrator = builder.start().await?;

        let accepted = orchestrator.submit(request).await?;
        info!(job_id = %accepted.project_id, "render submitted");
        let status = orchestrator
            .wait_for_terminal(
                &accepted.project_id,
                Duration::from_millis(500),
                Duration::from_secs(args.timeout_seconds),
            )
            .await?;
        if !status.stage.terminal() {
            return Err(AppError::MissingResource(format!(
                "job {} still {} after {}s",
                status.project_id, status.stage, args.timeout_seconds
            )));
        }
        orchestrator.shutdown().await;

        let mut report = RenderReport {
            job_id: status.project_id.clone(),
            stage: status.stage,
            progress: status.progress,
            error: status.error.clone(),
            asset_path: None,
            display_name: None,
            remote_location: None,
        };
        if status.stage == JobStage::Complete {
            let asset = orchestrator.fetch_result(&status.project_id).await?;
            report.asset_path = Some(asset.path);
            report.display_name = Some(asset.display_name);
            report.remote_location = asset.remote_location;
        }
        Ok(report)
    }

    fn status(&self, job_id: &str) -> Result<StatusView> {
        let status = self
            .store
            .fetch_status(job_id)?
            .ok_or_else(|| AppError::MissingResource(format!("job {job_id}")))?;
        Ok(StatusView(status))
    }

    fn jobs(&self, args: &JobsArgs) -> Result<JobList> {
        let stage = args
            .stage
            .as_deref()
            .map(str::parse::<JobStage>)
            .transpose()?;
        let jobs = self.store.list(&JobFilter {
            stage,
            limit: Some(args.limit),
        })?;
        Ok(JobList {
            rows: jobs.into_iter().map(JobRow::from).collect(),
        })
    }

    fn plan_duration(&self, args: &PlanDurationArgs) -> Result<DurationPlan> {
        let policy = DurationPolicy::from_config(&self.config.pipeline)?;
        let (seconds, estimated) = match (args.seconds, args.words) {
            (Some(seconds), _) => (seconds, false),
            (None, Some(words)) => (policy.estimate(words), true),
            (None, None) => {
                return Err(AppError::MissingResource(
                    "pass a duration or --words".to_string(),
                ))
            }
        };
        Ok(DurationPlan {
            seconds,
            estimated,
            tiers: policy.tiers().to_vec(),
            decision: policy.decide(seconds),
        })
    }

    fn captions(&self, args: &CaptionsArgs) -> Result<String> {
        let script = fs::read_to_string(&args.script).map_err(|err| {
            AppError::MissingResource(format!("{}: {err}", args.script.display()))
        })?;
        let timing = CaptionTiming::from(&self.config.captions);
        let segments = segment_script(&script, args.duration, &timing);
        debug!(segments = segments.len(), "segmented script");
        Ok(match args.caption_format {
            CaptionFormat::Ass => render_ass(&segments, &CaptionStyle::from(&self.config.compositor)),
            CaptionFormat::Srt => render_srt(&segments),
            CaptionFormat::Json => serde_json::to_string_pretty(&segments)?,
        })
    }

    fn cleanup(&self, job_id: &str) -> CleanupReport {
        let removed = self.workspace.cleanup(job_id);
        if let Err(err) = self.store.clear_asset(job_id) {
            debug!(job_id, error = %err, "could not clear asset path");
        }
        CleanupReport {
            job_id: job_id.to_string(),
            removed,
        }
    }
}

#[derive(Debug, Serialize)]
struct RenderReport {
    job_id: String,
    stage: JobStage,
    progress: u8,
    error: Option<String>,
    asset_path: Option<PathBuf>,
    display_name: Option<String>,
    remote_location: Option<String>,
}

impl DisplayFallback for RenderReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Job {} - {} ({}%)",
            self.job_id, self.stage, self.progress
        )];
        if let Some(error) = &self.error {
            lines.push(format!("  error: {error}"));
        }
        if let Some(path) = &self.asset_path {
            lines.push(format!("  asset: {}", path.display()));
        }
        if let Some(name) = &self.display_name {
            lines.push(format!("  download as: {name}"));
        }
        if let Some(remote) = &self.remote_location {
            lines.push(format!("  published: {remote}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct StatusView(JobStatus);

impl DisplayFallback for StatusView {
    fn display(&self) -> String {
        let status = &self.0;
        let mut line = format!(
            "{} [{}] {}% - {}",
            status.project_id, status.stage, status.progress, status.current_step
        );
        if let Some(error) = &status.error {
            line.push_str(&format!("\n  error: {error}"));
        }
        line
    }
}

#[derive(Debug, Serialize)]
struct JobList {
    rows: Vec<JobRow>,
}

#[derive(Debug, Serialize)]
struct JobRow {
    job_id: String,
    title: String,
    stage: JobStage,
    progress: u8,
    display_name: String,
    asset_path: Option<PathBuf>,
    created_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobRow {
    fn from(job: Job) -> Self {
        Self {
            display_name: display_filename(&job.title),
            job_id: job.id,
            title: job.title,
            stage: job.stage,
            progress: job.progress,
            asset_path: job.asset_path,
            created_at: job.created_at,
        }
    }
}

impl DisplayFallback for JobList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "No jobs".to_string();
        }
        let mut lines = vec!["Jobs:".to_string()];
        for row in &self.rows {
            let created = row
                .created_at
                .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!(
                "- {} [{}] {}% {} ({created})",
                row.job_id, row.stage, row.progress, row.title
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
struct DurationPlan {
    seconds: f64,
    estimated: bool,
    tiers: Vec<u32>,
    decision: DurationDecision,
}

impl DisplayFallback for DurationPlan {
    fn display(&self) -> String {
        let source = if self.estimated { "estimated" } else { "measured" };
        let mut lines = vec![format!(
            "Narration {:.2}s ({source}) -> {}s clip",
            self.seconds, self.decision.clip_seconds
        )];
        if self.decision.extension_needed > 0.0 {
            lines.push(format!(
                "  freeze frame: {:.2}s",
                self.decision.extension_needed
            ));
        }
        if let Some(message) = &self.decision.message {
            lines.push(format!("  warning: {message}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
struct CleanupReport {
    job_id: String,
    removed: usize,
}

impl DisplayFallback for CleanupReport {
    fn display(&self) -> String {
        format!("Removed {} file(s) for job {}", self.removed, self.job_id)
    }
}
