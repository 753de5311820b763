//! `recap` — fetch, normalise and summarise one engineer's GitHub activity.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{Datelike, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use recap_core::services::{FetchKind, Fetcher, Normalizer, Orchestrator, RangeOptions, Summarizer};
use recap_core::store::LAST_FETCH_DATE;
use recap_core::{
    AppConfig, BatchJobStore, CheckpointStore, ClientPool, DailyStateStore, DateStatus,
    FailedDateStore, FetchProgressStore, HostOptions, LlmRouter, PricingTable, ProviderConfig,
    UsageTracker,
};

#[derive(Debug, Parser)]
#[command(name = "recap", version, about = "Personal GitHub activity recap engine")]
struct Cli {
    /// Path of the configuration file.
    #[arg(long, global = true, default_value = "recap.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch raw activity for one date.
    Fetch(FetchArgs),
    /// Normalize raw files into activities and stats for one date.
    Normalize(NormalizeArgs),
    /// Generate summaries.
    Summarize(SummarizeArgs),
    /// Run the full pipeline (fetch → normalize → summarize) for one date.
    Run(RunArgs),
    /// Backfill a closed date range through all three stages.
    Range(RangeArgs),
    /// Continue from the last fetch checkpoint through today.
    Catchup(CatchupArgs),
    /// Ask a free-form question over recent summaries.
    Query(QueryArgs),
    /// Show checkpoints, exhausted dates and active batch jobs.
    Status,
}

#[derive(Debug, Parser)]
struct FetchArgs {
    /// Target date (YYYY-MM-DD).
    #[arg(long)]
    date: NaiveDate,

    /// Restrict to these kinds: prs, commits, issues.
    #[arg(long, value_delimiter = ',')]
    types: Vec<FetchKind>,
}

#[derive(Debug, Parser)]
struct NormalizeArgs {
    /// Target date (YYYY-MM-DD).
    #[arg(long)]
    date: NaiveDate,

    /// Add LLM intent/change-summary enrichment.
    #[arg(long)]
    enrich: bool,
}

#[derive(Debug, Parser)]
struct SummarizeArgs {
    #[command(subcommand)]
    level: SummarizeLevel,
}

#[derive(Debug, Subcommand)]
enum SummarizeLevel {
    /// Daily summary for one date.
    Daily {
        #[arg(long)]
        date: NaiveDate,
    },
    /// Weekly summary for an ISO week.
    Weekly {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        week: u32,
        #[arg(long)]
        force: bool,
    },
    /// Monthly summary.
    Monthly {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
        #[arg(long)]
        force: bool,
    },
    /// Yearly summary.
    Yearly {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Parser)]
struct RunArgs {
    /// Target date (YYYY-MM-DD).
    #[arg(long)]
    date: NaiveDate,

    /// Restrict fetching to these kinds: prs, commits, issues.
    #[arg(long, value_delimiter = ',')]
    types: Vec<FetchKind>,

    /// Add LLM enrichment during normalization.
    #[arg(long)]
    enrich: bool,
}

#[derive(Debug, Parser)]
struct RangeArgs {
    /// Start date, inclusive (YYYY-MM-DD).
    #[arg(long)]
    since: NaiveDate,

    /// End date, inclusive (YYYY-MM-DD).
    #[arg(long)]
    until: NaiveDate,

    /// Re-process dates even when they look fresh.
    #[arg(long)]
    force: bool,

    /// Restrict fetching to these kinds: prs, commits, issues.
    #[arg(long, value_delimiter = ',')]
    types: Vec<FetchKind>,

    /// Worker count for parallel per-date processing.
    #[arg(long)]
    workers: Option<usize>,

    /// Use provider batch APIs for LLM calls (cheaper, slower).
    #[arg(long)]
    batch: bool,

    /// Add LLM enrichment during normalization.
    #[arg(long)]
    enrich: bool,

    /// Also rebuild weekly summaries covering the range.
    #[arg(long)]
    weekly: bool,

    /// Also rebuild monthly summaries (implies --weekly).
    #[arg(long)]
    monthly: bool,

    /// Also rebuild yearly summaries (implies --monthly and --weekly).
    #[arg(long)]
    yearly: bool,
}

#[derive(Debug, Parser)]
struct CatchupArgs {
    /// Worker count for parallel per-date processing.
    #[arg(long)]
    workers: Option<usize>,

    /// Add LLM enrichment during normalization.
    #[arg(long)]
    enrich: bool,
}

#[derive(Debug, Parser)]
struct QueryArgs {
    /// The question to answer.
    question: String,

    /// How many months of summaries to use as context.
    #[arg(long, default_value_t = 3)]
    months_back: u32,
}

/// Everything a command might need, built once from the config.
struct App {
    config: Arc<AppConfig>,
    checkpoints: Arc<CheckpointStore>,
    daily_state: Arc<DailyStateStore>,
    failed: Arc<FailedDateStore>,
    progress: Arc<FetchProgressStore>,
    batch_jobs: Arc<BatchJobStore>,
    tracker: Arc<UsageTracker>,
}

impl App {
    fn load(config_path: &PathBuf) -> anyhow::Result<Self> {
        let config = Arc::new(
            AppConfig::load(config_path)
                .with_context(|| format!("loading {}", config_path.display()))?,
        );
        let tracker = Arc::new(UsageTracker::new(PricingTable::builtin()));
        Ok(App {
            checkpoints: Arc::new(CheckpointStore::new(config.checkpoints_path())),
            daily_state: Arc::new(DailyStateStore::new(config.daily_state_path())),
            failed: Arc::new(FailedDateStore::new(
                config.failed_dates_path(),
                config.max_fetch_retries,
            )),
            progress: Arc::new(FetchProgressStore::new(config.fetch_progress_dir())),
            batch_jobs: Arc::new(BatchJobStore::new(config.batch_jobs_path())),
            tracker,
            config,
        })
    }

    fn pool(&self) -> anyhow::Result<Arc<ClientPool>> {
        let options = HostOptions {
            search_interval: Duration::from_secs_f64(self.config.search_interval_secs),
            ..Default::default()
        };
        Ok(Arc::new(ClientPool::new(
            &self.config.host_url,
            &self.config.host_token,
            self.config.pool_size,
            options,
        )?))
    }

    fn router(&self) -> anyhow::Result<Arc<LlmRouter>> {
        let path = self
            .config
            .provider_config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("providers.toml"));
        let provider_config = ProviderConfig::load(&path)
            .with_context(|| format!("loading provider config {}", path.display()))?;
        Ok(Arc::new(
            LlmRouter::new(provider_config, Arc::clone(&self.tracker))
                .with_batch_store(Arc::clone(&self.batch_jobs)),
        ))
    }

    fn fetcher(&self) -> anyhow::Result<Arc<Fetcher>> {
        Ok(Arc::new(Fetcher::new(
            Arc::clone(&self.config),
            self.pool()?,
            Arc::clone(&self.checkpoints),
            Arc::clone(&self.daily_state),
            Arc::clone(&self.failed),
            Arc::clone(&self.progress),
        )))
    }

    fn normalizer(&self, with_llm: bool) -> anyhow::Result<Arc<Normalizer>> {
        let llm = if with_llm { Some(self.router()?) } else { None };
        Ok(Arc::new(Normalizer::new(
            Arc::clone(&self.config),
            Arc::clone(&self.checkpoints),
            Arc::clone(&self.daily_state),
            Arc::clone(&self.failed),
            llm,
        )))
    }

    fn summarizer(&self) -> anyhow::Result<Arc<Summarizer>> {
        Ok(Arc::new(Summarizer::new(
            Arc::clone(&self.config),
            Arc::clone(&self.checkpoints),
            Arc::clone(&self.daily_state),
            Arc::clone(&self.failed),
            self.router()?,
        )))
    }

    fn print_usage_report(&self) {
        let report = self.tracker.format_report();
        if report != "No LLM usage recorded." {
            println!("\n{report}");
        }
    }

    /// Per-date status table plus the exhausted-date report. Returns whether
    /// any date failed.
    fn print_outcomes(&self, outcomes: &[recap_core::DateOutcome]) -> anyhow::Result<bool> {
        let mut failed = false;
        for outcome in outcomes {
            match outcome.status {
                DateStatus::Success => println!("{}  success", outcome.date),
                DateStatus::Skipped => println!("{}  skipped", outcome.date),
                DateStatus::Failed => {
                    failed = true;
                    println!(
                        "{}  FAILED  {}",
                        outcome.date,
                        outcome.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
        }
        let exhausted = self.failed.exhausted_dates()?;
        if !exhausted.is_empty() {
            println!("\nDates that will not be retried automatically (permanent or exhausted):");
            for date in exhausted {
                println!("  {date}");
            }
        }
        Ok(failed)
    }
}

fn types_or_none(types: &[FetchKind]) -> Option<Vec<FetchKind>> {
    if types.is_empty() {
        None
    } else {
        Some(types.to_vec())
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let app = App::load(&cli.config)?;

    match cli.command {
        Command::Fetch(args) => {
            let fetcher = app.fetcher()?;
            let dir = fetcher
                .fetch(args.date, types_or_none(&args.types).as_deref())
                .await?;
            println!("fetched {} → {}", args.date, dir.display());
        }
        Command::Normalize(args) => {
            let normalizer = app.normalizer(args.enrich)?;
            let (activities, stats) = normalizer.normalize(args.date, args.enrich).await?;
            println!("normalized {} → {}", args.date, activities.display());
            println!("stats → {}", stats.display());
            app.print_usage_report();
        }
        Command::Summarize(args) => {
            let summarizer = app.summarizer()?;
            let path = match args.level {
                SummarizeLevel::Daily { date } => summarizer.daily(date).await?,
                SummarizeLevel::Weekly { year, week, force } => {
                    summarizer.weekly(year, week, force).await?
                }
                SummarizeLevel::Monthly { year, month, force } => {
                    summarizer.monthly(year, month, force).await?
                }
                SummarizeLevel::Yearly { year, force } => summarizer.yearly(year, force).await?,
            };
            println!("summary → {}", path.display());
            app.print_usage_report();
        }
        Command::Run(args) => {
            let orchestrator = Orchestrator::new(
                app.fetcher()?,
                app.normalizer(args.enrich)?,
                app.summarizer()?,
            );
            let path = orchestrator
                .run_daily(args.date, types_or_none(&args.types).as_deref(), args.enrich)
                .await?;
            println!("pipeline complete → {}", path.display());
            app.print_usage_report();
        }
        Command::Range(args) => {
            if args.since > args.until {
                println!("empty range, nothing to do");
                return Ok(ExitCode::SUCCESS);
            }
            let orchestrator = Orchestrator::new(
                app.fetcher()?,
                app.normalizer(args.enrich)?,
                app.summarizer()?,
            );
            let outcomes = orchestrator
                .run_range(
                    args.since,
                    args.until,
                    RangeOptions {
                        force: args.force,
                        types: types_or_none(&args.types),
                        max_workers: args.workers.unwrap_or(app.config.max_workers),
                        batch: args.batch,
                        enrich: args.enrich,
                        weekly: args.weekly,
                        monthly: args.monthly,
                        yearly: args.yearly,
                    },
                )
                .await?;
            let failed = app.print_outcomes(&outcomes)?;
            app.print_usage_report();
            if failed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Catchup(args) => {
            let Some(last) = app.checkpoints.get(LAST_FETCH_DATE)? else {
                bail!("no fetch checkpoint yet; run `recap range` once first");
            };
            let (since, until) = recap_core::dates::catchup_range(last);
            if since > until {
                println!("already caught up (checkpoint {last})");
                return Ok(ExitCode::SUCCESS);
            }
            println!("catching up {since}..{until}");
            let orchestrator = Orchestrator::new(
                app.fetcher()?,
                app.normalizer(args.enrich)?,
                app.summarizer()?,
            );
            let outcomes = orchestrator
                .run_range(
                    since,
                    until,
                    RangeOptions {
                        max_workers: args.workers.unwrap_or(app.config.max_workers),
                        enrich: args.enrich,
                        ..Default::default()
                    },
                )
                .await?;
            let failed = app.print_outcomes(&outcomes)?;
            app.print_usage_report();
            if failed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Query(args) => {
            let summarizer = app.summarizer()?;
            let answer = summarizer.query(&args.question, args.months_back).await?;
            println!("{answer}");
            app.print_usage_report();
        }
        Command::Status => {
            let checkpoints = app.checkpoints.all()?;
            if checkpoints.is_empty() {
                println!("no checkpoints yet");
            } else {
                println!("checkpoints:");
                for (key, value) in checkpoints {
                    println!("  {key} = {value}");
                }
            }

            let exhausted = app.failed.exhausted_dates()?;
            if exhausted.is_empty() {
                println!("no exhausted dates");
            } else {
                println!("exhausted dates:");
                for date in exhausted {
                    println!("  {date}");
                }
            }

            let today = Utc::now().date_naive();
            println!(
                "today: {today} (ISO week {}-W{:02})",
                today.iso_week().year(),
                today.iso_week().week()
            );

            let active = app.batch_jobs.active_jobs()?;
            if !active.is_empty() {
                println!("active batch jobs:");
                for job in active {
                    println!(
                        "  {} ({} / {}, {} requests, {})",
                        job.batch_id,
                        job.provider,
                        job.task,
                        job.custom_ids.len(),
                        job.status
                    );
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("recap=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
