//! The summarise stage: Markdown reports at four levels plus ad-hoc query.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::dates::{date_range, fmt_date, month_bounds, week_bounds, weeks_overlapping_month};
use crate::error::{RecapError, StorageError, SummarizeError};
use crate::files;
use crate::llm::router::{LlmRouter, RouterBatchRequest};
use crate::llm::ChatOptions;
use crate::models::{Activity, DailyStats, DateOutcome};
use crate::prompts;
use crate::store::{
    CheckpointStore, DailyStateStore, FailedDateStore, Stage, LAST_SUMMARIZE_DATE,
};

const SEPARATOR: &str = "\n\n---\n\n";
const BODY_LIMIT: usize = 1000;
const DISCUSSION_LIMIT: usize = 500;
const DISCUSSION_ITEMS: usize = 3;
const FILE_LIST_LIMIT: usize = 8;
const PATCH_FILE_LIMIT: usize = 8;
const PATCH_CHAR_LIMIT: usize = 1000;
const PATCH_BUDGET: usize = 8000;
const CONTEXT_LIMIT: usize = 10;

/// The summarise stage service.
pub struct Summarizer {
    config: Arc<AppConfig>,
    checkpoints: Arc<CheckpointStore>,
    daily_state: Arc<DailyStateStore>,
    failed: Arc<FailedDateStore>,
    llm: Arc<LlmRouter>,
}

impl Summarizer {
    pub fn new(
        config: Arc<AppConfig>,
        checkpoints: Arc<CheckpointStore>,
        daily_state: Arc<DailyStateStore>,
        failed: Arc<FailedDateStore>,
        llm: Arc<LlmRouter>,
    ) -> Self {
        Summarizer {
            config,
            checkpoints,
            daily_state,
            failed,
            llm,
        }
    }

    // ── Daily ───────────────────────────────────────────────────────────────

    /// Generate the daily Markdown summary for one date.
    pub async fn daily(&self, date: NaiveDate) -> Result<PathBuf, RecapError> {
        let (system, user) = self.prepare_daily_prompt(date)?;
        let text = self
            .llm
            .chat(
                &system,
                &user,
                "daily",
                ChatOptions {
                    cache_system_prompt: true,
                    ..Default::default()
                },
            )
            .await
            .map_err(RecapError::from)?;

        let path = self.config.daily_summary_path(date);
        write_markdown(&path, &text)?;
        self.record_date_success(date)?;
        info!(date = %date, path = %path.display(), "daily summary written");
        Ok(path)
    }

    /// Summarise a closed date range with the same skip/force/retry
    /// discipline as the other stages.
    pub async fn daily_range(
        &self,
        since: NaiveDate,
        until: NaiveDate,
        force: bool,
        max_workers: usize,
        batch: bool,
    ) -> Result<Vec<DateOutcome>, RecapError> {
        if since > until {
            return Ok(Vec::new());
        }
        let dates = date_range(since, until);
        info!(
            since = %since,
            until = %until,
            dates = dates.len(),
            force,
            max_workers,
            batch,
            "daily_range"
        );

        let work = self.work_set(&dates, force)?;
        let mut outcomes: Vec<DateOutcome> = dates
            .iter()
            .filter(|d| !work.contains(d))
            .map(|d| DateOutcome::skipped(fmt_date(*d)))
            .collect();

        if batch {
            outcomes.extend(self.daily_batch(work).await);
        } else {
            let workers = max_workers.max(1);
            let processed: Vec<DateOutcome> =
                stream::iter(work.into_iter().map(|date| async move {
                    match self.daily(date).await {
                        Ok(_) => self.date_success(date),
                        Err(e) => self.date_failure(date, e),
                    }
                }))
                .buffer_unordered(workers)
                .collect()
                .await;
            outcomes.extend(processed);
        }

        outcomes.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(outcomes)
    }

    /// Batch path: every day prompt goes into one provider batch keyed
    /// `daily-{date}`, responses are distributed to per-day files.
    async fn daily_batch(&self, work: Vec<NaiveDate>) -> Vec<DateOutcome> {
        let mut outcomes = Vec::new();
        let mut requests = Vec::new();
        let mut prepared: Vec<NaiveDate> = Vec::new();

        for date in work {
            match self.prepare_daily_prompt(date) {
                Ok((system, user)) => {
                    requests.push(RouterBatchRequest {
                        custom_id: format!("daily-{}", fmt_date(date)),
                        system_prompt: system,
                        user_content: user,
                        json_mode: false,
                        max_tokens: None,
                        cache_system_prompt: true,
                    });
                    prepared.push(date);
                }
                Err(e) => outcomes.push(self.date_failure(date, e)),
            }
        }
        if prepared.is_empty() {
            return outcomes;
        }

        let size = requests.len();
        let results = async {
            let batch_id = self.llm.submit_batch(requests, "daily").await?;
            self.llm.wait_for_batch(&batch_id, "daily", size).await
        }
        .await;

        let results = match results {
            Ok(results) => results,
            Err(e) => {
                // The whole batch failing fails every prepared date.
                let message = e.to_string();
                let error: RecapError = e.into();
                for date in prepared {
                    warn!(date = %date, error = message, "batch summary failed");
                    if let Err(store_err) =
                        self.failed.record_failure(date, Stage::Summarize, &error)
                    {
                        warn!(error = %store_err, "could not record failure");
                    }
                    outcomes.push(DateOutcome::failed(fmt_date(date), message.clone()));
                }
                return outcomes;
            }
        };

        let by_id: std::collections::BTreeMap<String, Result<String, String>> = results
            .into_iter()
            .map(|r| {
                let value = match (r.content, r.error) {
                    (Some(content), _) => Ok(content),
                    (None, error) => Err(error.unwrap_or_else(|| "missing content".into())),
                };
                (r.custom_id, value)
            })
            .collect();

        for date in prepared {
            let custom_id = format!("daily-{}", fmt_date(date));
            match by_id.get(&custom_id) {
                Some(Ok(text)) => {
                    let written = write_markdown(&self.config.daily_summary_path(date), text)
                        .map_err(RecapError::from)
                        .and_then(|_| self.record_date_success(date));
                    match written {
                        Ok(()) => outcomes.push(DateOutcome::success(fmt_date(date))),
                        Err(e) => outcomes.push(self.date_failure(date, e)),
                    }
                }
                Some(Err(error)) => {
                    let e: RecapError = SummarizeError::NoContext(error.clone()).into();
                    outcomes.push(self.date_failure(date, e));
                }
                None => {
                    let e: RecapError =
                        SummarizeError::NoContext(format!("batch returned no entry for {custom_id}"))
                            .into();
                    outcomes.push(self.date_failure(date, e));
                }
            }
        }
        outcomes
    }

    fn prepare_daily_prompt(&self, date: NaiveDate) -> Result<(String, String), RecapError> {
        let norm_dir = self.config.date_normalized_dir(date);
        let activities_path = norm_dir.join("activities.jsonl");
        let stats_path = norm_dir.join("stats.json");
        if !activities_path.exists() {
            return Err(SummarizeError::MissingInput(activities_path).into());
        }
        if !stats_path.exists() {
            return Err(SummarizeError::MissingInput(stats_path).into());
        }

        let activities: Vec<Activity> = files::load_jsonl(&activities_path)?;
        let stats: DailyStats = files::load_json(&stats_path)?;
        let stats_json =
            serde_json::to_string_pretty(&stats).expect("stats serializes");

        let prompt = prompts::load_split(
            &self.config.prompts_dir,
            "daily.md",
            &[("date", fmt_date(date)), ("stats", stats_json)],
        )?;
        let body = format_activities(&activities);
        let user = if prompt.user.is_empty() {
            body
        } else {
            format!("{}\n\n{body}", prompt.user)
        };
        Ok((prompt.system, user))
    }

    fn work_set(&self, dates: &[NaiveDate], force: bool) -> Result<Vec<NaiveDate>, RecapError> {
        let candidates = if force {
            dates.to_vec()
        } else {
            let mut set = self.daily_state.stale_dates(Stage::Summarize, dates)?;
            for d in self.failed.failed_retryable_dates(dates)? {
                if !set.contains(&d) {
                    set.push(d);
                }
            }
            set.sort();
            set
        };
        Ok(self.failed.retryable_dates(&candidates)?)
    }

    fn record_date_success(&self, date: NaiveDate) -> Result<(), RecapError> {
        self.checkpoints.update(LAST_SUMMARIZE_DATE, date)?;
        self.daily_state.set_timestamp(Stage::Summarize, date)?;
        self.failed.record_success(date, Stage::Summarize)?;
        Ok(())
    }

    fn date_success(&self, date: NaiveDate) -> DateOutcome {
        DateOutcome::success(fmt_date(date))
    }

    fn date_failure(&self, date: NaiveDate, error: RecapError) -> DateOutcome {
        warn!(date = %date, error = %error, "summarize failed for date");
        if let Err(e) = self.failed.record_failure(date, Stage::Summarize, &error) {
            warn!(error = %e, "could not record failure");
        }
        DateOutcome::failed(fmt_date(date), error.to_string())
    }

    // ── Higher levels ───────────────────────────────────────────────────────

    /// Weekly summary over the ISO week's daily Markdowns.
    pub async fn weekly(&self, year: i32, week: u32, force: bool) -> Result<PathBuf, RecapError> {
        let output = self.config.weekly_summary_path(year, week);
        let inputs = self.daily_paths_for_week(year, week);
        if !force && !is_stale_output(&output, &inputs) {
            info!(path = %output.display(), "weekly summary fresh, skipping");
            return Ok(output);
        }

        let contents = read_all(&inputs);
        if contents.is_empty() {
            return Err(
                SummarizeError::NoContext(format!("no daily summaries for {year}-W{week:02}"))
                    .into(),
            );
        }

        let prompt = prompts::load_split(
            &self.config.prompts_dir,
            "weekly.md",
            &[("year", year.to_string()), ("week", format!("{week:02}"))],
        )?;
        let text = self
            .chat_level(&prompt.system, &prompt.user, &contents, "weekly")
            .await?;
        write_markdown(&output, &text)?;
        info!(path = %output.display(), "weekly summary written");
        Ok(output)
    }

    /// Monthly summary over the weekly summaries overlapping the month.
    pub async fn monthly(
        &self,
        year: i32,
        month: u32,
        force: bool,
    ) -> Result<PathBuf, RecapError> {
        let output = self.config.monthly_summary_path(year, month);
        let inputs = self.weekly_paths_for_month(year, month);
        if !force && !is_stale_output(&output, &inputs) {
            info!(path = %output.display(), "monthly summary fresh, skipping");
            return Ok(output);
        }

        let contents = read_all(&inputs);
        if contents.is_empty() {
            return Err(SummarizeError::NoContext(format!(
                "no weekly summaries for {year}-{month:02}"
            ))
            .into());
        }

        let prompt = prompts::load_split(
            &self.config.prompts_dir,
            "monthly.md",
            &[
                ("year", year.to_string()),
                ("month", format!("{month:02}")),
            ],
        )?;
        let text = self
            .chat_level(&prompt.system, &prompt.user, &contents, "monthly")
            .await?;
        write_markdown(&output, &text)?;
        info!(path = %output.display(), "monthly summary written");
        Ok(output)
    }

    /// Yearly summary over the twelve monthly summaries.
    pub async fn yearly(&self, year: i32, force: bool) -> Result<PathBuf, RecapError> {
        let output = self.config.yearly_summary_path(year);
        let inputs: Vec<PathBuf> = (1..=12)
            .map(|m| self.config.monthly_summary_path(year, m))
            .collect();
        if !force && !is_stale_output(&output, &inputs) {
            info!(path = %output.display(), "yearly summary fresh, skipping");
            return Ok(output);
        }

        let contents = read_all(&inputs);
        if contents.is_empty() {
            return Err(
                SummarizeError::NoContext(format!("no monthly summaries for {year}")).into(),
            );
        }

        let prompt = prompts::load_split(
            &self.config.prompts_dir,
            "yearly.md",
            &[("year", year.to_string())],
        )?;
        let text = self
            .chat_level(&prompt.system, &prompt.user, &contents, "yearly")
            .await?;
        write_markdown(&output, &text)?;
        info!(path = %output.display(), "yearly summary written");
        Ok(output)
    }

    /// Free-form question over the most recent summaries. Returns the answer
    /// rather than a file.
    pub async fn query(&self, question: &str, months_back: u32) -> Result<String, RecapError> {
        let context = self.collect_recent_context(months_back);
        if context.is_empty() {
            return Err(
                SummarizeError::NoContext("no summary data available for query".into()).into(),
            );
        }

        let prompt = prompts::load_split(&self.config.prompts_dir, "query.md", &[])?;
        let user = format!("## Context\n\n{context}\n\n## Question\n\n{question}");
        let user = if prompt.user.is_empty() {
            user
        } else {
            format!("{}\n\n{user}", prompt.user)
        };
        self.llm
            .chat(
                &prompt.system,
                &user,
                "query",
                ChatOptions {
                    cache_system_prompt: true,
                    ..Default::default()
                },
            )
            .await
            .map_err(RecapError::from)
    }

    async fn chat_level(
        &self,
        system: &str,
        user_prefix: &str,
        contents: &[String],
        task: &str,
    ) -> Result<String, RecapError> {
        let joined = contents.join(SEPARATOR);
        let user = if user_prefix.is_empty() {
            joined
        } else {
            format!("{user_prefix}\n\n{joined}")
        };
        self.llm
            .chat(
                system,
                &user,
                task,
                ChatOptions {
                    cache_system_prompt: true,
                    ..Default::default()
                },
            )
            .await
            .map_err(RecapError::from)
    }

    // ── Input discovery ─────────────────────────────────────────────────────

    fn daily_paths_for_week(&self, year: i32, week: u32) -> Vec<PathBuf> {
        let Some((monday, sunday)) = week_bounds(year, week) else {
            return Vec::new();
        };
        date_range(monday, sunday)
            .into_iter()
            .map(|d| self.config.daily_summary_path(d))
            .filter(|p| p.exists())
            .collect()
    }

    fn weekly_paths_for_month(&self, year: i32, month: u32) -> Vec<PathBuf> {
        weeks_overlapping_month(year, month)
            .into_iter()
            .map(|(y, w)| self.config.weekly_summary_path(y, w))
            .filter(|p| p.exists())
            .collect()
    }

    /// Recent `months_back` months of context: monthly summaries where they
    /// exist, falling back to that month's weeklies, then its dailies.
    fn collect_recent_context(&self, months_back: u32) -> String {
        let today = Utc::now().date_naive();
        let mut contents = Vec::new();
        let mut year = today.year();
        let mut month = today.month();

        for _ in 0..months_back {
            let monthly = self.config.monthly_summary_path(year, month);
            if let Ok(text) = std::fs::read_to_string(&monthly) {
                contents.push(text);
            } else {
                let weeklies = read_all(&self.weekly_paths_for_month(year, month));
                if !weeklies.is_empty() {
                    contents.extend(weeklies);
                } else if let Some((first, last)) = month_bounds(year, month) {
                    let dailies: Vec<PathBuf> = date_range(first, last.min(today))
                        .into_iter()
                        .map(|d| self.config.daily_summary_path(d))
                        .filter(|p| p.exists())
                        .collect();
                    contents.extend(read_all(&dailies));
                }
            }
            if month == 1 {
                month = 12;
                year -= 1;
            } else {
                month -= 1;
            }
        }
        contents.join(SEPARATOR)
    }
}

/// Output is stale when it does not exist or any input is newer.
fn is_stale_output(output: &Path, inputs: &[PathBuf]) -> bool {
    let Ok(output_meta) = output.metadata() else {
        return true;
    };
    let Ok(output_mtime) = output_meta.modified() else {
        return true;
    };
    inputs.iter().any(|p| {
        p.metadata()
            .and_then(|m| m.modified())
            .map(|mtime| mtime > output_mtime)
            .unwrap_or(false)
    })
}

fn read_all(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| std::fs::read_to_string(p).ok())
        .collect()
}

fn write_markdown(path: &Path, content: &str) -> Result<(), StorageError> {
    files::ensure_parent(path)?;
    std::fs::write(path, content).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max).collect();
        out.push_str("...");
        out
    }
}

/// Render the activity stream as the daily prompt's user content.
fn format_activities(activities: &[Activity]) -> String {
    if activities.is_empty() {
        return "(no activity)".to_string();
    }

    let mut blocks = Vec::with_capacity(activities.len());
    for act in activities {
        let mut block = format!(
            "- [{}] {} ({}) +{}/-{}\n  URL: {}",
            act.kind, act.title, act.repo, act.additions, act.deletions, act.url
        );
        if !act.intent.is_empty() {
            block.push_str(&format!("\n  Intent: {}", act.intent));
        }
        if !act.change_summary.is_empty() {
            block.push_str(&format!("\n  Change Summary: {}", act.change_summary));
        }
        if !act.files.is_empty() {
            let shown: Vec<&str> = act
                .files
                .iter()
                .take(FILE_LIST_LIMIT)
                .map(String::as_str)
                .collect();
            let mut line = shown.join(", ");
            if act.files.len() > FILE_LIST_LIMIT {
                line.push_str(&format!(" (+{} more)", act.files.len() - FILE_LIST_LIMIT));
            }
            block.push_str(&format!("\n  Files: {line}"));
        }
        if !act.body.trim().is_empty() {
            block.push_str(&format!("\n  Body: {}", truncate_chars(&act.body, BODY_LIMIT)));
        }
        if !act.review_bodies.is_empty() {
            let parts: Vec<String> = act
                .review_bodies
                .iter()
                .take(DISCUSSION_ITEMS)
                .map(|b| truncate_chars(b, DISCUSSION_LIMIT))
                .collect();
            block.push_str(&format!("\n  Reviews: {}", parts.join(" | ")));
        }
        if !act.comment_bodies.is_empty() {
            let parts: Vec<String> = act
                .comment_bodies
                .iter()
                .take(DISCUSSION_ITEMS)
                .map(|b| truncate_chars(b, DISCUSSION_LIMIT))
                .collect();
            block.push_str(&format!("\n  Comments: {}", parts.join(" | ")));
        }
        if !act.file_patches.is_empty() {
            let mut budget = PATCH_BUDGET;
            let mut patch_lines = Vec::new();
            for (filename, patch) in act.file_patches.iter().take(PATCH_FILE_LIMIT) {
                let entry = format!(
                    "    --- {filename} ---\n    {}",
                    truncate_chars(patch, PATCH_CHAR_LIMIT)
                );
                if entry.len() > budget {
                    break;
                }
                budget -= entry.len();
                patch_lines.push(entry);
            }
            if !patch_lines.is_empty() {
                block.push_str(&format!("\n  Patches:\n{}", patch_lines.join("\n")));
            }
        }
        if !act.comment_contexts.is_empty() {
            let ctx_lines: Vec<String> = act
                .comment_contexts
                .iter()
                .take(CONTEXT_LIMIT)
                .map(|ctx| {
                    // Keep the tail of the hunk; that is where the anchored
                    // line lives.
                    let hunk: String = if ctx.diff_hunk.chars().count() > 300 {
                        let skip = ctx.diff_hunk.chars().count() - 300;
                        ctx.diff_hunk.chars().skip(skip).collect()
                    } else {
                        ctx.diff_hunk.clone()
                    };
                    format!(
                        "    at {}:{}\n    hunk: {hunk}\n    comment: {}",
                        ctx.path,
                        ctx.line,
                        truncate_chars(&ctx.body, 300)
                    )
                })
                .collect();
            block.push_str(&format!("\n  Inline comments:\n{}", ctx_lines.join("\n")));
        }
        blocks.push(block);
    }
    debug!(count = activities.len(), "formatted activities");
    blocks.join("\n")
}
