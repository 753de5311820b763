//! The normalise stage: raw per-day files → activity stream + statistics.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::dates::{date_range, fmt_date};
use crate::error::{NormalizeError, RecapError};
use crate::files;
use crate::llm::router::{LlmRouter, RouterBatchRequest};
use crate::llm::ChatOptions;
use crate::models::{
    Activity, ActivityKind, Comment, CommentContext, Commit, CommitRef, DailyStats, DateOutcome,
    GitHubStats, Issue, PrRef, PullRequest, SourceStats,
};
use crate::prompts;
use crate::store::{
    CheckpointStore, DailyStateStore, FailedDateStore, Stage, LAST_NORMALIZE_DATE,
};

const COMMIT_TITLE_MAX_CHARS: usize = 120;
const ENRICH_TASK: &str = "enrich";

/// Fields the enrichment model returns per activity.
#[derive(Debug, Deserialize)]
struct EnrichmentEntry {
    index: usize,
    #[serde(default)]
    change_summary: String,
    #[serde(default)]
    intent: String,
}

/// Projection of an activity handed to the enrichment prompt.
#[derive(Debug, Serialize)]
struct EnrichmentInput<'a> {
    index: usize,
    kind: &'static str,
    title: &'a str,
    repo: &'a str,
    /// Truncated: long PR bodies add cost without adding signal.
    body: String,
    files: &'a [String],
    file_patches: &'a BTreeMap<String, String>,
    review_bodies: &'a [String],
    comment_bodies: &'a [String],
}

/// The normalise stage service.
pub struct Normalizer {
    config: Arc<AppConfig>,
    checkpoints: Arc<CheckpointStore>,
    daily_state: Arc<DailyStateStore>,
    failed: Arc<FailedDateStore>,
    llm: Option<Arc<LlmRouter>>,
}

impl Normalizer {
    pub fn new(
        config: Arc<AppConfig>,
        checkpoints: Arc<CheckpointStore>,
        daily_state: Arc<DailyStateStore>,
        failed: Arc<FailedDateStore>,
        llm: Option<Arc<LlmRouter>>,
    ) -> Self {
        Normalizer {
            config,
            checkpoints,
            daily_state,
            failed,
            llm,
        }
    }

    /// Normalise one date into `activities.jsonl` + `stats.json`.
    ///
    /// Returns the two written paths. With `enrich`, an LLM pass adds
    /// intent and change-summary fields; its failure is non-fatal.
    pub async fn normalize(
        &self,
        date: NaiveDate,
        enrich: bool,
    ) -> Result<(PathBuf, PathBuf), RecapError> {
        let mut activities = self.build_activities(date)?;
        if enrich {
            self.enrich_activities(&mut activities).await;
        }
        self.save(date, &activities)
    }

    /// Normalise a closed date range with the same skip/force/retry
    /// discipline as the fetch stage.
    pub async fn normalize_range(
        &self,
        since: NaiveDate,
        until: NaiveDate,
        force: bool,
        max_workers: usize,
        enrich: bool,
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
            "normalize_range"
        );

        if batch && enrich && self.llm.is_some() {
            return self.normalize_range_batch(&dates, force).await;
        }

        let work = self.work_set(&dates, force)?;
        let workers = max_workers.max(1);
        let mut outcomes: Vec<DateOutcome> = dates
            .iter()
            .filter(|d| !work.contains(d))
            .map(|d| DateOutcome::skipped(fmt_date(*d)))
            .collect();

        let processed: Vec<DateOutcome> = stream::iter(work.into_iter().map(|date| async move {
            match self.normalize(date, enrich).await {
                Ok(_) => self.date_success(date),
                Err(e) => self.date_failure(date, e),
            }
        }))
        .buffer_unordered(workers)
        .collect()
        .await;
        outcomes.extend(processed);
        outcomes.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(outcomes)
    }

    /// Batch mode: normalise every date without enrichment first, then one
    /// provider batch enriches all days and the activities are re-saved.
    async fn normalize_range_batch(
        &self,
        dates: &[NaiveDate],
        force: bool,
    ) -> Result<Vec<DateOutcome>, RecapError> {
        let work = self.work_set(dates, force)?;
        let mut outcomes: Vec<DateOutcome> = dates
            .iter()
            .filter(|d| !work.contains(d))
            .map(|d| DateOutcome::skipped(fmt_date(*d)))
            .collect();

        let mut date_activities: BTreeMap<NaiveDate, Vec<Activity>> = BTreeMap::new();
        for date in work {
            match self.build_activities(date) {
                Ok(activities) => match self.save(date, &activities) {
                    Ok(_) => {
                        date_activities.insert(date, activities);
                        outcomes.push(self.date_success(date));
                    }
                    Err(e) => outcomes.push(self.date_failure(date, e)),
                },
                Err(e) => outcomes.push(self.date_failure(date, e)),
            }
        }

        if !date_activities.is_empty() {
            self.batch_enrich(&mut date_activities).await;
            for (date, activities) in &date_activities {
                let path = self
                    .config
                    .date_normalized_dir(*date)
                    .join("activities.jsonl");
                if let Err(e) = files::save_jsonl(activities, &path) {
                    warn!(date = %date, error = %e, "failed to save enriched activities");
                }
            }
        }

        outcomes.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(outcomes)
    }

    fn work_set(&self, dates: &[NaiveDate], force: bool) -> Result<Vec<NaiveDate>, RecapError> {
        let candidates = if force {
            dates.to_vec()
        } else {
            let mut set = self.daily_state.stale_dates(Stage::Normalize, dates)?;
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

    fn date_success(&self, date: NaiveDate) -> DateOutcome {
        if let Err(e) = self.failed.record_success(date, Stage::Normalize) {
            warn!(date = %date, error = %e, "could not clear failure record");
        }
        DateOutcome::success(fmt_date(date))
    }

    fn date_failure(&self, date: NaiveDate, error: RecapError) -> DateOutcome {
        warn!(date = %date, error = %error, "normalize failed for date");
        if let Err(e) = self.failed.record_failure(date, Stage::Normalize, &error) {
            warn!(error = %e, "could not record failure");
        }
        DateOutcome::failed(fmt_date(date), error.to_string())
    }

    // ── Activity generation ─────────────────────────────────────────────────

    fn build_activities(&self, date: NaiveDate) -> Result<Vec<Activity>, RecapError> {
        let raw_dir = self.config.date_raw_dir(date);
        let prs_path = raw_dir.join("prs.json");
        if !prs_path.exists() {
            return Err(NormalizeError::MissingInput(prs_path).into());
        }
        let prs: Vec<PullRequest> =
            files::load_json(&prs_path).map_err(|e| NormalizeError::Parse {
                path: prs_path.clone(),
                message: e.to_string(),
            })?;

        // Commits and issues are optional for days fetched before those
        // axes existed.
        let commits: Vec<Commit> = Self::load_optional(&raw_dir.join("commits.json"));
        let issues: Vec<Issue> = Self::load_optional(&raw_dir.join("issues.json"));
        debug!(
            date = %date,
            prs = prs.len(),
            commits = commits.len(),
            issues = issues.len(),
            "loaded raw files"
        );

        let target = fmt_date(date);
        let mut activities = self.convert_pr_activities(&prs, &target);
        activities.extend(self.convert_commit_activities(&commits, &target));
        activities.extend(self.convert_issue_activities(&issues, &target));
        activities.sort_by(|a, b| a.ts.cmp(&b.ts));
        Ok(activities)
    }

    fn load_optional<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Vec<T> {
        if !path.exists() {
            return Vec::new();
        }
        match files::load_json(path) {
            Ok(items) => items,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse optional raw file");
                Vec::new()
            }
        }
    }

    fn save(
        &self,
        date: NaiveDate,
        activities: &[Activity],
    ) -> Result<(PathBuf, PathBuf), RecapError> {
        let stats = compute_stats(activities, &fmt_date(date));
        let out_dir = self.config.date_normalized_dir(date);
        let activities_path = out_dir.join("activities.jsonl");
        let stats_path = out_dir.join("stats.json");
        files::save_jsonl(activities, &activities_path)?;
        files::save_json(&stats, &stats_path)?;

        self.checkpoints.update(LAST_NORMALIZE_DATE, date)?;
        self.daily_state.set_timestamp(Stage::Normalize, date)?;
        info!(date = %date, count = activities.len(), "normalized");
        Ok((activities_path, stats_path))
    }

    fn is_user(&self, login: &str) -> bool {
        login.eq_ignore_ascii_case(&self.config.username)
    }

    fn convert_pr_activities(&self, prs: &[PullRequest], target: &str) -> Vec<Activity> {
        let mut activities = Vec::new();
        for pr in prs {
            let is_author = self.is_user(&pr.author);

            if is_author && matches_date(&pr.created_at, target) {
                activities.push(self.make_pr_activity(
                    pr,
                    ActivityKind::PrAuthored,
                    pr.created_at.clone(),
                    Vec::new(),
                    Vec::new(),
                    Vec::new(),
                    Vec::new(),
                ));
            }

            // Self-review suppressed: an authored PR never coexists with a
            // reviewed activity for the same PR-day.
            if !is_author {
                let user_reviews: Vec<&crate::models::Review> = pr
                    .reviews
                    .iter()
                    .filter(|r| self.is_user(&r.author) && matches_date(&r.submitted_at, target))
                    .collect();
                if !user_reviews.is_empty() {
                    let ts = user_reviews
                        .iter()
                        .map(|r| r.submitted_at.clone())
                        .min()
                        .expect("non-empty reviews");
                    let contexts = inline_contexts(
                        pr.comments
                            .iter()
                            .filter(|c| self.is_user(&c.author)),
                    );
                    activities.push(self.make_pr_activity(
                        pr,
                        ActivityKind::PrReviewed,
                        ts,
                        user_reviews.iter().map(|r| r.url.clone()).collect(),
                        user_reviews.iter().map(|r| r.body.clone()).collect(),
                        Vec::new(),
                        contexts,
                    ));
                }
            }

            // Author-on-own-PR comments are kept by default: they preserve
            // the discussion trail.
            if !is_author || self.config.include_own_pr_comments {
                let user_comments: Vec<&Comment> = pr
                    .comments
                    .iter()
                    .filter(|c| self.is_user(&c.author) && matches_date(&c.created_at, target))
                    .collect();
                if !user_comments.is_empty() {
                    let ts = user_comments
                        .iter()
                        .map(|c| c.created_at.clone())
                        .min()
                        .expect("non-empty comments");
                    let contexts = inline_contexts(user_comments.iter().copied());
                    activities.push(self.make_pr_activity(
                        pr,
                        ActivityKind::PrCommented,
                        ts,
                        user_comments.iter().map(|c| c.url.clone()).collect(),
                        Vec::new(),
                        user_comments.iter().map(|c| c.body.clone()).collect(),
                        contexts,
                    ));
                }
            }
        }
        activities
    }

    #[allow(clippy::too_many_arguments)]
    fn make_pr_activity(
        &self,
        pr: &PullRequest,
        kind: ActivityKind,
        ts: String,
        evidence_urls: Vec<String>,
        review_bodies: Vec<String>,
        comment_bodies: Vec<String>,
        comment_contexts: Vec<CommentContext>,
    ) -> Activity {
        let additions: u64 = pr.files.iter().map(|f| f.additions).sum();
        let deletions: u64 = pr.files.iter().map(|f| f.deletions).sum();
        let files: Vec<String> = pr.files.iter().map(|f| f.filename.clone()).collect();
        let file_patches: BTreeMap<String, String> = pr
            .files
            .iter()
            .filter_map(|f| f.patch.clone().map(|p| (f.filename.clone(), p)))
            .collect();

        Activity {
            ts,
            kind,
            repo: pr.repo.clone(),
            pr_number: pr.number,
            title: pr.title.clone(),
            url: pr.url.clone(),
            summary: auto_summary(kind, &pr.title, &pr.repo, &pr.body, &files, additions, deletions),
            sha: String::new(),
            body: pr.body.clone(),
            review_bodies,
            comment_bodies,
            files,
            file_patches,
            additions,
            deletions,
            labels: pr.labels.clone(),
            evidence_urls,
            comment_contexts,
            change_summary: String::new(),
            intent: String::new(),
        }
    }

    fn convert_commit_activities(&self, commits: &[Commit], target: &str) -> Vec<Activity> {
        commits
            .iter()
            .filter(|c| matches_date(&c.committed_at, target))
            .map(|commit| {
                let title = commit_title(&commit.message);
                let additions: u64 = commit.files.iter().map(|f| f.additions).sum();
                let deletions: u64 = commit.files.iter().map(|f| f.deletions).sum();
                let files: Vec<String> =
                    commit.files.iter().map(|f| f.filename.clone()).collect();
                let file_patches: BTreeMap<String, String> = commit
                    .files
                    .iter()
                    .filter_map(|f| f.patch.clone().map(|p| (f.filename.clone(), p)))
                    .collect();
                Activity {
                    ts: commit.committed_at.clone(),
                    kind: ActivityKind::Commit,
                    repo: commit.repo.clone(),
                    pr_number: 0,
                    title: title.clone(),
                    url: commit.url.clone(),
                    summary: format!(
                        "commit: {title} ({}) +{additions}/-{deletions}",
                        commit.repo
                    ),
                    sha: commit.sha.clone(),
                    body: commit.message.clone(),
                    review_bodies: Vec::new(),
                    comment_bodies: Vec::new(),
                    files,
                    file_patches,
                    additions,
                    deletions,
                    labels: Vec::new(),
                    evidence_urls: Vec::new(),
                    comment_contexts: Vec::new(),
                    change_summary: String::new(),
                    intent: String::new(),
                }
            })
            .collect()
    }

    fn convert_issue_activities(&self, issues: &[Issue], target: &str) -> Vec<Activity> {
        let mut activities = Vec::new();
        for issue in issues {
            if self.is_user(&issue.author) && matches_date(&issue.created_at, target) {
                activities.push(Activity {
                    ts: issue.created_at.clone(),
                    kind: ActivityKind::IssueAuthored,
                    repo: issue.repo.clone(),
                    pr_number: issue.number,
                    title: issue.title.clone(),
                    url: issue.url.clone(),
                    summary: format!(
                        "issue_authored: {} ({})",
                        issue.title, issue.repo
                    ),
                    sha: String::new(),
                    body: issue.body.clone(),
                    review_bodies: Vec::new(),
                    comment_bodies: Vec::new(),
                    files: Vec::new(),
                    file_patches: BTreeMap::new(),
                    additions: 0,
                    deletions: 0,
                    labels: issue.labels.clone(),
                    evidence_urls: Vec::new(),
                    comment_contexts: Vec::new(),
                    change_summary: String::new(),
                    intent: String::new(),
                });
            }

            let user_comments: Vec<&Comment> = issue
                .comments
                .iter()
                .filter(|c| self.is_user(&c.author) && matches_date(&c.created_at, target))
                .collect();
            if !user_comments.is_empty() {
                let ts = user_comments
                    .iter()
                    .map(|c| c.created_at.clone())
                    .min()
                    .expect("non-empty comments");
                activities.push(Activity {
                    ts,
                    kind: ActivityKind::IssueCommented,
                    repo: issue.repo.clone(),
                    pr_number: issue.number,
                    title: issue.title.clone(),
                    url: issue.url.clone(),
                    summary: format!(
                        "issue_commented: {} ({})",
                        issue.title, issue.repo
                    ),
                    sha: String::new(),
                    body: issue.body.clone(),
                    review_bodies: Vec::new(),
                    comment_bodies: user_comments.iter().map(|c| c.body.clone()).collect(),
                    files: Vec::new(),
                    file_patches: BTreeMap::new(),
                    additions: 0,
                    deletions: 0,
                    labels: issue.labels.clone(),
                    evidence_urls: user_comments.iter().map(|c| c.url.clone()).collect(),
                    comment_contexts: Vec::new(),
                    change_summary: String::new(),
                    intent: String::new(),
                });
            }
        }
        activities
    }

    // ── LLM enrichment ──────────────────────────────────────────────────────

    /// Best-effort enrichment pass; the day stays usable without it.
    async fn enrich_activities(&self, activities: &mut [Activity]) {
        let Some(router) = &self.llm else {
            debug!("enrichment skipped: no router configured");
            return;
        };
        if activities.is_empty() {
            return;
        }
        let Some((system, user)) = self.prepare_enrich_prompt(activities) else {
            return;
        };
        info!(count = activities.len(), "enriching activities");
        let response = router
            .chat(
                &system,
                &user,
                ENRICH_TASK,
                ChatOptions {
                    json_mode: true,
                    cache_system_prompt: true,
                    max_tokens: None,
                },
            )
            .await;
        match response {
            Ok(text) => apply_enrichment(activities, &text),
            Err(e) => warn!(error = %e, "enrichment failed, continuing without it"),
        }
    }

    /// One batch request per day, `custom_id = "enrich-{date}"`. Batches
    /// never escalate; any failure degrades to unenriched activities.
    async fn batch_enrich(&self, date_activities: &mut BTreeMap<NaiveDate, Vec<Activity>>) {
        let Some(router) = &self.llm else {
            return;
        };
        let mut requests = Vec::new();
        for (date, activities) in date_activities.iter() {
            if activities.is_empty() {
                continue;
            }
            let Some((system, user)) = self.prepare_enrich_prompt(activities) else {
                continue;
            };
            requests.push(RouterBatchRequest {
                custom_id: format!("enrich-{}", fmt_date(*date)),
                system_prompt: system,
                user_content: user,
                json_mode: true,
                max_tokens: None,
                cache_system_prompt: true,
            });
        }
        if requests.is_empty() {
            info!("no enrichment prompts prepared for batch");
            return;
        }

        let size = requests.len();
        info!(days = size, "submitting batch enrichment");
        let result = async {
            let batch_id = router.submit_batch(requests, ENRICH_TASK).await?;
            router.wait_for_batch(&batch_id, ENRICH_TASK, size).await
        }
        .await;

        match result {
            Ok(results) => {
                let by_id: BTreeMap<String, String> = results
                    .into_iter()
                    .filter_map(|r| {
                        if let Some(error) = &r.error {
                            warn!(custom_id = %r.custom_id, error = %error, "batch enrichment error");
                        }
                        r.content.map(|c| (r.custom_id, c))
                    })
                    .collect();
                for (date, activities) in date_activities.iter_mut() {
                    if let Some(text) = by_id.get(&format!("enrich-{}", fmt_date(*date))) {
                        apply_enrichment(activities, text);
                    }
                }
            }
            Err(e) => warn!(error = %e, "batch enrichment failed, continuing without it"),
        }
    }

    fn prepare_enrich_prompt(&self, activities: &[Activity]) -> Option<(String, String)> {
        let prompt = match prompts::load_split(&self.config.prompts_dir, "enrich.md", &[]) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "enrich template not found, skipping enrichment");
                return None;
            }
        };
        let inputs: Vec<EnrichmentInput> = activities
            .iter()
            .enumerate()
            .map(|(index, a)| EnrichmentInput {
                index,
                kind: a.kind.as_str(),
                title: &a.title,
                repo: &a.repo,
                body: truncate_chars(&a.body, 1000),
                files: &a.files,
                file_patches: &a.file_patches,
                review_bodies: &a.review_bodies,
                comment_bodies: &a.comment_bodies,
            })
            .collect();
        let payload =
            serde_json::to_string_pretty(&inputs).expect("activity projection serializes");
        let user = if prompt.user.contains("{{activities}}") {
            prompt.user.replace("{{activities}}", &payload)
        } else if prompt.user.is_empty() {
            payload
        } else {
            format!("{}\n\n{payload}", prompt.user)
        };
        Some((prompt.system, user))
    }
}

/// The date component of an ISO-8601 instant equals the target date.
fn matches_date(ts: &str, target: &str) -> bool {
    ts.get(..10) == Some(target)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max).collect();
        out.push('…');
        out
    }
}

/// First line of the commit message, capped at 120 characters.
fn commit_title(message: &str) -> String {
    let first = message.lines().next().unwrap_or_default();
    let mut title: String = first.chars().take(COMMIT_TITLE_MAX_CHARS).collect();
    if first.chars().count() > COMMIT_TITLE_MAX_CHARS {
        title.push('…');
    }
    title
}

/// One-line machine summary. When the PR body is empty, falls back to a hint
/// built from the top-level directories touched.
fn auto_summary(
    kind: ActivityKind,
    title: &str,
    repo: &str,
    body: &str,
    files: &[String],
    additions: u64,
    deletions: u64,
) -> String {
    if !body.trim().is_empty() {
        return format!("{kind}: {title} ({repo}) +{additions}/-{deletions}");
    }

    let mut dirs: Vec<String> = files
        .iter()
        .map(|f| match f.split_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => f.clone(),
        })
        .collect();
    dirs.sort();
    dirs.dedup();
    let mut hint = dirs.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
    if dirs.len() > 3 {
        hint.push_str(", others");
    }
    format!(
        "{kind}: [{hint}] {} files changed ({repo}) +{additions}/-{deletions}",
        files.len()
    )
}

fn inline_contexts<'a>(comments: impl Iterator<Item = &'a Comment>) -> Vec<CommentContext> {
    comments
        .filter(|c| c.path.is_some())
        .map(|c| CommentContext {
            path: c.path.clone().unwrap_or_default(),
            line: c.line.unwrap_or(0),
            diff_hunk: c.diff_hunk.clone().unwrap_or_default(),
            body: c.body.clone(),
        })
        .collect()
}

fn apply_enrichment(activities: &mut [Activity], response: &str) {
    let text = crate::llm::router::strip_code_fences(response);
    let entries: Vec<EnrichmentEntry> = match serde_json::from_str(text) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "failed to parse enrichment response");
            return;
        }
    };
    let applied = entries.len();
    for entry in entries {
        if let Some(activity) = activities.get_mut(entry.index) {
            activity.change_summary = entry.change_summary;
            activity.intent = entry.intent;
        }
    }
    info!(applied, "enrichment merged");
}

/// Per-day statistics. Line counts sum only over authored PRs and commits;
/// `repos_touched` is sorted and distinct over all activities.
fn compute_stats(activities: &[Activity], date: &str) -> DailyStats {
    let by_kind = |kind: ActivityKind| activities.iter().filter(move |a| a.kind == kind);

    let total_additions = by_kind(ActivityKind::PrAuthored)
        .chain(by_kind(ActivityKind::Commit))
        .map(|a| a.additions)
        .sum();
    let total_deletions = by_kind(ActivityKind::PrAuthored)
        .chain(by_kind(ActivityKind::Commit))
        .map(|a| a.deletions)
        .sum();

    let mut repos: Vec<String> = activities.iter().map(|a| a.repo.clone()).collect();
    repos.sort();
    repos.dedup();

    let pr_ref = |a: &Activity| PrRef {
        url: a.url.clone(),
        title: a.title.clone(),
        repo: a.repo.clone(),
    };

    DailyStats {
        date: date.to_string(),
        sources: SourceStats {
            github: GitHubStats {
                authored_count: by_kind(ActivityKind::PrAuthored).count() as u64,
                reviewed_count: by_kind(ActivityKind::PrReviewed).count() as u64,
                commented_count: by_kind(ActivityKind::PrCommented).count() as u64,
                commit_count: by_kind(ActivityKind::Commit).count() as u64,
                issue_authored_count: by_kind(ActivityKind::IssueAuthored).count() as u64,
                issue_commented_count: by_kind(ActivityKind::IssueCommented).count() as u64,
                total_additions,
                total_deletions,
                repos_touched: repos,
                authored_prs: by_kind(ActivityKind::PrAuthored).map(pr_ref).collect(),
                reviewed_prs: by_kind(ActivityKind::PrReviewed).map(pr_ref).collect(),
                commits: by_kind(ActivityKind::Commit)
                    .map(|a| CommitRef {
                        url: a.url.clone(),
                        title: a.title.clone(),
                        repo: a.repo.clone(),
                        sha: a.sha.clone(),
                    })
                    .collect(),
                authored_issues: by_kind(ActivityKind::IssueAuthored).map(pr_ref).collect(),
            },
        },
    }
}
