//! The fetch stage: search, enrich, persist raw per-day files.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::dates::{date_range, fmt_date, monthly_chunks};
use crate::error::{FetchError, RecapError};
use crate::files;
use crate::host::wire::{CommentEntry, CommitSearchItem, IssueSearchItem, ReviewEntry};
use crate::host::{ClientPool, HostClient};
use crate::models::{
    Comment, Commit, DateOutcome, FileChange, Issue, PullRequest, Review,
};
use crate::store::{
    CheckpointStore, DailyStateStore, FailedDateStore, FetchProgressStore, Stage,
    LAST_FETCH_DATE,
};

/// Raw data kinds a fetch can be filtered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchKind {
    Prs,
    Commits,
    Issues,
}

impl FetchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchKind::Prs => "prs",
            FetchKind::Commits => "commits",
            FetchKind::Issues => "issues",
        }
    }
}

impl std::str::FromStr for FetchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prs" | "pr" => Ok(FetchKind::Prs),
            "commits" | "commit" => Ok(FetchKind::Commits),
            "issues" | "issue" => Ok(FetchKind::Issues),
            other => Err(format!("unknown fetch type '{other}'")),
        }
    }
}

static NOISE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"(?i)^LGTM!?$", r"^\+1$", r"^:shipit:$", r"(?i)^Ship it!?$"]
        .iter()
        .map(|p| Regex::new(p).expect("static noise pattern"))
        .collect()
});

const BOT_SUFFIXES: &[&str] = &["[bot]", "-bot"];

fn is_bot_login(login: &str) -> bool {
    let lower = login.to_lowercase();
    BOT_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

fn is_noise_comment(author: &str, body: &str) -> bool {
    if is_bot_login(author) {
        return true;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return true;
    }
    NOISE_PATTERNS.iter().any(|p| p.is_match(trimmed))
}

fn is_noise_review(author: &str) -> bool {
    is_bot_login(author)
}

/// `…/repos/{owner}/{repo}/(pulls|issues|commits)/{id}` → (owner, repo, id).
fn parse_resource_url(api_url: &str) -> Option<(String, String, String)> {
    let parts: Vec<&str> = api_url.trim_end_matches('/').split('/').collect();
    let repos_idx = parts.iter().rposition(|p| *p == "repos")?;
    let owner = parts.get(repos_idx + 1)?;
    let repo = parts.get(repos_idx + 2)?;
    let id = parts.last()?;
    Some((owner.to_string(), repo.to_string(), id.to_string()))
}

/// Post-search items of one day, keyed for dedup where the axes overlap.
#[derive(Default, Clone)]
struct DayBuckets {
    prs: BTreeMap<String, IssueSearchItem>,
    commits: Vec<CommitSearchItem>,
    issues: BTreeMap<String, IssueSearchItem>,
}

fn kind_enabled(types: &Option<Vec<FetchKind>>, kind: FetchKind) -> bool {
    match types {
        None => true,
        Some(list) => list.contains(&kind),
    }
}

/// The fetch stage service.
pub struct Fetcher {
    config: Arc<AppConfig>,
    pool: Arc<ClientPool>,
    checkpoints: Arc<CheckpointStore>,
    daily_state: Arc<DailyStateStore>,
    failed: Arc<FailedDateStore>,
    progress: Arc<FetchProgressStore>,
}

impl Fetcher {
    pub fn new(
        config: Arc<AppConfig>,
        pool: Arc<ClientPool>,
        checkpoints: Arc<CheckpointStore>,
        daily_state: Arc<DailyStateStore>,
        failed: Arc<FailedDateStore>,
        progress: Arc<FetchProgressStore>,
    ) -> Self {
        Fetcher {
            config,
            pool,
            checkpoints,
            daily_state,
            failed,
            progress,
        }
    }

    /// Fetch one date's activity into `raw/{YYYY}/{MM}/{DD}/`.
    ///
    /// Each enabled axis is searched for the single day, every candidate is
    /// enriched, and the per-kind JSON files are written. A single item that
    /// fails to enrich is skipped; the day itself still succeeds.
    pub async fn fetch(
        &self,
        date: NaiveDate,
        types: Option<&[FetchKind]>,
    ) -> Result<PathBuf, RecapError> {
        let types = types.map(|t| t.to_vec());
        let window = fmt_date(date);
        let client = self.pool.acquire().await.map_err(RecapError::from)?;

        let mut buckets = DayBuckets::default();
        if kind_enabled(&types, FetchKind::Prs) {
            buckets.prs = self.search_prs(&client, &window).await.map_err(RecapError::from)?;
        }
        if kind_enabled(&types, FetchKind::Commits) {
            buckets.commits = self
                .search_commits(&client, &window)
                .await
                .map_err(RecapError::from)?;
        }
        if kind_enabled(&types, FetchKind::Issues) {
            buckets.issues = self
                .search_issues(&client, &window)
                .await
                .map_err(RecapError::from)?;
        }

        let out_dir = self
            .enrich_and_save(&client, date, &buckets, &types)
            .await
            .map_err(RecapError::from)?;
        drop(client);

        self.record_date_success(date)?;
        info!(date = %date, dir = %out_dir.display(), "fetched");
        Ok(out_dir)
    }

    /// Fetch a closed date range, the hot path for multi-year backfills.
    ///
    /// Searches once per month-chunk per kind (resuming from the
    /// fetch-progress cache), buckets hits by their actual day, then
    /// enriches stale or retryable dates with a bounded worker fan-out.
    /// Failures are isolated per date and recorded; the loop never aborts
    /// the batch.
    pub async fn fetch_range(
        &self,
        since: NaiveDate,
        until: NaiveDate,
        types: Option<&[FetchKind]>,
        force: bool,
        max_workers: usize,
    ) -> Result<Vec<DateOutcome>, RecapError> {
        if since > until {
            return Ok(Vec::new());
        }
        let types = types.map(|t| t.to_vec());
        let all_dates = date_range(since, until);
        info!(
            since = %since,
            until = %until,
            dates = all_dates.len(),
            force,
            max_workers,
            "fetch_range"
        );

        let chunks = monthly_chunks(since, until);
        let (buckets, day_search) = self
            .search_chunks(&chunks, &types, since, until)
            .await
            .map_err(RecapError::from)?;
        let buckets = Arc::new(buckets);
        let day_search = Arc::new(day_search);

        // Work set: stale dates plus recorded-but-retryable failures, minus
        // anything classified permanent or exhausted.
        let candidates = if force {
            all_dates.clone()
        } else {
            let mut set: Vec<NaiveDate> =
                self.daily_state.stale_dates(Stage::Fetch, &all_dates)?;
            for d in self.failed.failed_retryable_dates(&all_dates)? {
                if !set.contains(&d) {
                    set.push(d);
                }
            }
            set.sort();
            set
        };
        let work: HashSet<NaiveDate> =
            self.failed.retryable_dates(&candidates)?.into_iter().collect();

        let mut outcomes: Vec<DateOutcome> = all_dates
            .iter()
            .filter(|d| !work.contains(*d))
            .map(|d| DateOutcome::skipped(fmt_date(*d)))
            .collect();

        let workers = max_workers.max(1);
        let processed: Vec<DateOutcome> = stream::iter(work.into_iter().map(|date| {
            let buckets = Arc::clone(&buckets);
            let day_search = Arc::clone(&day_search);
            let types = types.clone();
            async move {
                let kinds = day_search.get(&date).map(Vec::as_slice).unwrap_or(&[]);
                self.process_date(date, &buckets, kinds, &types).await
            }
        }))
        .buffer_unordered(workers)
        .collect()
        .await;
        outcomes.extend(processed);
        outcomes.sort_by(|a, b| a.date.cmp(&b.date));

        self.clear_completed_chunks(&chunks, &types, &outcomes);

        let failed = outcomes
            .iter()
            .filter(|o| o.status == crate::models::DateStatus::Failed)
            .count();
        info!(
            total = outcomes.len(),
            failed,
            "fetch_range complete"
        );
        Ok(outcomes)
    }

    // ── Search phase ────────────────────────────────────────────────────────

    /// Three PR axes union-deduped on the PR API URL. A host that rejects
    /// `reviewed-by` (422) loses that axis; review activity is then inferred
    /// downstream from the enriched review lists.
    async fn search_prs(
        &self,
        client: &HostClient,
        window: &str,
    ) -> Result<BTreeMap<String, IssueSearchItem>, FetchError> {
        let mut map = BTreeMap::new();
        for qualifier in ["author", "reviewed-by", "commenter"] {
            let query = format!(
                "type:pr {qualifier}:{} updated:{window}",
                self.config.username
            );
            let items = match client.search_issues_all(&query).await {
                Ok(items) => items,
                Err(e) if qualifier == "reviewed-by" && e.status() == Some(422) => {
                    warn!("host rejected the reviewed-by qualifier, dropping that axis");
                    continue;
                }
                Err(e) => return Err(e),
            };
            for item in items {
                let key = item
                    .pull_request
                    .as_ref()
                    .map(|p| p.url.clone())
                    .unwrap_or_else(|| item.url.clone());
                map.entry(key).or_insert(item);
            }
        }
        Ok(map)
    }

    async fn search_commits(
        &self,
        client: &HostClient,
        window: &str,
    ) -> Result<Vec<CommitSearchItem>, FetchError> {
        let query = format!(
            "author:{} committer-date:{window}",
            self.config.username
        );
        client.search_commits_all(&query).await
    }

    async fn search_issues(
        &self,
        client: &HostClient,
        window: &str,
    ) -> Result<BTreeMap<String, IssueSearchItem>, FetchError> {
        let mut map = BTreeMap::new();
        for qualifier in ["author", "commenter"] {
            let query = format!(
                "type:issue {qualifier}:{} updated:{window}",
                self.config.username
            );
            for item in client.search_issues_all(&query).await? {
                map.entry(item.url.clone()).or_insert(item);
            }
        }
        Ok(map)
    }

    /// Run the search phase over every chunk, consulting the progress cache,
    /// and bucket hits by actual day.
    ///
    /// A chunk search that still fails after the client's retries does not
    /// abort the range: that chunk's dates are marked for day-scoped
    /// searches instead, so a bad window degrades to per-date work and
    /// failures stay isolated per date.
    async fn search_chunks(
        &self,
        chunks: &[(NaiveDate, NaiveDate)],
        types: &Option<Vec<FetchKind>>,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<
        (
            BTreeMap<NaiveDate, DayBuckets>,
            BTreeMap<NaiveDate, Vec<FetchKind>>,
        ),
        FetchError,
    > {
        let client = self.pool.acquire().await?;
        let mut buckets: BTreeMap<NaiveDate, DayBuckets> = BTreeMap::new();
        let mut day_search: BTreeMap<NaiveDate, Vec<FetchKind>> = BTreeMap::new();
        let mut mark_fallback =
            |chunk_start: NaiveDate, chunk_end: NaiveDate, kind: FetchKind| {
                for date in date_range(chunk_start.max(since), chunk_end.min(until)) {
                    day_search.entry(date).or_default().push(kind);
                }
            };

        let mut bucket_date = |ts: &str| -> Option<NaiveDate> {
            let date: NaiveDate = ts.get(..10)?.parse().ok()?;
            (since <= date && date <= until).then_some(date)
        };

        for (chunk_start, chunk_end) in chunks {
            let window = format!("{}..{}", fmt_date(*chunk_start), fmt_date(*chunk_end));

            if kind_enabled(types, FetchKind::Prs) {
                let key = format!("{window}/prs");
                let items: Option<Vec<IssueSearchItem>> = match self.progress.load_chunk(&key)? {
                    Some(cached) => {
                        debug!(chunk = %key, "search phase resumed from cache");
                        Some(cached)
                    }
                    None => match self.search_prs(&client, &window).await {
                        Ok(found) => {
                            let found: Vec<IssueSearchItem> = found.into_values().collect();
                            self.progress.save_chunk(&key, &found)?;
                            Some(found)
                        }
                        Err(e) => {
                            warn!(
                                chunk = key,
                                error = %e,
                                "chunk search failed, degrading to day-scoped searches"
                            );
                            mark_fallback(*chunk_start, *chunk_end, FetchKind::Prs);
                            None
                        }
                    },
                };
                for item in items.into_iter().flatten() {
                    if let Some(date) = bucket_date(&item.updated_at) {
                        let key = item
                            .pull_request
                            .as_ref()
                            .map(|p| p.url.clone())
                            .unwrap_or_else(|| item.url.clone());
                        buckets.entry(date).or_default().prs.entry(key).or_insert(item);
                    }
                }
            }

            if kind_enabled(types, FetchKind::Commits) {
                let key = format!("{window}/commits");
                let items: Option<Vec<CommitSearchItem>> = match self.progress.load_chunk(&key)? {
                    Some(cached) => Some(cached),
                    None => match self.search_commits(&client, &window).await {
                        Ok(found) => {
                            self.progress.save_chunk(&key, &found)?;
                            Some(found)
                        }
                        Err(e) => {
                            warn!(
                                chunk = key,
                                error = %e,
                                "chunk search failed, degrading to day-scoped searches"
                            );
                            mark_fallback(*chunk_start, *chunk_end, FetchKind::Commits);
                            None
                        }
                    },
                };
                for item in items.into_iter().flatten() {
                    if let Some(date) = bucket_date(&item.commit.committer.date) {
                        buckets.entry(date).or_default().commits.push(item);
                    }
                }
            }

            if kind_enabled(types, FetchKind::Issues) {
                let key = format!("{window}/issues");
                let items: Option<Vec<IssueSearchItem>> = match self.progress.load_chunk(&key)? {
                    Some(cached) => Some(cached),
                    None => match self.search_issues(&client, &window).await {
                        Ok(found) => {
                            let found: Vec<IssueSearchItem> = found.into_values().collect();
                            self.progress.save_chunk(&key, &found)?;
                            Some(found)
                        }
                        Err(e) => {
                            warn!(
                                chunk = key,
                                error = %e,
                                "chunk search failed, degrading to day-scoped searches"
                            );
                            mark_fallback(*chunk_start, *chunk_end, FetchKind::Issues);
                            None
                        }
                    },
                };
                for item in items.into_iter().flatten() {
                    if let Some(date) = bucket_date(&item.updated_at) {
                        buckets
                            .entry(date)
                            .or_default()
                            .issues
                            .entry(item.url.clone())
                            .or_insert(item);
                    }
                }
            }
        }
        Ok((buckets, day_search))
    }

    // ── Per-date processing ─────────────────────────────────────────────────

    async fn process_date(
        &self,
        date: NaiveDate,
        buckets: &BTreeMap<NaiveDate, DayBuckets>,
        day_search_kinds: &[FetchKind],
        types: &Option<Vec<FetchKind>>,
    ) -> DateOutcome {
        let result: Result<(), RecapError> = async {
            let client = self.pool.acquire().await?;
            let mut day = buckets.get(&date).cloned().unwrap_or_default();

            // Kinds whose chunk search failed are re-searched day-scoped.
            let window = fmt_date(date);
            for kind in day_search_kinds {
                if !kind_enabled(types, *kind) {
                    continue;
                }
                match kind {
                    FetchKind::Prs => {
                        day.prs.extend(self.search_prs(&client, &window).await?);
                    }
                    FetchKind::Commits => {
                        day.commits = self.search_commits(&client, &window).await?;
                    }
                    FetchKind::Issues => {
                        day.issues.extend(self.search_issues(&client, &window).await?);
                    }
                }
            }

            self.enrich_and_save(&client, date, &day, types).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => match self.record_date_success(date) {
                Ok(()) => DateOutcome::success(fmt_date(date)),
                Err(e) => DateOutcome::failed(fmt_date(date), e.to_string()),
            },
            Err(e) => {
                warn!(date = %date, error = %e, "fetch failed for date");
                if let Err(store_err) = self.failed.record_failure(date, Stage::Fetch, &e) {
                    warn!(error = %store_err, "could not record failure");
                }
                DateOutcome::failed(fmt_date(date), e.to_string())
            }
        }
    }

    fn record_date_success(&self, date: NaiveDate) -> Result<(), RecapError> {
        self.checkpoints.update(LAST_FETCH_DATE, date)?;
        self.daily_state.set_timestamp(Stage::Fetch, date)?;
        self.failed.record_success(date, Stage::Fetch)?;
        Ok(())
    }

    /// Enrich every bucketed item and write the per-day raw files for the
    /// enabled kinds.
    async fn enrich_and_save(
        &self,
        client: &HostClient,
        date: NaiveDate,
        day: &DayBuckets,
        types: &Option<Vec<FetchKind>>,
    ) -> Result<PathBuf, FetchError> {
        let out_dir = self.config.date_raw_dir(date);

        if kind_enabled(types, FetchKind::Prs) {
            let mut prs = Vec::with_capacity(day.prs.len());
            for (api_url, item) in &day.prs {
                match self.enrich_pr(client, item).await {
                    Ok(pr) => prs.push(pr),
                    Err(e) => warn!(pr = %api_url, error = %e, "failed to enrich PR, skipping"),
                }
            }
            files::save_json(&prs, &out_dir.join("prs.json"))?;
        }

        if kind_enabled(types, FetchKind::Commits) {
            let mut commits = Vec::with_capacity(day.commits.len());
            for item in &day.commits {
                match self.enrich_commit(client, item).await {
                    Ok(commit) => commits.push(commit),
                    Err(e) => {
                        warn!(sha = %item.sha, error = %e, "failed to enrich commit, skipping")
                    }
                }
            }
            files::save_json(&commits, &out_dir.join("commits.json"))?;
        }

        if kind_enabled(types, FetchKind::Issues) {
            let mut issues = Vec::with_capacity(day.issues.len());
            for (api_url, item) in &day.issues {
                match self.enrich_issue(client, item).await {
                    Ok(issue) => issues.push(issue),
                    Err(e) => {
                        warn!(issue = %api_url, error = %e, "failed to enrich issue, skipping")
                    }
                }
            }
            files::save_json(&issues, &out_dir.join("issues.json"))?;
        }

        Ok(out_dir)
    }

    /// PR enrichment: detail + files + comments (review and issue comments)
    /// + reviews, with the noise filter applied.
    async fn enrich_pr(
        &self,
        client: &HostClient,
        item: &IssueSearchItem,
    ) -> Result<PullRequest, FetchError> {
        let api_url = item
            .pull_request
            .as_ref()
            .map(|p| p.url.as_str())
            .unwrap_or(item.url.as_str());
        let (owner, repo, number) =
            parse_resource_url(api_url).ok_or_else(|| FetchError::Decode {
                endpoint: api_url.to_string(),
                message: "unparseable PR API URL".into(),
            })?;
        let number: u64 = number.parse().map_err(|_| FetchError::Decode {
            endpoint: api_url.to_string(),
            message: "PR number is not numeric".into(),
        })?;

        let detail = client.get_pr(&owner, &repo, number).await?;
        let raw_files = client.get_pr_files(&owner, &repo, number).await?;
        let raw_comments = client.get_pr_comments(&owner, &repo, number).await?;
        let raw_reviews = client.get_pr_reviews(&owner, &repo, number).await?;

        Ok(PullRequest {
            url: detail.html_url,
            api_url: detail.url,
            number: detail.number,
            title: detail.title,
            body: detail.body.unwrap_or_default(),
            state: detail.state,
            is_merged: detail.merged,
            created_at: detail.created_at,
            updated_at: detail.updated_at,
            merged_at: detail.merged_at,
            repo: format!("{owner}/{repo}"),
            labels: detail.labels.into_iter().map(|l| l.name).collect(),
            author: detail.user.login,
            files: raw_files.into_iter().map(to_file_change).collect(),
            comments: raw_comments
                .into_iter()
                .filter(|c| {
                    !is_noise_comment(&c.user.login, c.body.as_deref().unwrap_or(""))
                })
                .map(to_comment)
                .collect(),
            reviews: raw_reviews
                .into_iter()
                .filter(|r| !is_noise_review(&r.user.login))
                .filter_map(to_review)
                .collect(),
        })
    }

    async fn enrich_commit(
        &self,
        client: &HostClient,
        item: &CommitSearchItem,
    ) -> Result<Commit, FetchError> {
        let (owner, repo) = item
            .repository
            .full_name
            .split_once('/')
            .map(|(o, r)| (o.to_string(), r.to_string()))
            .ok_or_else(|| FetchError::Decode {
                endpoint: item.url.clone(),
                message: "commit search hit lacks repository.full_name".into(),
            })?;
        let detail = client.get_commit(&owner, &repo, &item.sha).await?;

        let author = detail
            .author
            .map(|u| u.login)
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| self.config.username.clone());
        Ok(Commit {
            sha: detail.sha,
            url: detail.html_url,
            api_url: detail.url,
            message: detail.commit.message,
            author,
            repo: item.repository.full_name.clone(),
            committed_at: detail.commit.committer.date,
            files: detail.files.into_iter().map(to_file_change).collect(),
        })
    }

    async fn enrich_issue(
        &self,
        client: &HostClient,
        item: &IssueSearchItem,
    ) -> Result<Issue, FetchError> {
        let (owner, repo, number) =
            parse_resource_url(&item.url).ok_or_else(|| FetchError::Decode {
                endpoint: item.url.clone(),
                message: "unparseable issue API URL".into(),
            })?;
        let number: u64 = number.parse().map_err(|_| FetchError::Decode {
            endpoint: item.url.clone(),
            message: "issue number is not numeric".into(),
        })?;

        let detail = client.get_issue(&owner, &repo, number).await?;
        let raw_comments = client.get_issue_comments(&owner, &repo, number).await?;

        Ok(Issue {
            url: detail.html_url,
            api_url: detail.url,
            number: detail.number,
            title: detail.title,
            body: detail.body.unwrap_or_default(),
            state: detail.state,
            created_at: detail.created_at,
            updated_at: detail.updated_at,
            closed_at: detail.closed_at,
            repo: format!("{owner}/{repo}"),
            labels: detail.labels.into_iter().map(|l| l.name).collect(),
            author: detail.user.login,
            comments: raw_comments
                .into_iter()
                .filter(|c| {
                    !is_noise_comment(&c.user.login, c.body.as_deref().unwrap_or(""))
                })
                .map(to_comment)
                .collect(),
        })
    }

    fn clear_completed_chunks(
        &self,
        chunks: &[(NaiveDate, NaiveDate)],
        types: &Option<Vec<FetchKind>>,
        outcomes: &[DateOutcome],
    ) {
        use crate::models::DateStatus;
        let failed: HashSet<&str> = outcomes
            .iter()
            .filter(|o| o.status == DateStatus::Failed)
            .map(|o| o.date.as_str())
            .collect();
        for (chunk_start, chunk_end) in chunks {
            let chunk_failed = date_range(*chunk_start, *chunk_end)
                .iter()
                .any(|d| failed.contains(fmt_date(*d).as_str()));
            if chunk_failed {
                continue;
            }
            let window = format!("{}..{}", fmt_date(*chunk_start), fmt_date(*chunk_end));
            for kind in [FetchKind::Prs, FetchKind::Commits, FetchKind::Issues] {
                if kind_enabled(types, kind) {
                    let key = format!("{window}/{}", kind.as_str());
                    if let Err(e) = self.progress.clear_chunk(&key) {
                        warn!(chunk = %key, error = %e, "could not clear chunk cache");
                    }
                }
            }
        }
    }
}

fn to_file_change(f: crate::host::wire::FileEntry) -> FileChange {
    FileChange {
        filename: f.filename,
        additions: f.additions,
        deletions: f.deletions,
        status: f.status,
        patch: f.patch,
    }
}

fn to_comment(c: CommentEntry) -> Comment {
    Comment {
        author: c.user.login,
        body: c.body.unwrap_or_default(),
        created_at: c.created_at,
        url: c.html_url,
        path: c.path,
        line: c.line,
        diff_hunk: c.diff_hunk,
    }
}

/// PENDING reviews have no submitted timestamp and are dropped.
fn to_review(r: ReviewEntry) -> Option<Review> {
    Some(Review {
        author: r.user.login,
        state: r.state,
        body: r.body.unwrap_or_default(),
        submitted_at: r.submitted_at?,
        url: r.html_url,
    })
}
