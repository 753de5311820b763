//! Thin composition of the three stage services.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use tracing::{info, warn};

use crate::dates::date_range;
use crate::error::{RecapError, Result};
use crate::models::{DateOutcome, DateStatus};
use crate::services::{FetchKind, Fetcher, Normalizer, Summarizer};

/// Options forwarded to the three range methods.
#[derive(Debug, Clone, Default)]
pub struct RangeOptions {
    pub force: bool,
    pub types: Option<Vec<FetchKind>>,
    pub max_workers: usize,
    pub batch: bool,
    pub enrich: bool,
    pub weekly: bool,
    pub monthly: bool,
    pub yearly: bool,
}

/// Fetch → Normalize → Summarize composer.
pub struct Orchestrator {
    fetcher: Arc<Fetcher>,
    normalizer: Arc<Normalizer>,
    summarizer: Arc<Summarizer>,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<Fetcher>,
        normalizer: Arc<Normalizer>,
        summarizer: Arc<Summarizer>,
    ) -> Self {
        Orchestrator {
            fetcher,
            normalizer,
            summarizer,
        }
    }

    /// Full single-date pipeline. A stage failure is rewrapped with the
    /// stage name; prior-stage outputs stay on disk.
    pub async fn run_daily(
        &self,
        date: NaiveDate,
        types: Option<&[FetchKind]>,
        enrich: bool,
    ) -> Result<PathBuf> {
        info!(date = %date, "pipeline start");

        self.fetcher
            .fetch(date, types)
            .await
            .map_err(|e| RecapError::step("fetch", e))?;
        info!(date = %date, "phase complete: fetch");

        self.normalizer
            .normalize(date, enrich)
            .await
            .map_err(|e| RecapError::step("normalize", e))?;
        info!(date = %date, "phase complete: normalize");

        let summary_path = self
            .summarizer
            .daily(date)
            .await
            .map_err(|e| RecapError::step("summarize", e))?;
        info!(date = %date, path = %summary_path.display(), "pipeline complete");
        Ok(summary_path)
    }

    /// Range backfill: each service runs its own range loop (the per-date
    /// loop lives inside the services, not here), then the three result
    /// lists merge into one per-date status list. When cascade flags are
    /// set and the daily pipeline had no failures, the weekly / monthly /
    /// yearly summaries covering the range are rebuilt — `yearly` implies
    /// `monthly` implies `weekly`.
    pub async fn run_range(
        &self,
        since: NaiveDate,
        until: NaiveDate,
        options: RangeOptions,
    ) -> Result<Vec<DateOutcome>> {
        if since > until {
            return Ok(Vec::new());
        }
        info!(since = %since, until = %until, ?options, "pipeline range start");

        let fetch_results = self
            .fetcher
            .fetch_range(
                since,
                until,
                options.types.as_deref(),
                options.force,
                options.max_workers,
            )
            .await?;
        let normalize_results = self
            .normalizer
            .normalize_range(
                since,
                until,
                options.force,
                options.max_workers,
                options.enrich,
                options.batch,
            )
            .await?;
        let summarize_results = self
            .summarizer
            .daily_range(
                since,
                until,
                options.force,
                options.max_workers,
                options.batch,
            )
            .await?;

        let merged = merge_results(&[
            ("fetch", fetch_results),
            ("normalize", normalize_results),
            ("summarize", summarize_results),
        ]);

        let succeeded = merged
            .iter()
            .filter(|r| r.status == DateStatus::Success)
            .count();
        let failed = merged
            .iter()
            .filter(|r| r.status == DateStatus::Failed)
            .count();
        info!(total = merged.len(), succeeded, failed, "range complete");

        if options.weekly || options.monthly || options.yearly {
            if failed > 0 {
                warn!(failed, "skipping summary cascade: daily pipeline had failures");
            } else {
                self.run_cascade(since, until, &options).await?;
            }
        }

        Ok(merged)
    }

    async fn run_cascade(
        &self,
        since: NaiveDate,
        until: NaiveDate,
        options: &RangeOptions,
    ) -> Result<()> {
        let dates = date_range(since, until);

        // Yearly implies monthly implies weekly.
        let do_monthly = options.monthly || options.yearly;

        let mut weeks: Vec<(i32, u32)> = dates
            .iter()
            .map(|d| {
                let iso = d.iso_week();
                (iso.year(), iso.week())
            })
            .collect();
        weeks.dedup();
        for (year, week) in weeks {
            self.summarizer.weekly(year, week, options.force).await?;
        }

        if do_monthly {
            let mut months: Vec<(i32, u32)> = dates.iter().map(|d| (d.year(), d.month())).collect();
            months.dedup();
            for (year, month) in months {
                self.summarizer.monthly(year, month, options.force).await?;
            }
        }

        if options.yearly {
            let mut years: Vec<i32> = dates.iter().map(|d| d.year()).collect();
            years.dedup();
            for year in years {
                self.summarizer.yearly(year, options.force).await?;
            }
        }
        Ok(())
    }
}

/// Merge per-phase outcome lists into one per-date list. A failure in any
/// phase marks the date failed with the phase name attached; a date skipped
/// by every phase stays skipped; anything else is a success.
fn merge_results(phases: &[(&'static str, Vec<DateOutcome>)]) -> Vec<DateOutcome> {
    let mut dates: Vec<&str> = Vec::new();
    let mut by_phase: Vec<(&'static str, BTreeMap<&str, &DateOutcome>)> = Vec::new();
    for (name, outcomes) in phases {
        let map: BTreeMap<&str, &DateOutcome> =
            outcomes.iter().map(|o| (o.date.as_str(), o)).collect();
        for date in map.keys() {
            if !dates.contains(date) {
                dates.push(*date);
            }
        }
        by_phase.push((name, map));
    }
    dates.sort_unstable();

    dates
        .into_iter()
        .map(|date| {
            let mut all_skipped = true;
            for (phase, map) in &by_phase {
                match map.get(date) {
                    Some(outcome) if outcome.status == DateStatus::Failed => {
                        let cause = outcome.error.as_deref().unwrap_or("unknown error");
                        return DateOutcome::failed(
                            date,
                            format!("pipeline failed at '{phase}': {cause}"),
                        );
                    }
                    Some(outcome) if outcome.status != DateStatus::Skipped => {
                        all_skipped = false;
                    }
                    _ => {}
                }
            }
            if all_skipped {
                DateOutcome::skipped(date)
            } else {
                DateOutcome::success(date)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_failures_and_names_the_phase() {
        let merged = merge_results(&[
            (
                "fetch",
                vec![
                    DateOutcome::success("2025-02-14"),
                    DateOutcome::failed("2025-02-15", "Server error 500 after 3 retries"),
                    DateOutcome::success("2025-02-16"),
                ],
            ),
            (
                "normalize",
                vec![
                    DateOutcome::success("2025-02-14"),
                    DateOutcome::failed("2025-02-15", "raw file not found"),
                    DateOutcome::success("2025-02-16"),
                ],
            ),
            (
                "summarize",
                vec![
                    DateOutcome::success("2025-02-14"),
                    DateOutcome::success("2025-02-16"),
                ],
            ),
        ]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].status, DateStatus::Success);
        assert_eq!(merged[1].status, DateStatus::Failed);
        let error = merged[1].error.as_deref().unwrap();
        assert!(error.contains("pipeline failed at 'fetch'"), "{error}");
        assert!(error.contains("Server error 500"), "{error}");
        assert_eq!(merged[2].status, DateStatus::Success);
    }

    #[test]
    fn merge_keeps_fully_skipped_dates_skipped() {
        let merged = merge_results(&[
            ("fetch", vec![DateOutcome::skipped("2025-02-14")]),
            ("normalize", vec![DateOutcome::skipped("2025-02-14")]),
            ("summarize", vec![DateOutcome::skipped("2025-02-14")]),
        ]);
        assert_eq!(merged[0].status, DateStatus::Skipped);
    }

    #[test]
    fn merge_treats_partial_work_as_success() {
        // Fetch skipped (fresh) but normalize re-ran: the date did work.
        let merged = merge_results(&[
            ("fetch", vec![DateOutcome::skipped("2025-02-14")]),
            ("normalize", vec![DateOutcome::success("2025-02-14")]),
            ("summarize", vec![DateOutcome::success("2025-02-14")]),
        ]);
        assert_eq!(merged[0].status, DateStatus::Success);
    }
}
