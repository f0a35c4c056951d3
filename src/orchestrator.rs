//! Batch orchestrator (spec §5): runs the fixed stage pipeline across many
//! `(restaurant, date)` pairs concurrently, bounded by a worker semaphore,
//! sharing one [`PatternStores`] across the whole batch rather than
//! allocating one per run. Grounded in the teacher's bounded-concurrency
//! idiom in `signals/wallet_analytics.rs`: an `Arc<Semaphore>` gates a
//! `FuturesUnordered` pool, one permit acquired per spawned task.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{watch, Semaphore};

use crate::config::AppConfig;
use crate::datasource::FsDataSource;
use crate::db::DatabaseClient;
use crate::domain::run_result::PipelineRunResult;
use crate::domain::time_entry::TimeEntry;
use crate::error::{ErrorBlock, PipelineError};
use crate::patterns::PatternStores;
use crate::pipeline::{self, processing::OvertimeRecord, PipelineContext};

/// One batch: a restaurant list crossed with an inclusive date range.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub restaurants: Vec<String>,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl BatchRequest {
    fn dates(&self) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        let mut cursor = self.from;
        while cursor <= self.to {
            dates.push(cursor);
            cursor = match cursor.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        dates
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchSummary {
    pub total_runs: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub date_range: DateRange,
    pub restaurants: Vec<String>,
}

/// Output of one batch: every run's result sorted by `(date, restaurant)`,
/// plus a per-restaurant weekly overtime pass computed over the whole
/// batch's time entries (spec §4.5 needs a 7-day window no single run has).
#[derive(serde::Serialize)]
pub struct BatchArtifact {
    #[serde(rename = "pipeline_runs")]
    pub runs: Vec<PipelineRunResult>,
    pub summary: BatchSummary,
    pub weekly_overtime: HashMap<String, Vec<OvertimeRecord>>,
}

pub struct Orchestrator {
    data_root: PathBuf,
    db: Arc<dyn DatabaseClient>,
    config: AppConfig,
}

impl Orchestrator {
    pub fn new(data_root: PathBuf, db: Arc<dyn DatabaseClient>, config: AppConfig) -> Self {
        Self { data_root, db, config }
    }

    pub async fn run_batch(&self, request: BatchRequest) -> BatchArtifact {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.run_batch_cancellable(request, cancel_rx).await
    }

    /// Same as [`Self::run_batch`], but stops dispatching new runs once
    /// `cancel` observes `true`. Runs already in flight complete normally;
    /// cancellation is checked between dispatches, not mid-stage, matching
    /// the CPU-bound stages' no-yield contract.
    pub async fn run_batch_cancellable(
        &self,
        request: BatchRequest,
        cancel: watch::Receiver<bool>,
    ) -> BatchArtifact {
        let patterns = Arc::new(PatternStores::with_config(self.config.pattern_learning.clone()));
        let semaphore = Arc::new(Semaphore::new(self.config.orchestrator.max_workers.max(1)));
        let soft_timeout = Duration::from_secs(self.config.orchestrator.soft_timeout_secs);
        let dates = request.dates();

        let mut futs = FuturesUnordered::new();
        'dispatch: for restaurant in &request.restaurants {
            for date in &dates {
                if *cancel.borrow() {
                    break 'dispatch;
                }
                let semaphore = semaphore.clone();
                let patterns = patterns.clone();
                let db = self.db.clone();
                let data_root = self.data_root.clone();
                let config = self.config.clone();
                let restaurant = restaurant.clone();
                let date = *date;
                futs.push(async move {
                    let _permit = semaphore.acquire_owned().await.ok()?;
                    Some(run_one(restaurant, date, data_root, config, patterns, db, soft_timeout).await)
                });
            }
        }

        let mut runs: Vec<(PipelineRunResult, Vec<TimeEntry>)> = Vec::new();
        while let Some(outcome) = futs.next().await {
            if let Some(entry) = outcome {
                runs.push(entry);
            }
        }

        runs.sort_by(|a, b| (a.0.date, a.0.restaurant.clone()).cmp(&(b.0.date, b.0.restaurant.clone())));

        let total_runs = runs.len();
        let succeeded = runs.iter().filter(|(r, _)| r.success).count();
        let failed = total_runs - succeeded;
        let success_rate = if total_runs > 0 { succeeded as f64 / total_runs as f64 } else { 0.0 };
        let mut restaurants = request.restaurants.clone();
        restaurants.sort();
        restaurants.dedup();
        let weekly_overtime = self.compute_weekly_overtime(&request, &runs);

        BatchArtifact {
            summary: BatchSummary {
                total_runs,
                succeeded,
                failed,
                success_rate,
                date_range: DateRange { from: request.from, to: request.to },
                restaurants,
            },
            runs: runs.into_iter().map(|(r, _)| r).collect(),
            weekly_overtime,
        }
    }

    /// Runs the weekly-overtime pass once per Monday-anchored week covered
    /// by the batch's date range, not just the final 7 days ending at
    /// `request.to` — a multi-week `run-range` would otherwise silently
    /// drop overtime for every week but the last (spec §4.5: "batched at
    /// orchestrator level over contiguous ranges").
    fn compute_weekly_overtime(
        &self,
        request: &BatchRequest,
        runs: &[(PipelineRunResult, Vec<TimeEntry>)],
    ) -> HashMap<String, Vec<OvertimeRecord>> {
        let mut by_restaurant: HashMap<String, Vec<(NaiveDate, Vec<TimeEntry>)>> = HashMap::new();
        for (result, entries) in runs {
            by_restaurant
                .entry(result.restaurant.clone())
                .or_default()
                .push((result.date, entries.clone()));
        }

        let week_ends = week_ends_covering(request.from, request.to);
        tracing::info!(
            weeks = week_ends.len(),
            from = %request.from,
            to = %request.to,
            "weekly overtime pass covers {} Monday-anchored week(s)",
            week_ends.len()
        );

        by_restaurant
            .into_iter()
            .map(|(restaurant, daily_entries)| {
                let mut records = Vec::new();
                for week_end in &week_ends {
                    records.extend(pipeline::processing::compute_weekly_overtime(
                        &daily_entries,
                        *week_end,
                        self.config.auto_clockout.default_hourly_rate,
                        self.config.overtime.weekly_threshold_hours,
                        self.config.overtime.multiplier,
                    ));
                }
                (restaurant, records)
            })
            .collect()
    }
}

/// Monday on or before `date` (Monday = start of week, per spec §9).
fn monday_of(date: NaiveDate) -> NaiveDate {
    date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// One week-ending Sunday per Monday-anchored week that overlaps
/// `[from, to]`, covering the whole range rather than only its final week.
fn week_ends_covering(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut week_ends = Vec::new();
    let mut monday = monday_of(from);
    while monday <= to {
        week_ends.push(monday + chrono::Duration::days(6));
        monday += chrono::Duration::days(7);
    }
    week_ends
}

async fn run_one(
    restaurant: String,
    date: NaiveDate,
    data_root: PathBuf,
    config: AppConfig,
    patterns: Arc<PatternStores>,
    db: Arc<dyn DatabaseClient>,
    soft_timeout: Duration,
) -> (PipelineRunResult, Vec<TimeEntry>) {
    let blocking_restaurant = restaurant.clone();
    let work = tokio::task::spawn_blocking(move || {
        run_one_sync(blocking_restaurant, date, data_root, config, patterns, db)
    });

    match tokio::time::timeout(soft_timeout, work).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_join_error)) => (
            PipelineRunResult::failed(
                restaurant,
                date,
                ErrorBlock::new(&PipelineError::Cancelled, "orchestrator", 0),
                0,
            ),
            Vec::new(),
        ),
        Err(_elapsed) => (
            PipelineRunResult::failed(
                restaurant,
                date,
                ErrorBlock::new(&PipelineError::Timeout, "orchestrator", soft_timeout.as_millis() as u64),
                soft_timeout.as_millis() as u64,
            ),
            Vec::new(),
        ),
    }
}

fn run_one_sync(
    restaurant: String,
    date: NaiveDate,
    data_root: PathBuf,
    config: AppConfig,
    patterns: Arc<PatternStores>,
    db: Arc<dyn DatabaseClient>,
) -> (PipelineRunResult, Vec<TimeEntry>) {
    let run_dir = data_root.join(&restaurant).join(date.format("%Y-%m-%d").to_string());
    let data_source = FsDataSource::new(run_dir);
    let mut ctx = PipelineContext::new(restaurant.clone(), date, config);

    let result = match pipeline::run_stages(&mut ctx, &data_source, &patterns) {
        Ok(()) => match pipeline::storage::run(&ctx, &*db) {
            Ok(()) => success_result(&ctx),
            Err(err) => PipelineRunResult::failed(restaurant, date, err, ctx.elapsed().as_millis() as u64),
        },
        Err(err) => PipelineRunResult::failed(restaurant, date, err, ctx.elapsed().as_millis() as u64),
    };

    (result, ctx.time_entries.clone())
}

fn success_result(ctx: &PipelineContext) -> PipelineRunResult {
    PipelineRunResult {
        restaurant: ctx.restaurant.clone(),
        date: ctx.date,
        success: true,
        error: None,
        labor_metrics: ctx.labor_metrics.clone(),
        shift_metrics: ctx.shift_metrics.clone(),
        service_mix: ctx.service_mix.clone(),
        timeslots: ctx.timeslots.clone(),
        shift_category_stats: ctx.shift_category_stats.clone(),
        cash_flow: ctx.cash_flow.clone(),
        auto_clockout_summary: ctx.auto_clockout_summary,
        auto_clockout_alerts: ctx.auto_clockout_alerts.clone(),
        pattern_learning_counts: ctx.pattern_counts.clone(),
        duration_ms: ctx.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDatabaseClient;
    use std::fs;

    fn write_minimal_run(root: &std::path::Path, restaurant: &str, date: NaiveDate) {
        let dir = root.join(restaurant).join(date.format("%Y-%m-%d").to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("labor.csv"),
            "Employee,Job Title,Clock In,Clock Out,Scheduled Hours,Total Hours,Auto Clockout\n",
        )
        .unwrap();
        fs::write(
            dir.join("sales.csv"),
            "Order ID,Order Time,Total,Channel\n",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn runs_every_restaurant_date_pair_exactly_once() {
        let tmp = tempfile::tempdir().unwrap();
        let from = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 1, 6).unwrap();
        for restaurant in ["SDR", "LHL"] {
            write_minimal_run(tmp.path(), restaurant, from);
            write_minimal_run(tmp.path(), restaurant, to);
        }

        let db = Arc::new(SqliteDatabaseClient::open_in_memory().unwrap());
        let mut config = AppConfig::default();
        config.orchestrator.max_workers = 2;
        let orchestrator = Orchestrator::new(tmp.path().to_path_buf(), db, config);

        let artifact = orchestrator
            .run_batch(BatchRequest { restaurants: vec!["SDR".into(), "LHL".into()], from, to })
            .await;

        assert_eq!(artifact.summary.total_runs, 4);
        assert_eq!(artifact.runs.len(), 4);
        let ordered: Vec<(NaiveDate, String)> =
            artifact.runs.iter().map(|r| (r.date, r.restaurant.clone())).collect();
        let mut sorted = ordered.clone();
        sorted.sort();
        assert_eq!(ordered, sorted);
    }

    #[tokio::test]
    async fn cancellation_stops_new_dispatch() {
        let tmp = tempfile::tempdir().unwrap();
        let from = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        write_minimal_run(tmp.path(), "SDR", from);

        let db = Arc::new(SqliteDatabaseClient::open_in_memory().unwrap());
        let orchestrator = Orchestrator::new(tmp.path().to_path_buf(), db, AppConfig::default());
        let (tx, rx) = watch::channel(true);
        drop(tx);

        let artifact = orchestrator
            .run_batch_cancellable(
                BatchRequest { restaurants: vec!["SDR".into()], from, to },
                rx,
            )
            .await;

        assert_eq!(artifact.summary.total_runs, 0);
    }

    #[test]
    fn week_ends_covering_spans_multiple_weeks() {
        // Monday 2026-01-05 through the following Wednesday (2026-01-14):
        // two Monday-anchored weeks overlap this range.
        let from = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 1, 14).unwrap();
        let week_ends = week_ends_covering(from, to);
        assert_eq!(
            week_ends,
            vec![
                NaiveDate::from_ymd_opt(2026, 1, 11).unwrap(),
                NaiveDate::from_ymd_opt(2026, 1, 18).unwrap(),
            ]
        );
    }

    #[test]
    fn summary_reports_success_rate_range_and_restaurants() {
        let summary = BatchSummary {
            total_runs: 4,
            succeeded: 3,
            failed: 1,
            success_rate: 0.75,
            date_range: DateRange {
                from: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                to: NaiveDate::from_ymd_opt(2026, 1, 6).unwrap(),
            },
            restaurants: vec!["LHL".into(), "SDR".into()],
        };
        assert_eq!(summary.success_rate, 0.75);
        assert_eq!(summary.restaurants, vec!["LHL".to_string(), "SDR".to_string()]);
    }
}
