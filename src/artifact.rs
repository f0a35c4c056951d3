//! External artifact writers (spec §6): the batch artifact JSON and the
//! dashboard JS module a downstream transformer consumes. Both are plain
//! `std::fs::write` of a formatted string — a templating crate isn't
//! warranted for one JSON document and one `const v4Data = ...;` assignment.

use std::path::Path;

use chrono::{Datelike, NaiveDate};
use serde_json::{json, Value};

use crate::domain::order::Shift;
use crate::domain::run_result::PipelineRunResult;
use crate::error::PipelineError;
use crate::orchestrator::BatchArtifact;

fn io_error(detail: impl ToString) -> PipelineError {
    PipelineError::Storage { table: "<artifact>".into(), detail: detail.to_string() }
}

/// Writes the full batch artifact (`pipeline_runs[]` + `summary`) as
/// pretty-printed JSON at `path`.
pub fn write_batch_artifact(artifact: &BatchArtifact, path: &Path) -> Result<(), PipelineError> {
    let body = serde_json::to_string_pretty(artifact).map_err(io_error)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    std::fs::write(path, body).map_err(io_error)
}

/// Transforms a batch artifact into the dashboard's `v4Data` JS module:
/// Monday-anchored ISO weeks, each with `overview`, `restaurants[]`
/// (nested `dailyBreakdown[]`, lowercase `shifts.{morning,evening}`), and
/// `autoClockoutAlerts[]`.
pub fn write_dashboard_js(artifact: &BatchArtifact, path: &Path) -> Result<(), PipelineError> {
    let weeks = build_weeks(&artifact.runs);
    let body = format!("const v4Data = {};\n", serde_json::to_string_pretty(&weeks).map_err(io_error)?);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    std::fs::write(path, body).map_err(io_error)
}

fn iso_week_key(date: NaiveDate) -> (i32, u32) {
    let week = date.iso_week();
    (week.year(), week.week())
}

fn build_weeks(runs: &[PipelineRunResult]) -> Value {
    let mut week_keys: Vec<(i32, u32)> = runs.iter().map(|r| iso_week_key(r.date)).collect();
    week_keys.sort_unstable();
    week_keys.dedup();

    let mut weeks = serde_json::Map::new();
    for (i, key) in week_keys.iter().enumerate() {
        let week_runs: Vec<&PipelineRunResult> =
            runs.iter().filter(|r| iso_week_key(r.date) == *key).collect();
        weeks.insert(format!("week{}", i + 1), build_week(&week_runs));
    }
    Value::Object(weeks)
}

fn build_week(runs: &[&PipelineRunResult]) -> Value {
    let total_sales: f64 = runs
        .iter()
        .filter_map(|r| r.shift_metrics.as_ref())
        .map(|s| s.morning.sales + s.evening.sales)
        .sum();
    let total_labor_cost: f64 = runs
        .iter()
        .filter_map(|r| r.shift_metrics.as_ref())
        .map(|s| s.morning.labor + s.evening.labor)
        .sum();
    let succeeded = runs.iter().filter(|r| r.success).count();

    let mut restaurants: Vec<String> = runs.iter().map(|r| r.restaurant.clone()).collect();
    restaurants.sort();
    restaurants.dedup();

    let restaurant_entries: Vec<Value> = restaurants
        .iter()
        .map(|restaurant| build_restaurant(restaurant, runs))
        .collect();

    let auto_clockout_alerts: Vec<Value> = runs
        .iter()
        .flat_map(|r| r.auto_clockout_alerts.iter().map(move |a| {
            json!({
                "restaurant": r.restaurant,
                "date": r.date.to_string(),
                "employeeName": a.employee_name,
                "suggestedHours": a.suggested_hours,
                "recordedHours": a.recorded_hours,
                "hoursDifference": a.hours_difference,
                "costImpact": a.cost_impact,
            })
        }))
        .collect();

    json!({
        "overview": {
            "totalSales": total_sales,
            "totalLaborCost": total_labor_cost,
            "runsTotal": runs.len(),
            "runsSucceeded": succeeded,
            "runsFailed": runs.len() - succeeded,
        },
        "restaurants": restaurant_entries,
        "autoClockoutAlerts": auto_clockout_alerts,
    })
}

fn build_restaurant(restaurant: &str, runs: &[&PipelineRunResult]) -> Value {
    let mut daily: Vec<&PipelineRunResult> = runs.iter().copied().filter(|r| r.restaurant == restaurant).collect();
    daily.sort_by_key(|r| r.date);

    let breakdown: Vec<Value> = daily.iter().map(|r| build_daily_entry(r)).collect();

    json!({
        "restaurant": restaurant,
        "dailyBreakdown": breakdown,
    })
}

fn build_daily_entry(run: &PipelineRunResult) -> Value {
    if !run.success {
        return json!({
            "date": run.date.to_string(),
            "success": false,
            "error": run.error,
        });
    }

    let shifts = run.shift_metrics.as_ref().map(|metrics| {
        json!({
            "morning": build_shift_entry(&metrics.morning, run, Shift::Morning),
            "evening": build_shift_entry(&metrics.evening, run, Shift::Evening),
        })
    });

    json!({
        "date": run.date.to_string(),
        "success": true,
        "laborMetrics": run.labor_metrics,
        "shifts": shifts,
        "timeslots": run.timeslots,
        "cashFlow": run.cash_flow,
        "autoClockoutSummary": run.auto_clockout_summary,
    })
}

fn build_shift_entry(
    single: &crate::domain::shift::SingleShiftMetrics,
    run: &PipelineRunResult,
    shift: Shift,
) -> Value {
    let category_stats = run.shift_category_stats.get(&shift);
    json!({
        "sales": single.sales,
        "labor": single.labor,
        "manager": single.manager,
        "orderCount": single.order_count,
        "voids": single.voids,
        "categoryStats": category_stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{BatchSummary, DateRange};
    use std::collections::HashMap;

    fn sample_run(restaurant: &str, date: NaiveDate) -> PipelineRunResult {
        let mut result = PipelineRunResult::failed(
            restaurant.to_string(),
            date,
            crate::error::ErrorBlock::new(&PipelineError::Timeout, "ingestion", 10),
            10,
        );
        result.success = false;
        result
    }

    #[test]
    fn groups_runs_into_sequential_week_keys() {
        let week1_date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(); // Monday
        let week2_date = NaiveDate::from_ymd_opt(2026, 1, 12).unwrap(); // next Monday
        let artifact = BatchArtifact {
            runs: vec![sample_run("SDR", week1_date), sample_run("SDR", week2_date)],
            summary: BatchSummary {
                total_runs: 2,
                succeeded: 0,
                failed: 2,
                success_rate: 0.0,
                date_range: DateRange { from: week1_date, to: week2_date },
                restaurants: vec!["SDR".to_string()],
            },
            weekly_overtime: HashMap::new(),
        };

        let weeks = build_weeks(&artifact.runs);
        let obj = weeks.as_object().unwrap();
        assert!(obj.contains_key("week1"));
        assert!(obj.contains_key("week2"));
    }

    #[test]
    fn failed_runs_render_without_shift_data() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let run = sample_run("SDR", date);
        let entry = build_daily_entry(&run);
        assert_eq!(entry["success"], json!(false));
        assert!(entry.get("shifts").is_none());
    }
}
