//! Processing stage (spec §4.5): daily labor metrics, morning/evening
//! shift split, auto-clockout analysis, weekly overtime.

use anyhow::Result;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::datasource::DataSource;
use crate::domain::labor::{LaborDto, LaborMetrics};
use crate::domain::order::OrderRecord;
use crate::domain::run_result::AutoClockoutSummary;
use crate::domain::shift::{ShiftMetrics, SingleShiftMetrics, SplitMethod};
use crate::domain::time_entry::TimeEntry;
use crate::patterns::PatternStores;
use crate::pipeline::PipelineContext;

pub fn run(
    ctx: &mut PipelineContext,
    _data_source: &dyn DataSource,
    _patterns: &PatternStores,
) -> Result<()> {
    let sales = ctx.sales.unwrap_or(0.0);
    let total_labor_cost = ctx
        .total_payroll_cost
        .unwrap_or_else(|| ctx.time_entries.iter().map(|e| e.payable_hours).sum::<f64>() * ctx.config.auto_clockout.default_hourly_rate);
    let total_hours_worked: f64 = ctx.time_entries.iter().map(|e| e.payable_hours).sum();

    ctx.labor_dto = Some(LaborDto::new(
        total_hours_worked,
        total_labor_cost,
        ctx.time_entries.len() as u32,
    ));
    ctx.labor_metrics = Some(LaborMetrics::compute(total_labor_cost, sales));

    ctx.shift_metrics = Some(compute_shift_split(
        &ctx.categorized_orders,
        &ctx.time_entries,
        sales,
        total_labor_cost,
        ctx.config.shifts.cutoff_hour,
        &ctx.config.shifts.manager_job_keywords,
        ctx.date,
    ));

    ctx.auto_clockout_summary = compute_auto_clockout(ctx)?;
    ctx.weekly_overtime = Vec::new(); // populated by the orchestrator's weekly pass (see run_weekly_overtime)

    Ok(())
}

fn compute_shift_split(
    orders: &[OrderRecord],
    time_entries: &[TimeEntry],
    sales: f64,
    labor_cost: f64,
    cutoff_hour: u32,
    manager_keywords: &[String],
    date: NaiveDate,
) -> ShiftMetrics {
    let timestamped: Vec<&OrderRecord> = orders.iter().filter(|o| o.order_time.is_some()).collect();

    let (morning_ratio, method) = if timestamped.is_empty() {
        (0.35, SplitMethod::FixedRatio)
    } else {
        let morning_count = timestamped
            .iter()
            .filter(|o| o.order_time.unwrap().time().hour() < cutoff_hour)
            .count();
        (morning_count as f64 / timestamped.len() as f64, SplitMethod::Timestamp)
    };
    let evening_ratio = 1.0 - morning_ratio;

    let morning_orders = orders
        .iter()
        .filter(|o| {
            o.order_time
                .map(|t| t.time().hour() < cutoff_hour)
                .unwrap_or(false)
        })
        .count() as u64;
    let evening_orders = orders.len() as u64 - morning_orders.min(orders.len() as u64);

    let morning_start = date.and_time(NaiveTime::from_hms_opt(0, 0, 0).unwrap());
    let cutoff = date.and_time(NaiveTime::from_hms_opt(cutoff_hour, 0, 0).unwrap());
    let evening_end = date
        .succ_opt()
        .unwrap_or(date)
        .and_time(NaiveTime::from_hms_opt(0, 0, 0).unwrap());

    let morning_manager = earliest_manager(time_entries, morning_start, cutoff, manager_keywords);
    let evening_manager = earliest_manager(time_entries, cutoff, evening_end, manager_keywords);

    ShiftMetrics {
        morning: SingleShiftMetrics {
            sales: sales * morning_ratio,
            labor: labor_cost * morning_ratio,
            manager: morning_manager,
            voids: 0.0,
            order_count: morning_orders,
        },
        evening: SingleShiftMetrics {
            sales: sales * evening_ratio,
            labor: labor_cost * evening_ratio,
            manager: evening_manager,
            voids: 0.0,
            order_count: evening_orders,
        },
        split_method: method,
    }
}

fn earliest_manager(
    time_entries: &[TimeEntry],
    window_start: NaiveDateTime,
    window_end: NaiveDateTime,
    manager_keywords: &[String],
) -> String {
    time_entries
        .iter()
        .filter(|e| {
            manager_keywords
                .iter()
                .any(|k| e.job_title.to_lowercase().contains(&k.to_lowercase()))
                && e.overlaps(window_start, window_end)
        })
        .min_by_key(|e| e.clock_in)
        .map(|e| e.employee_name.clone())
        .unwrap_or_else(|| "Not Assigned".to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoClockoutAlert {
    pub employee_name: String,
    pub suggested_hours: f64,
    pub recorded_hours: f64,
    pub hours_difference: f64,
    pub cost_impact: f64,
}

fn compute_auto_clockout(ctx: &mut PipelineContext) -> Result<AutoClockoutSummary> {
    let day_category = if ctx.date.weekday() == chrono::Weekday::Sun { "sunday" } else { "weekday" };
    let hourly_rate = ctx.config.auto_clockout.default_hourly_rate;
    let mut summary = AutoClockoutSummary::default();
    let mut alerts = Vec::new();

    for entry in &ctx.time_entries {
        if !entry.auto_clockout || entry.is_system_or_cashier() {
            continue;
        }
        let role = if entry.job_title.to_lowercase().contains("cook")
            || entry.job_title.to_lowercase().contains("kitchen")
        {
            "BOH"
        } else {
            "FOH"
        };
        let lookup_key = format!("{}:{}:{}", ctx.restaurant, role, day_category);
        let Some(expected_end_str) = ctx.config.auto_clockout.shift_schedules.get(&lookup_key) else {
            continue;
        };
        let Some(expected_end_time) = NaiveTime::parse_from_str(expected_end_str, "%H:%M").ok() else {
            continue;
        };
        let expected_end = entry.clock_in.date().and_time(expected_end_time);
        let suggested_hours = (expected_end - entry.clock_in).num_minutes() as f64 / 60.0;
        let recorded_hours = entry.total_hours;
        let hours_difference = (recorded_hours - suggested_hours).max(0.0);
        let cost_impact = hours_difference * hourly_rate;

        summary.alert_count += 1;
        summary.total_hours_difference += hours_difference;
        summary.total_cost_impact += cost_impact;
        alerts.push(AutoClockoutAlert {
            employee_name: entry.employee_name.clone(),
            suggested_hours,
            recorded_hours,
            hours_difference,
            cost_impact,
        });
    }

    ctx.auto_clockout_alerts = alerts;
    Ok(summary)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OvertimeSeverity {
    Normal,
    Warning,
    Critical,
}

impl OvertimeSeverity {
    pub fn from_overtime_hours(hours: f64) -> Self {
        if hours < 10.0 {
            OvertimeSeverity::Normal
        } else if hours < 20.0 {
            OvertimeSeverity::Warning
        } else {
            OvertimeSeverity::Critical
        }
    }
}

#[derive(Debug, Clone)]
pub struct OvertimeRecord {
    pub employee_name: String,
    pub total_weekly_hours: f64,
    pub overtime_hours: f64,
    pub overtime_cost: f64,
    pub severity: OvertimeSeverity,
}

/// Weekly overtime (spec §4.5), computed over the 7-day window ending at
/// `date` across daily payable-hours entries already collected by the
/// orchestrator for each day in range. Kept as a free function (not part
/// of the per-run `STAGES` list) because it needs a 7-day history the
/// single-run context doesn't carry.
pub fn compute_weekly_overtime(
    daily_entries: &[(NaiveDate, Vec<TimeEntry>)],
    week_end: NaiveDate,
    hourly_rate_default: f64,
    threshold_hours: f64,
    multiplier: f64,
) -> Vec<OvertimeRecord> {
    let week_start = week_end - chrono::Duration::days(6);
    let mut hours_by_employee: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
    for (date, entries) in daily_entries {
        if *date < week_start || *date > week_end {
            continue;
        }
        for entry in entries {
            *hours_by_employee.entry(entry.employee_name.clone()).or_insert(0.0) += entry.payable_hours;
        }
    }

    hours_by_employee
        .into_iter()
        .filter(|(_, hours)| *hours > threshold_hours)
        .map(|(employee_name, total_weekly_hours)| {
            let overtime_hours = total_weekly_hours - threshold_hours;
            let overtime_cost = overtime_hours * hourly_rate_default * multiplier;
            OvertimeRecord {
                severity: OvertimeSeverity::from_overtime_hours(overtime_hours),
                employee_name,
                total_weekly_hours,
                overtime_hours,
                overtime_cost,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn sales_zero_labor_percentage_zero() {
        let metrics = crate::domain::labor::LaborMetrics::compute(100.0, 0.0);
        assert_eq!(metrics.labor_percentage, 0.0);
        assert_eq!(metrics.grade.as_str(), "F");
        assert_eq!(metrics.status.as_str(), "SEVERE");
    }

    #[test]
    fn labor_grading_scenario() {
        let metrics = crate::domain::labor::LaborMetrics::compute(1424.28, 3036.40);
        assert!((metrics.labor_percentage - 46.91).abs() < 0.01);
        assert_eq!(metrics.status.as_str(), "SEVERE");
        assert_eq!(metrics.grade.as_str(), "F");
    }

    #[test]
    fn exactly_forty_hours_has_no_overtime() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let entry = TimeEntry::new(
            "Alice".into(),
            "Server".into(),
            date.and_hms_opt(6, 0, 0).unwrap(),
            date.and_hms_opt(14, 0, 0).unwrap(),
            8.0,
            40.0,
            false,
        )
        .unwrap();
        let records = compute_weekly_overtime(&[(date, vec![entry])], date, 15.0, 40.0, 1.5);
        assert!(records.is_empty());
    }

    #[test]
    fn auto_clockout_cost_impact_scenario() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(); // Monday
        let mut ctx = PipelineContext::new("SDR".into(), date, crate::config::AppConfig::default());
        ctx.config
            .auto_clockout
            .shift_schedules
            .insert("SDR:FOH:weekday".to_string(), "14:00".to_string());
        let entry = TimeEntry::new(
            "Bob".into(),
            "Server".into(),
            date.and_hms_opt(7, 0, 0).unwrap(),
            date.and_hms_opt(19, 0, 0).unwrap(),
            12.0,
            12.0,
            true,
        )
        .unwrap();
        ctx.time_entries = vec![entry];
        let summary = compute_auto_clockout(&mut ctx).unwrap();
        assert_eq!(summary.alert_count, 1);
        assert!((summary.total_hours_difference - 5.0).abs() < 1e-9);
        assert!((summary.total_cost_impact - 75.0).abs() < 1e-9);
    }
}
