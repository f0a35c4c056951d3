use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::cash::CashFlow;
use crate::domain::labor::LaborMetrics;
use crate::domain::order::{Category, Shift};
use crate::domain::pattern::PatternLearningCounts;
use crate::domain::shift::ShiftMetrics;
use crate::domain::timeslot::{CategoryStats, Timeslot};
use crate::error::ErrorBlock;
use crate::pipeline::processing::AutoClockoutAlert;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AutoClockoutSummary {
    pub alert_count: u32,
    pub total_hours_difference: f64,
    pub total_cost_impact: f64,
}

/// Everything collected for a single `(restaurant, date)` run, emitted
/// exactly once whether the run succeeded or failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunResult {
    pub restaurant: String,
    pub date: NaiveDate,
    pub success: bool,
    pub error: Option<ErrorBlock>,
    pub labor_metrics: Option<LaborMetrics>,
    pub shift_metrics: Option<ShiftMetrics>,
    pub service_mix: HashMap<Category, f64>,
    pub timeslots: Vec<Timeslot>,
    pub shift_category_stats: HashMap<Shift, HashMap<Category, CategoryStats>>,
    pub cash_flow: Option<CashFlow>,
    pub auto_clockout_summary: AutoClockoutSummary,
    pub auto_clockout_alerts: Vec<AutoClockoutAlert>,
    pub pattern_learning_counts: PatternLearningCounts,
    pub duration_ms: u64,
}

impl PipelineRunResult {
    pub fn failed(restaurant: String, date: NaiveDate, error: ErrorBlock, duration_ms: u64) -> Self {
        Self {
            restaurant,
            date,
            success: false,
            error: Some(error),
            labor_metrics: None,
            shift_metrics: None,
            service_mix: HashMap::new(),
            timeslots: Vec::new(),
            shift_category_stats: HashMap::new(),
            cash_flow: None,
            auto_clockout_summary: AutoClockoutSummary::default(),
            auto_clockout_alerts: Vec::new(),
            pattern_learning_counts: PatternLearningCounts::default(),
            duration_ms,
        }
    }
}
