//! Pipeline context, stage trait, and the fixed-order stage runner
//! (spec §4.1). Stages are plain functions over `&mut PipelineContext`
//! rather than objects implementing a `Stage` trait: the teacher crate
//! favors free functions plus a typed context (see
//! `backtest_v2::data_pipeline`) over heavier trait-object machinery when
//! the stage list is fixed and known at compile time.

pub mod cashflow;
pub mod categorization;
pub mod grading;
pub mod ingestion;
pub mod pattern_learning;
pub mod processing;
pub mod storage;

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::AppConfig;
use crate::datasource::DataSource;
use crate::domain::cash::CashFlow;
use crate::domain::labor::{LaborDto, LaborMetrics};
use crate::domain::order::{Category, OrderRecord};
use crate::domain::pattern::PatternLearningCounts;
use crate::domain::run_result::AutoClockoutSummary;
use crate::domain::shift::ShiftMetrics;
use crate::domain::time_entry::TimeEntry;
use crate::domain::timeslot::{CategoryStats, Timeslot};
use crate::error::{ErrorBlock, PipelineError};
use crate::patterns::PatternStores;

/// Raw tabular view of one CSV, as string records (header + rows), kept
/// only for the lifetime of a single run.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    pub fn get<'a>(&'a self, row: &'a [String], name: &str) -> Option<&'a str> {
        self.column_index(name).and_then(|i| row.get(i)).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct QualityMetrics {
    pub row_counts: HashMap<String, usize>,
    pub non_null_rates: HashMap<String, f64>,
    pub timestamp_parse_rate: Option<f64>,
    pub overall_score: f64,
    pub warnings: Vec<String>,
}

/// Typed key/value store carrying all state shared across the six fixed
/// stages for one `(restaurant, date)` run. Each field corresponds to a
/// well-known key from spec §4.1; stages only write the fields they own.
pub struct PipelineContext {
    pub restaurant: String,
    pub date: NaiveDate,
    pub config: AppConfig,

    // Ingestion outputs
    pub raw_tables: HashMap<String, RawTable>,
    pub sales: Option<f64>,
    pub total_payroll_cost: Option<f64>,
    pub time_entries: Vec<TimeEntry>,
    pub quality: QualityMetrics,

    // Categorization outputs
    pub categorized_orders: Vec<OrderRecord>,
    pub order_categories: HashMap<String, Category>,
    pub service_mix: HashMap<Category, f64>,

    // Grading outputs
    pub timeslots: Vec<Timeslot>,
    pub shift_category_stats: HashMap<crate::domain::order::Shift, HashMap<Category, CategoryStats>>,

    // Processing outputs
    pub labor_dto: Option<LaborDto>,
    pub labor_metrics: Option<LaborMetrics>,
    pub shift_metrics: Option<ShiftMetrics>,
    pub auto_clockout_summary: AutoClockoutSummary,
    pub auto_clockout_alerts: Vec<crate::pipeline::processing::AutoClockoutAlert>,
    pub weekly_overtime: Vec<crate::pipeline::processing::OvertimeRecord>,
    pub cash_flow: Option<CashFlow>,

    // Pattern learning outputs
    pub pattern_counts: PatternLearningCounts,

    // Bookkeeping
    pub stage_durations: Vec<(String, Duration)>,
    pub metadata: HashMap<String, String>,
    started_at: Instant,
}

impl PipelineContext {
    pub fn new(restaurant: String, date: NaiveDate, config: AppConfig) -> Self {
        Self {
            restaurant,
            date,
            config,
            raw_tables: HashMap::new(),
            sales: None,
            total_payroll_cost: None,
            time_entries: Vec::new(),
            quality: QualityMetrics::default(),
            categorized_orders: Vec::new(),
            order_categories: HashMap::new(),
            service_mix: HashMap::new(),
            timeslots: Vec::new(),
            shift_category_stats: HashMap::new(),
            labor_dto: None,
            labor_metrics: None,
            shift_metrics: None,
            auto_clockout_summary: AutoClockoutSummary::default(),
            auto_clockout_alerts: Vec::new(),
            weekly_overtime: Vec::new(),
            cash_flow: None,
            pattern_counts: PatternLearningCounts::default(),
            stage_durations: Vec::new(),
            metadata: HashMap::new(),
            started_at: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn day_start(&self) -> NaiveDateTime {
        self.date.and_hms_opt(0, 0, 0).expect("midnight always valid")
    }

    /// Metadata-only checkpoint: stage completion flags/durations and the
    /// scalars already computed, never the raw tables. Suitable for
    /// resuming a batch between stages, not mid-stage.
    pub fn checkpoint(&self) -> ContextCheckpoint {
        ContextCheckpoint {
            restaurant: self.restaurant.clone(),
            date: self.date,
            completed_stages: self.stage_durations.iter().map(|(n, _)| n.clone()).collect(),
            stage_durations_ms: self
                .stage_durations
                .iter()
                .map(|(n, d)| (n.clone(), d.as_millis() as u64))
                .collect(),
            sales: self.sales,
            total_payroll_cost: self.total_payroll_cost,
            metadata: self.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ContextCheckpoint {
    pub restaurant: String,
    pub date: NaiveDate,
    pub completed_stages: Vec<String>,
    pub stage_durations_ms: Vec<(String, u64)>,
    pub sales: Option<f64>,
    pub total_payroll_cost: Option<f64>,
    pub metadata: HashMap<String, String>,
}

/// A stage is a named function over the context that either mutates it in
/// place or returns a `PipelineError` describing what went wrong. The
/// runner annotates failures with stage name + elapsed time.
pub type StageFn = fn(&mut PipelineContext, &dyn DataSource, &PatternStores) -> Result<()>;

pub struct NamedStage {
    pub name: &'static str,
    pub run: StageFn,
}

pub const STAGES: &[NamedStage] = &[
    NamedStage { name: "ingestion", run: ingestion::run },
    NamedStage { name: "categorization", run: categorization::run },
    NamedStage { name: "grading", run: grading::run },
    NamedStage { name: "processing", run: processing::run },
    NamedStage { name: "cashflow", run: cashflow::run },
    NamedStage { name: "pattern_learning", run: pattern_learning::run },
];

/// Runs the fixed stage list sequentially against `ctx`, stopping at the
/// first failure. Storage is intentionally excluded from `STAGES` because
/// it needs a `DatabaseClient` the orchestrator owns, not a `DataSource`;
/// callers run it as a seventh step after `run_stages` succeeds.
pub fn run_stages(
    ctx: &mut PipelineContext,
    data_source: &dyn DataSource,
    patterns: &PatternStores,
) -> std::result::Result<(), ErrorBlock> {
    for stage in STAGES {
        let stage_start = Instant::now();
        let result = (stage.run)(ctx, data_source, patterns);
        let elapsed = stage_start.elapsed();
        ctx.stage_durations.push((stage.name.to_string(), elapsed));
        if let Err(err) = result {
            let pipeline_error = classify(&err);
            return Err(ErrorBlock::new(&pipeline_error, stage.name, ctx.elapsed().as_millis() as u64));
        }
    }
    Ok(())
}

fn classify(err: &anyhow::Error) -> PipelineError {
    for cause in err.chain() {
        if let Some(pipeline_error) = cause.downcast_ref::<PipelineError>() {
            return pipeline_error.clone();
        }
    }
    PipelineError::Validation(err.to_string())
}
