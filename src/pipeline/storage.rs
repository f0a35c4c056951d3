//! Storage stage (spec §4.8): persist one run's results through a
//! [`DatabaseClient`]. Run as a seventh step by the orchestrator after
//! [`super::run_stages`] succeeds — it needs a database handle, not a
//! [`crate::datasource::DataSource`], so it sits outside the fixed `STAGES`
//! list.

use std::time::Instant;

use crate::db::DatabaseClient;
use crate::error::{ErrorBlock, PipelineError};
use crate::pipeline::PipelineContext;

pub fn run(ctx: &PipelineContext, db: &dyn DatabaseClient) -> Result<(), ErrorBlock> {
    let started = Instant::now();
    db.persist_run(ctx).map_err(|err| {
        let pipeline_error = match err {
            PipelineError::Storage { table, detail } => PipelineError::Storage { table, detail },
            other => other,
        };
        ErrorBlock::new(&pipeline_error, "storage", started.elapsed().as_millis() as u64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::SqliteDatabaseClient;
    use crate::domain::labor::{LaborDto, LaborMetrics};
    use crate::domain::shift::{ShiftMetrics, SingleShiftMetrics, SplitMethod};
    use crate::domain::timeslot::Timeslot;
    use chrono::NaiveDate;

    #[test]
    fn persists_a_complete_run() {
        let mut ctx = PipelineContext::new(
            "SDR".into(),
            NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            AppConfig::default(),
        );
        ctx.sales = Some(4000.0);
        ctx.labor_dto = Some(LaborDto::new(150.0, 1000.0, 10));
        ctx.labor_metrics = Some(LaborMetrics::compute(1000.0, 4000.0));
        ctx.shift_metrics = Some(ShiftMetrics {
            morning: SingleShiftMetrics { sales: 1500.0, labor: 400.0, manager: "Alice".into(), voids: 0.0, order_count: 40 },
            evening: SingleShiftMetrics { sales: 2500.0, labor: 600.0, manager: "Bob".into(), voids: 0.0, order_count: 60 },
            split_method: SplitMethod::Timestamp,
        });
        ctx.timeslots = (0..64).map(Timeslot::empty).collect();

        let db = SqliteDatabaseClient::open_in_memory().unwrap();
        run(&ctx, &db).unwrap();
    }

    #[test]
    fn storage_failure_surfaces_storage_error() {
        struct FailingClient;
        impl DatabaseClient for FailingClient {
            fn persist_run(&self, _ctx: &PipelineContext) -> Result<(), PipelineError> {
                Err(PipelineError::Storage { table: "daily_operations".into(), detail: "disk full".into() })
            }
        }
        let ctx = PipelineContext::new(
            "SDR".into(),
            NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            AppConfig::default(),
        );
        let err = run(&ctx, &FailingClient).unwrap_err();
        assert_eq!(err.kind, "StorageError");
        assert_eq!(err.stage, "storage");
    }
}
