//! Database client (spec §4.8, §6): the three-table schema and a
//! `rusqlite`-backed client wrapped in one transaction per run.

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;

use crate::domain::order::{Category, Shift};
use crate::domain::timeslot::Timeslot;
use crate::error::PipelineError;
use crate::pipeline::PipelineContext;

/// Shared read/write access to the three operational tables. Implementations
/// must be safe for concurrent calls from multiple orchestrator workers;
/// `SqliteDatabaseClient` does this by serializing through a mutex rather
/// than opening one connection per worker, since sqlite's single writer
/// would serialize those anyway.
pub trait DatabaseClient: Send + Sync {
    /// Writes daily_operations (1 row), shift_operations (2 rows), and
    /// timeslot_results (64 rows) for this run inside one transaction.
    /// Rolls back entirely on any failure.
    fn persist_run(&self, ctx: &PipelineContext) -> Result<(), PipelineError>;
}

pub struct SqliteDatabaseClient {
    conn: Mutex<Connection>,
}

impl SqliteDatabaseClient {
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        let conn = Connection::open(path)
            .map_err(|e| PipelineError::Storage { table: "<connect>".into(), detail: e.to_string() })?;
        let client = Self { conn: Mutex::new(conn) };
        client.migrate()?;
        Ok(client)
    }

    pub fn open_in_memory() -> Result<Self, PipelineError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PipelineError::Storage { table: "<connect>".into(), detail: e.to_string() })?;
        let client = Self { conn: Mutex::new(conn) };
        client.migrate()?;
        Ok(client)
    }

    fn migrate(&self) -> Result<(), PipelineError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS daily_operations (
                business_date TEXT NOT NULL,
                restaurant_code TEXT NOT NULL,
                total_sales REAL NOT NULL,
                labor_cost REAL NOT NULL,
                labor_percent REAL NOT NULL,
                labor_hours REAL NOT NULL,
                employee_count INTEGER NOT NULL,
                net_profit REAL NOT NULL,
                profit_margin REAL NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(business_date, restaurant_code)
            );
            CREATE TABLE IF NOT EXISTS shift_operations (
                business_date TEXT NOT NULL,
                restaurant_code TEXT NOT NULL,
                shift_name TEXT NOT NULL,
                sales REAL NOT NULL,
                labor_cost REAL NOT NULL,
                order_count INTEGER NOT NULL,
                category_stats TEXT NOT NULL,
                manager TEXT NOT NULL,
                voids REAL NOT NULL,
                cash_collected REAL NOT NULL,
                tips_distributed REAL NOT NULL,
                vendor_payouts REAL NOT NULL,
                net_cash REAL NOT NULL,
                UNIQUE(business_date, restaurant_code, shift_name)
            );
            CREATE TABLE IF NOT EXISTS timeslot_results (
                business_date TEXT NOT NULL,
                restaurant_code TEXT NOT NULL,
                timeslot_index INTEGER NOT NULL,
                timeslot_label TEXT NOT NULL,
                shift_name TEXT NOT NULL,
                orders INTEGER NOT NULL,
                sales REAL NOT NULL,
                labor_cost REAL NOT NULL,
                efficiency_score REAL NOT NULL,
                grade TEXT NOT NULL,
                pass_fail INTEGER NOT NULL,
                category_stats TEXT NOT NULL,
                UNIQUE(business_date, restaurant_code, timeslot_index, shift_name)
            );
            ",
        )
        .map_err(|e| PipelineError::Storage { table: "<migrate>".into(), detail: e.to_string() })?;
        Ok(())
    }
}

impl DatabaseClient for SqliteDatabaseClient {
    fn persist_run(&self, ctx: &PipelineContext) -> Result<(), PipelineError> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| PipelineError::Storage { table: "<begin>".into(), detail: e.to_string() })?;

        write_daily(&tx, ctx)?;
        write_shifts(&tx, ctx)?;
        write_timeslots(&tx, ctx)?;

        tx.commit()
            .map_err(|e| PipelineError::Storage { table: "<commit>".into(), detail: e.to_string() })?;
        Ok(())
    }
}

fn write_daily(tx: &rusqlite::Transaction, ctx: &PipelineContext) -> Result<(), PipelineError> {
    let sales = ctx.sales.unwrap_or(0.0);
    let metrics = ctx.labor_metrics.as_ref();
    let dto = ctx.labor_dto.as_ref();
    let labor_cost = dto.map(|d| d.total_labor_cost).unwrap_or(0.0);
    let labor_percent = metrics.map(|m| m.labor_percentage).unwrap_or(0.0);
    let labor_hours = dto.map(|d| d.total_hours_worked).unwrap_or(0.0);
    let employee_count = dto.map(|d| d.employee_count).unwrap_or(0);
    let cogs = ctx
        .cash_flow
        .as_ref()
        .map(|c| c.day_total().vendor_payouts)
        .unwrap_or(0.0);
    let net_profit = sales - labor_cost - cogs;
    let profit_margin = if sales != 0.0 { 100.0 * net_profit / sales } else { 0.0 };
    let now = chrono::Utc::now().to_rfc3339();

    tx.execute(
        "INSERT INTO daily_operations
            (business_date, restaurant_code, total_sales, labor_cost, labor_percent,
             labor_hours, employee_count, net_profit, profit_margin, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
         ON CONFLICT(business_date, restaurant_code) DO UPDATE SET
            total_sales = excluded.total_sales,
            labor_cost = excluded.labor_cost,
            labor_percent = excluded.labor_percent,
            labor_hours = excluded.labor_hours,
            employee_count = excluded.employee_count,
            net_profit = excluded.net_profit,
            profit_margin = excluded.profit_margin,
            updated_at = excluded.updated_at",
        params![
            ctx.date.to_string(),
            ctx.restaurant,
            sales,
            labor_cost,
            labor_percent,
            labor_hours,
            employee_count,
            net_profit,
            profit_margin,
            now,
        ],
    )
    .map_err(|e| PipelineError::Storage { table: "daily_operations".into(), detail: e.to_string() })?;
    Ok(())
}

fn write_shifts(tx: &rusqlite::Transaction, ctx: &PipelineContext) -> Result<(), PipelineError> {
    let Some(shift_metrics) = &ctx.shift_metrics else { return Ok(()) };
    let empty_totals = crate::domain::cash::DrawerTotals::default();

    for (shift, single) in [(Shift::Morning, &shift_metrics.morning), (Shift::Evening, &shift_metrics.evening)] {
        let totals = ctx
            .cash_flow
            .as_ref()
            .and_then(|cf| cf.by_shift.get(&shift))
            .copied()
            .unwrap_or(empty_totals);
        let category_stats = ctx
            .shift_category_stats
            .get(&shift)
            .map(category_stats_json)
            .unwrap_or_else(|| "{}".to_string());

        tx.execute(
            "INSERT INTO shift_operations
                (business_date, restaurant_code, shift_name, sales, labor_cost, order_count,
                 category_stats, manager, voids, cash_collected, tips_distributed, vendor_payouts, net_cash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(business_date, restaurant_code, shift_name) DO UPDATE SET
                sales = excluded.sales,
                labor_cost = excluded.labor_cost,
                order_count = excluded.order_count,
                category_stats = excluded.category_stats,
                manager = excluded.manager,
                voids = excluded.voids,
                cash_collected = excluded.cash_collected,
                tips_distributed = excluded.tips_distributed,
                vendor_payouts = excluded.vendor_payouts,
                net_cash = excluded.net_cash",
            params![
                ctx.date.to_string(),
                ctx.restaurant,
                shift.as_str(),
                single.sales,
                single.labor,
                single.order_count,
                category_stats,
                single.manager,
                single.voids,
                totals.cash_collected,
                totals.tips_distributed,
                totals.vendor_payouts,
                totals.net_cash(),
            ],
        )
        .map_err(|e| PipelineError::Storage { table: "shift_operations".into(), detail: e.to_string() })?;
    }
    Ok(())
}

fn write_timeslots(tx: &rusqlite::Transaction, ctx: &PipelineContext) -> Result<(), PipelineError> {
    let Some(shift_metrics) = &ctx.shift_metrics else { return Ok(()) };

    for slot in &ctx.timeslots {
        let (shift_sales, shift_labor, shift_orders) = match slot.shift {
            Shift::Morning => (shift_metrics.morning.sales, shift_metrics.morning.labor, shift_metrics.morning.order_count),
            Shift::Evening => (shift_metrics.evening.sales, shift_metrics.evening.labor, shift_metrics.evening.order_count),
        };
        let orders = slot.total_orders();
        // No per-timeslot sales/labor is collected upstream; allocate the
        // shift total proportionally to this window's share of that shift's
        // orders, the same interpolation the batch artifact uses elsewhere.
        let share = if shift_orders > 0 { orders as f64 / shift_orders as f64 } else { 0.0 };
        let sales = shift_sales * share;
        let labor_cost = shift_labor * share;
        let category_stats = category_stats_json(&slot.category_stats);

        tx.execute(
            "INSERT INTO timeslot_results
                (business_date, restaurant_code, timeslot_index, timeslot_label, shift_name,
                 orders, sales, labor_cost, efficiency_score, grade, pass_fail, category_stats)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(business_date, restaurant_code, timeslot_index, shift_name) DO UPDATE SET
                timeslot_label = excluded.timeslot_label,
                orders = excluded.orders,
                sales = excluded.sales,
                labor_cost = excluded.labor_cost,
                efficiency_score = excluded.efficiency_score,
                grade = excluded.grade,
                pass_fail = excluded.pass_fail,
                category_stats = excluded.category_stats",
            params![
                ctx.date.to_string(),
                ctx.restaurant,
                slot.index,
                slot.time_window,
                slot.shift.as_str(),
                orders,
                sales,
                labor_cost,
                slot.pass_rate,
                slot.grade.as_str(),
                slot.passed_standards as i32,
                category_stats,
            ],
        )
        .map_err(|e| PipelineError::Storage { table: "timeslot_results".into(), detail: e.to_string() })?;
    }
    Ok(())
}

fn category_stats_json(
    stats: &std::collections::BTreeMap<Category, crate::domain::timeslot::CategoryStats>,
) -> String {
    let map: std::collections::BTreeMap<&str, crate::domain::timeslot::CategoryStats> =
        stats.iter().map(|(c, s)| (c.as_str(), *s)).collect();
    serde_json::to_string(&map).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::domain::labor::{LaborDto, LaborMetrics};
    use crate::domain::shift::{ShiftMetrics, SingleShiftMetrics, SplitMethod};
    use chrono::NaiveDate;

    fn sample_ctx() -> PipelineContext {
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
        ctx
    }

    #[test]
    fn persists_and_upserts_without_duplicate_rows() {
        let client = SqliteDatabaseClient::open_in_memory().unwrap();
        let ctx = sample_ctx();
        client.persist_run(&ctx).unwrap();
        client.persist_run(&ctx).unwrap();

        let conn = client.conn.lock();
        let daily_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM daily_operations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(daily_count, 1);
        let shift_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM shift_operations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(shift_count, 2);
        let timeslot_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM timeslot_results", [], |r| r.get(0))
            .unwrap();
        assert_eq!(timeslot_count, 64);
    }
}
