//! Order categorization stage (spec §4.3): fuse up to four signals per
//! check number and assign each order to {Lobby, Drive-Thru, ToGo} via a
//! first-match-wins filter cascade.

use anyhow::{anyhow, Result};
use chrono::NaiveDateTime;
use std::collections::HashMap;

use crate::datasource::DataSource;
use crate::domain::order::{Category, OrderRecord, Shift};
use crate::domain::time_entry::TimeEntry;
use crate::duration::parse_duration_minutes;
use crate::error::PipelineError;
use crate::patterns::PatternStores;
use crate::pipeline::{PipelineContext, RawTable};

pub fn run(
    ctx: &mut PipelineContext,
    _data_source: &dyn DataSource,
    _patterns: &PatternStores,
) -> Result<()> {
    let kitchen = ctx
        .raw_tables
        .get("kitchen")
        .ok_or_else(|| anyhow!(PipelineError::Categorization("kitchen table missing".to_string())))?
        .clone();
    let orders = ctx.raw_tables.get("orders").cloned().unwrap_or_default();
    let eod = ctx.raw_tables.get("eod").cloned();
    let cutoff_hour = ctx.config.shifts.cutoff_hour;

    let position_by_server = server_position_index(&ctx.time_entries);

    let mut categorized = Vec::new();
    let mut categories = HashMap::new();
    let mut rule_hits: HashMap<&'static str, u32> = HashMap::new();

    for row in &kitchen.rows {
        let check_number = match kitchen.get(row, "Check#").or_else(|| kitchen.get(row, "Check #")) {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => continue,
        };

        let signals = match build_signals(
            &check_number,
            &kitchen,
            row,
            &orders,
            eod.as_ref(),
            &position_by_server,
        ) {
            Some(signals) => signals,
            None => continue,
        };

        let (category, rule) = categorize(&signals);
        *rule_hits.entry(rule).or_insert(0) += 1;

        let order_time = signals.order_time;
        let shift = order_time
            .map(|t| Shift::from_hour(t.time().hour(), cutoff_hour))
            .unwrap_or(Shift::Morning);

        let record = OrderRecord::new(
            check_number.clone(),
            category,
            signals.kitchen_duration.unwrap_or(0.0),
            signals.order_duration.unwrap_or(0.0),
            order_time,
            signals.server_name.clone(),
            shift,
        )
        .with_table(signals.table_label.clone())
        .with_cash_drawer(signals.cash_drawer.clone())
        .with_employee_position(signals.employee_position.clone());

        categories.insert(check_number, category);
        categorized.push(record);
    }

    let total = categorized.len() as f64;
    let mut service_mix = HashMap::new();
    if total > 0.0 {
        for category in crate::domain::CATEGORY_ORDER {
            let count = categorized.iter().filter(|o| o.category == category).count() as f64;
            service_mix.insert(category, 100.0 * count / total);
        }
    }

    ctx.metadata
        .insert("categorization.rule_hits".to_string(), format!("{rule_hits:?}"));
    ctx.categorized_orders = categorized;
    ctx.order_categories = categories;
    ctx.service_mix = service_mix;
    Ok(())
}

use chrono::Timelike;

struct OrderSignals {
    table_count: u8,
    table_label: Option<String>,
    cash_drawer: Option<String>,
    employee_position: Option<String>,
    kitchen_duration: Option<f64>,
    order_duration: Option<f64>,
    server_name: Option<String>,
    order_time: Option<NaiveDateTime>,
}

fn build_signals(
    check_number: &str,
    kitchen: &RawTable,
    kitchen_row: &[String],
    orders: &RawTable,
    eod: Option<&RawTable>,
    position_by_server: &HashMap<String, String>,
) -> Option<OrderSignals> {
    let kitchen_table = table_present(kitchen.get(kitchen_row, "Table"));
    let kitchen_duration = kitchen
        .get(kitchen_row, "Fulfillment")
        .map(parse_duration_minutes);
    let server_name = kitchen
        .get(kitchen_row, "Server")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let order_row = find_order_row(orders, check_number);
    let order_table = order_row.and_then(|row| table_present(orders.get(row, "Table")));
    let order_duration = order_row
        .and_then(|row| orders.get(row, "Duration"))
        .map(parse_duration_minutes);
    let order_time = order_row
        .and_then(|row| orders.get(row, "Opened"))
        .and_then(parse_any_timestamp);

    let eod_row = eod.and_then(|table| find_order_row(table, check_number));
    let eod_table = eod_row
        .zip(eod)
        .and_then(|(row, table)| table_present(table.get(row, "Table")));
    let cash_drawer = eod_row
        .zip(eod)
        .and_then(|(row, table)| table.get(row, "Cash Drawer"))
        .map(|s| s.trim().to_lowercase());

    let table_count = [kitchen_table, order_table, eod_table]
        .into_iter()
        .filter(|present| *present)
        .count() as u8;
    let table_label = if kitchen_table {
        kitchen.get(kitchen_row, "Table").map(|s| s.to_string())
    } else {
        None
    };

    let employee_position = server_name
        .as_ref()
        .and_then(|name| position_by_server.get(name))
        .cloned();

    Some(OrderSignals {
        table_count,
        table_label,
        cash_drawer,
        employee_position,
        kitchen_duration,
        order_duration,
        server_name,
        order_time,
    })
}

fn table_present(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(v) => {
            let trimmed = v.trim();
            !trimmed.is_empty() && trimmed != "0" && !trimmed.eq_ignore_ascii_case("null")
        }
    }
}

fn find_order_row<'a>(table: &'a RawTable, check_number: &str) -> Option<&'a Vec<String>> {
    let column = table
        .column_index("Order #")
        .or_else(|| table.column_index("Check#"))?;
    table.rows.iter().find(|row| row.get(column).map(|s| s.trim()) == Some(check_number))
}

fn parse_any_timestamp(raw: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M", "%m/%d/%Y %I:%M %p"];
    for format in FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw.trim(), format) {
            return Some(parsed);
        }
    }
    None
}

fn server_position_index(time_entries: &[TimeEntry]) -> HashMap<String, String> {
    time_entries
        .iter()
        .map(|entry| (entry.employee_name.clone(), entry.job_title.to_lowercase()))
        .collect()
}

/// First-match-wins filter cascade. Returns the category plus a tag
/// identifying which rule fired, for diagnostics.
fn categorize(signals: &OrderSignals) -> (Category, &'static str) {
    let employee_position = signals.employee_position.as_deref().unwrap_or("");
    let cash_drawer = signals.cash_drawer.as_deref().unwrap_or("");
    let kitchen_duration = signals.kitchen_duration.unwrap_or(0.0);
    let order_duration = signals.order_duration.unwrap_or(0.0);

    if signals.table_count >= 2 {
        return (Category::Lobby, "lobby.table_count_2plus");
    }
    if signals.table_count >= 1 && employee_position.contains("server") {
        return (Category::Lobby, "lobby.table_and_server");
    }
    if signals.table_count >= 1 && (kitchen_duration > 15.0 || order_duration > 20.0) {
        return (Category::Lobby, "lobby.table_and_slow");
    }

    if cash_drawer.contains("drive box") || cash_drawer.contains("drive") {
        return (Category::DriveThru, "drivethru.cash_drawer");
    }
    if employee_position.contains("drive") {
        return (Category::DriveThru, "drivethru.employee_position");
    }
    if signals.table_count == 0 && kitchen_duration > 0.0 && kitchen_duration < 7.0 {
        return (Category::DriveThru, "drivethru.kitchen_duration");
    }
    if signals.table_count == 0 && order_duration > 0.0 && order_duration < 10.0 {
        return (Category::DriveThru, "drivethru.order_duration");
    }

    (Category::ToGo, "togo.default")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::datasource::FakeDataSource;
    use crate::patterns::PatternStores;
    use chrono::NaiveDate;

    fn ctx_with(kitchen: &str, orders: &str, eod: Option<&str>) -> PipelineContext {
        let mut ctx = PipelineContext::new(
            "SDR".into(),
            NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            AppConfig::default(),
        );
        ctx.raw_tables.insert("kitchen".into(), parse(kitchen));
        ctx.raw_tables.insert("orders".into(), parse(orders));
        if let Some(eod) = eod {
            ctx.raw_tables.insert("eod".into(), parse(eod));
        }
        ctx
    }

    fn parse(csv_text: &str) -> RawTable {
        let mut reader = csv::ReaderBuilder::new().from_reader(csv_text.as_bytes());
        let header: Vec<String> = reader.headers().unwrap().iter().map(|s| s.to_string()).collect();
        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(|s| s.to_string()).collect())
            .collect();
        RawTable { header, rows }
    }

    #[test]
    fn drive_thru_by_cash_drawer() {
        let mut ctx = ctx_with(
            "Check#,Table,Fulfillment,Server\n5,,3 minutes and 12 seconds,Bob\n",
            "Order #,Opened,Duration,Table\n5,2026-01-05 11:00:00,6 minutes and 23 seconds,\n",
            Some("Order #,Cash Drawer,Table\n5,DRIVE THRU 1,\n"),
        );
        let source = FakeDataSource::new();
        let patterns = PatternStores::new();
        run(&mut ctx, &source, &patterns).unwrap();
        assert_eq!(ctx.categorized_orders.len(), 1);
        assert_eq!(ctx.categorized_orders[0].category, Category::DriveThru);
        assert!((ctx.categorized_orders[0].fulfillment_minutes - 3.2).abs() < 1e-6);
    }

    #[test]
    fn lobby_by_two_of_three_tables() {
        let mut ctx = ctx_with(
            "Check#,Table,Fulfillment,Server\n7,23,18.75,Carol\n",
            "Order #,Opened,Duration,Table\n7,2026-01-05 12:00:00,25.17,23\n",
            Some("Order #,Cash Drawer,Table\n7,,23\n"),
        );
        let source = FakeDataSource::new();
        let patterns = PatternStores::new();
        run(&mut ctx, &source, &patterns).unwrap();
        assert_eq!(ctx.categorized_orders[0].category, Category::Lobby);
    }

    #[test]
    fn togo_default() {
        let mut ctx = ctx_with(
            "Check#,Table,Fulfillment,Server\n9,,12.5,Dan\n",
            "Order #,Opened,Duration,Table\n9,2026-01-05 13:00:00,15.33,\n",
            Some("Order #,Cash Drawer,Table\n9,,\n"),
        );
        let source = FakeDataSource::new();
        let patterns = PatternStores::new();
        run(&mut ctx, &source, &patterns).unwrap();
        assert_eq!(ctx.categorized_orders[0].category, Category::ToGo);
    }

    #[test]
    fn drive_thru_boundary_at_seven_minutes_does_not_fire() {
        // kitchen_duration == 7.0 is not `< 7`, so the drive-thru kitchen
        // duration rule must not fire; falls through to ToGo default.
        let mut ctx = ctx_with(
            "Check#,Table,Fulfillment,Server\n11,,7.0,Erin\n",
            "Order #,Opened,Duration,Table\n11,2026-01-05 13:00:00,,\n",
            None,
        );
        let source = FakeDataSource::new();
        let patterns = PatternStores::new();
        run(&mut ctx, &source, &patterns).unwrap();
        assert_eq!(ctx.categorized_orders[0].category, Category::ToGo);
    }
}
