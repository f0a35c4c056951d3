//! Cash flow extractor (spec §4.6): fold the cash-management transaction
//! table into per-shift, per-drawer totals and a vendor payout list.

use anyhow::Result;
use chrono::{NaiveDateTime, Timelike};

use crate::datasource::DataSource;
use crate::domain::cash::{CashFlow, DrawerTotals, VendorPayout};
use crate::domain::order::Shift;
use crate::patterns::PatternStores;
use crate::pipeline::{PipelineContext, RawTable};

pub fn run(
    ctx: &mut PipelineContext,
    _data_source: &dyn DataSource,
    _patterns: &PatternStores,
) -> Result<()> {
    let mut cash_flow = CashFlow::empty();

    for logical_name in ["cash_mgmt", "cash_activity"] {
        let Some(table) = ctx.raw_tables.get(logical_name) else { continue };
        extract_table(table, &mut cash_flow);
    }

    ctx.cash_flow = Some(cash_flow);
    Ok(())
}

fn extract_table(table: &RawTable, cash_flow: &mut CashFlow) {
    let action_col = table
        .column_index("Action")
        .or_else(|| table.column_index("Action Type"));
    let Some(action_col) = action_col else { return };

    for row in &table.rows {
        let Some(action) = row.get(action_col).map(|s| s.trim().to_uppercase()) else { continue };
        let Some(amount) = table.get(row, "Amount").and_then(parse_amount) else { continue };
        let created = table.get(row, "Created Date").and_then(parse_timestamp);
        let shift = created
            .map(|t| Shift::from_hour(t.time().hour(), 14))
            .unwrap_or(Shift::Morning);
        let drawer = table.get(row, "Cash Drawer").unwrap_or("unknown").to_string();

        let drawer_totals = cash_flow.by_drawer.entry(drawer.clone()).or_default();
        let shift_totals = cash_flow.by_shift.entry(shift).or_default();

        match action.as_str() {
            "CASH_PAYMENT" | "CASH_COLLECTED" => {
                let magnitude = amount.abs();
                apply(drawer_totals, shift_totals, |t| t.cash_collected += magnitude);
            }
            "TIP_OUT" => {
                let magnitude = amount.abs();
                apply(drawer_totals, shift_totals, |t| t.tips_distributed += magnitude);
            }
            "PAY_OUT" => {
                let magnitude = amount.abs();
                apply(drawer_totals, shift_totals, |t| t.vendor_payouts += magnitude);

                let reason = table.get(row, "Payout Reason").unwrap_or("").to_string();
                let manager = table.get(row, "Employee").map(|s| s.to_string());
                if let Some(time) = created {
                    if let Some(payout) = VendorPayout::new(
                        magnitude,
                        reason,
                        manager,
                        Some(drawer),
                        shift,
                        time,
                    ) {
                        cash_flow.payouts.push(payout);
                    }
                }
            }
            _ => {}
        }
    }
}

fn apply(
    drawer_totals: &mut DrawerTotals,
    shift_totals: &mut DrawerTotals,
    mut f: impl FnMut(&mut DrawerTotals),
) {
    f(drawer_totals);
    f(shift_totals);
}

fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned = raw.replace(['$', ','], "");
    cleaned.trim().parse().ok()
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M", "%m/%d/%Y %I:%M %p"];
    for format in FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw.trim(), format) {
            return Some(parsed);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::datasource::FakeDataSource;
    use crate::patterns::PatternStores;
    use chrono::NaiveDate;

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
    fn shift_rollup_scenario() {
        let mut ctx = PipelineContext::new(
            "SDR".into(),
            NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            AppConfig::default(),
        );
        ctx.raw_tables.insert(
            "cash_mgmt".into(),
            parse(
                "Action,Amount,Payout Reason,Employee,Created Date,Cash Drawer\n\
                 CASH_PAYMENT,500,,Alice,2026-01-05 10:00:00,D1\n\
                 TIP_OUT,-50,,Alice,2026-01-05 10:30:00,D1\n\
                 PAY_OUT,-120,Sysco delivery,Alice,2026-01-05 11:00:00,D1\n\
                 CASH_PAYMENT,400,,Bob,2026-01-05 16:00:00,D2\n\
                 TIP_OUT,-40,,Bob,2026-01-05 16:30:00,D2\n\
                 PAY_OUT,-60,Labatt beer delivery,Bob,2026-01-05 17:00:00,D2\n",
            ),
        );
        let source = FakeDataSource::new();
        let patterns = PatternStores::new();
        run(&mut ctx, &source, &patterns).unwrap();
        let cash_flow = ctx.cash_flow.unwrap();

        let morning = cash_flow.by_shift[&Shift::Morning];
        assert_eq!(morning.cash_collected, 500.0);
        assert_eq!(morning.tips_distributed, 50.0);
        assert_eq!(morning.vendor_payouts, 120.0);
        assert_eq!(morning.net_cash(), 330.0);

        let evening = cash_flow.by_shift[&Shift::Evening];
        assert_eq!(evening.net_cash(), 300.0);

        let total = cash_flow.day_total();
        assert_eq!(total.cash_collected, 900.0);
        assert_eq!(total.tips_distributed, 90.0);
        assert_eq!(total.vendor_payouts, 180.0);
        assert_eq!(total.net_cash(), 630.0);

        assert_eq!(cash_flow.payouts.len(), 2);
        assert_eq!(cash_flow.payouts[0].vendor_name, "Sysco Food Services");
        assert_eq!(cash_flow.payouts[1].vendor_name, "Labatt (Beverage)");
    }
}
