//! Ingestion stage (spec §4.2): locate + load CSVs, validate at two
//! levels, extract `sales` / `total_payroll_cost`, build `TimeEntry`
//! records, record quality metrics.

use anyhow::{anyhow, Context as _, Result};
use chrono::NaiveDateTime;
use std::collections::HashMap;

use crate::datasource::DataSource;
use crate::domain::time_entry::TimeEntry;
use crate::error::PipelineError;
use crate::patterns::PatternStores;
use crate::pipeline::{PipelineContext, QualityMetrics, RawTable};

const REQUIRED_FILES: &[&str] = &["labor", "sales", "orders"];
const OPTIONAL_FILES: &[&str] = &["kitchen", "eod", "payroll", "cash_activity", "cash_mgmt"];

const LABOR_REQUIRED_COLUMNS: &[&str] =
    &["Employee", "Job Title", "In Date", "Out Date", "Total Hours", "Payable Hours"];
const SALES_REQUIRED_COLUMNS: &[&str] = &["Net sales"];
const ORDERS_REQUIRED_COLUMNS: &[&str] = &["Order #", "Opened", "Server", "Amount"];

pub fn run(
    ctx: &mut PipelineContext,
    data_source: &dyn DataSource,
    _patterns: &PatternStores,
) -> Result<()> {
    for name in REQUIRED_FILES.iter().chain(OPTIONAL_FILES.iter()) {
        if let Some(raw) = data_source
            .read_csv(name, ctx.date)
            .with_context(|| format!("reading {name} csv"))?
        {
            let table = parse_csv(&raw.bytes)
                .map_err(|e| anyhow!(PipelineError::Validation(format!("{name}: {e}"))))?;
            ctx.raw_tables.insert((*name).to_string(), table);
        }
    }

    for required in REQUIRED_FILES {
        let table = ctx.raw_tables.get(*required).ok_or_else(|| {
            anyhow!(PipelineError::MissingFile((*required).to_string()))
        })?;
        if table.rows.is_empty() {
            return Err(anyhow!(PipelineError::Validation(format!(
                "{required}: file is empty"
            ))));
        }
    }

    validate_columns("labor", &ctx.raw_tables, LABOR_REQUIRED_COLUMNS)?;
    validate_columns("sales", &ctx.raw_tables, SALES_REQUIRED_COLUMNS)?;
    validate_columns("orders", &ctx.raw_tables, ORDERS_REQUIRED_COLUMNS)?;

    ctx.sales = Some(extract_sales(&ctx.raw_tables)?);
    ctx.total_payroll_cost = extract_payroll_cost(&ctx.raw_tables);
    ctx.time_entries = build_time_entries(&ctx.raw_tables)?;
    ctx.quality = compute_quality(&ctx.raw_tables, &ctx.time_entries);

    Ok(())
}

fn validate_columns(
    name: &str,
    tables: &HashMap<String, RawTable>,
    required_columns: &[&str],
) -> Result<()> {
    let table = tables
        .get(name)
        .ok_or_else(|| anyhow!(PipelineError::MissingFile(name.to_string())))?;
    for column in required_columns {
        if table.column_index(column).is_none() {
            return Err(anyhow!(PipelineError::Validation(format!(
                "{name}: missing required column '{column}'"
            ))));
        }
    }
    Ok(())
}

fn parse_csv(bytes: &[u8]) -> Result<RawTable, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(bytes);
    let header: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }
    Ok(RawTable { header, rows })
}

/// Sums the "Net sales" column, treating empty numeric fields as 0.
fn extract_sales(tables: &HashMap<String, RawTable>) -> Result<f64> {
    let table = tables
        .get("sales")
        .ok_or_else(|| anyhow!(PipelineError::MissingFile("sales".to_string())))?;
    let idx = table
        .column_index("Net sales")
        .ok_or_else(|| anyhow!(PipelineError::Validation("sales: missing 'Net sales'".to_string())))?;
    let mut total = 0.0;
    for row in &table.rows {
        let Some(raw) = row.get(idx) else { continue };
        if raw.trim().is_empty() {
            continue;
        }
        let cleaned = raw.replace(['$', ','], "");
        let value: f64 = cleaned
            .trim()
            .parse()
            .map_err(|_| anyhow!(PipelineError::Validation(format!("sales: unparseable value '{raw}'"))))?;
        total += value;
    }
    Ok(total)
}

fn extract_payroll_cost(tables: &HashMap<String, RawTable>) -> Option<f64> {
    let table = tables.get("payroll")?;
    let idx = table.column_index("Total Pay")?;
    let mut total = 0.0;
    for row in &table.rows {
        let Some(raw) = row.get(idx) else { continue };
        if raw.trim().is_empty() {
            continue;
        }
        let cleaned = raw.replace(['$', ','], "");
        if let Ok(value) = cleaned.trim().parse::<f64>() {
            total += value;
        }
    }
    Some(total)
}

fn build_time_entries(tables: &HashMap<String, RawTable>) -> Result<Vec<TimeEntry>> {
    let table = tables
        .get("labor")
        .ok_or_else(|| anyhow!(PipelineError::MissingFile("labor".to_string())))?;
    let mut entries = Vec::new();
    for row in &table.rows {
        let employee = table.get(row, "Employee").unwrap_or("").to_string();
        let job_title = table.get(row, "Job Title").unwrap_or("").to_string();
        let clock_in = table.get(row, "In Date").and_then(parse_timestamp);
        let clock_out = table.get(row, "Out Date").and_then(parse_timestamp);
        let total_hours: f64 = table
            .get(row, "Total Hours")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0.0);
        let payable_hours: f64 = table
            .get(row, "Payable Hours")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0.0);
        let auto_clockout = table
            .get(row, "Auto Clockout")
            .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        if let (Some(clock_in), Some(clock_out)) = (clock_in, clock_out) {
            if let Some(entry) = TimeEntry::new(
                employee,
                job_title,
                clock_in,
                clock_out,
                total_hours,
                payable_hours,
                auto_clockout,
            ) {
                entries.push(entry);
            }
        }
    }
    Ok(entries)
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

fn compute_quality(tables: &HashMap<String, RawTable>, time_entries: &[TimeEntry]) -> QualityMetrics {
    let mut row_counts = HashMap::new();
    let mut non_null_rates = HashMap::new();
    let mut warnings = Vec::new();

    for (name, columns) in [
        ("labor", LABOR_REQUIRED_COLUMNS),
        ("sales", SALES_REQUIRED_COLUMNS),
        ("orders", ORDERS_REQUIRED_COLUMNS),
    ] {
        let Some(table) = tables.get(name) else { continue };
        row_counts.insert(name.to_string(), table.rows.len());
        for column in columns {
            let Some(idx) = table.column_index(column) else { continue };
            let non_null = table
                .rows
                .iter()
                .filter(|row| row.get(idx).map(|s| !s.trim().is_empty()).unwrap_or(false))
                .count();
            let rate = if table.rows.is_empty() {
                1.0
            } else {
                non_null as f64 / table.rows.len() as f64
            };
            non_null_rates.insert(format!("{name}.{column}"), rate);
            if rate < 0.9 {
                warnings.push(format!("{name}.{column} non-null rate {:.2} below threshold", rate));
            }
        }
    }

    let timestamp_parse_rate = tables.get("labor").map(|table| {
        if table.rows.is_empty() {
            1.0
        } else {
            time_entries.len() as f64 / table.rows.len() as f64
        }
    });
    if let Some(rate) = timestamp_parse_rate {
        if rate < 0.9 {
            warnings.push(format!("labor timestamp parse rate {:.2} below threshold", rate));
        }
    }

    let mut candidate_scores: Vec<f64> = non_null_rates.values().copied().collect();
    if let Some(rate) = timestamp_parse_rate {
        candidate_scores.push(rate);
    }
    let overall_score = candidate_scores
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min)
        .min(1.0);
    let overall_score = if overall_score.is_finite() { overall_score } else { 1.0 };

    QualityMetrics {
        row_counts,
        non_null_rates,
        timestamp_parse_rate,
        overall_score,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::datasource::FakeDataSource;
    use crate::patterns::PatternStores;
    use chrono::NaiveDate;

    fn sample_source() -> FakeDataSource {
        FakeDataSource::new()
            .with_file(
                "labor",
                "Employee,Job Title,In Date,Out Date,Total Hours,Payable Hours\n\
                 Alice,Manager,2026-01-05 06:00:00,2026-01-05 14:00:00,8,8\n",
            )
            .with_file("sales", "Net sales\n1000.50\n500\n")
            .with_file(
                "orders",
                "Order #,Opened,Server,Amount\n1,2026-01-05 11:00:00,Alice,10.0\n",
            )
    }

    #[test]
    fn missing_required_file_is_fatal() {
        let source = FakeDataSource::new();
        let mut ctx = PipelineContext::new(
            "SDR".into(),
            NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            AppConfig::default(),
        );
        let patterns = PatternStores::new();
        let err = run(&mut ctx, &source, &patterns).unwrap_err();
        assert!(err.downcast_ref::<PipelineError>().is_some());
    }

    #[test]
    fn sales_scalar_sums_rows() {
        let source = sample_source();
        let mut ctx = PipelineContext::new(
            "SDR".into(),
            NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            AppConfig::default(),
        );
        let patterns = PatternStores::new();
        run(&mut ctx, &source, &patterns).unwrap();
        assert_eq!(ctx.sales, Some(1500.50));
        assert_eq!(ctx.time_entries.len(), 1);
    }
}
