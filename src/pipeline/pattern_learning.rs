//! Pattern learning stage (spec §4.7): update the daily labor pattern for
//! `(restaurant, day_of_week)` and the timeslot patterns for every window
//! that passed strict grading.

use anyhow::Result;
use chrono::Datelike;

use crate::datasource::DataSource;
use crate::patterns::PatternStores;
use crate::pipeline::PipelineContext;

pub fn run(
    ctx: &mut PipelineContext,
    _data_source: &dyn DataSource,
    patterns: &PatternStores,
) -> Result<()> {
    let day_of_week = monday_zero_index(ctx.date.weekday());
    let day_name = day_name(ctx.date.weekday());
    let now = ctx.date.and_hms_opt(0, 0, 0).expect("midnight always valid");

    let mut daily_updated = 0;
    if let Some(labor_metrics) = &ctx.labor_metrics {
        if let Some(labor_dto) = &ctx.labor_dto {
            let rates = patterns.learning_rates();
            if patterns
                .daily()
                .learn(
                    &ctx.restaurant,
                    day_of_week,
                    labor_metrics.labor_percentage,
                    labor_dto.total_hours_worked,
                    now,
                    rates,
                )
                .is_ok()
            {
                daily_updated += 1;
            }
        }
    }

    let mut timeslot_updated = 0;
    for slot in &ctx.timeslots {
        if !slot.passed_standards {
            continue;
        }
        for (category, avg) in &slot.avg_fulfillment {
            patterns
                .timeslots()
                .learn(&ctx.restaurant, &day_name, slot.shift, slot.index, *category, *avg, now);
            timeslot_updated += 1;
        }
    }

    ctx.pattern_counts.daily_patterns_updated = daily_updated;
    ctx.pattern_counts.timeslot_patterns_updated = timeslot_updated;
    Ok(())
}

fn monday_zero_index(weekday: chrono::Weekday) -> u8 {
    weekday.num_days_from_monday() as u8
}

fn day_name(weekday: chrono::Weekday) -> String {
    use chrono::Weekday::*;
    match weekday {
        Mon => "Monday",
        Tue => "Tuesday",
        Wed => "Wednesday",
        Thu => "Thursday",
        Fri => "Friday",
        Sat => "Saturday",
        Sun => "Sunday",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::datasource::FakeDataSource;
    use crate::domain::labor::LaborMetrics;
    use chrono::NaiveDate;

    #[test]
    fn learns_only_from_passing_timeslots() {
        let mut ctx = PipelineContext::new(
            "SDR".into(),
            NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(), // Monday
            AppConfig::default(),
        );
        ctx.labor_metrics = Some(LaborMetrics::compute(1000.0, 4000.0));
        ctx.labor_dto = Some(crate::domain::labor::LaborDto::new(100.0, 1000.0, 5));

        let mut passing = crate::domain::timeslot::Timeslot::empty(10);
        passing.passed_standards = true;
        passing
            .avg_fulfillment
            .insert(crate::domain::order::Category::Lobby, 9.0);
        let mut failing = crate::domain::timeslot::Timeslot::empty(11);
        failing.passed_standards = false;
        failing
            .avg_fulfillment
            .insert(crate::domain::order::Category::Lobby, 30.0);
        ctx.timeslots = vec![passing, failing];

        let source = FakeDataSource::new();
        let patterns = PatternStores::new();
        run(&mut ctx, &source, &patterns).unwrap();

        assert_eq!(ctx.pattern_counts.timeslot_patterns_updated, 1);
        assert_eq!(ctx.pattern_counts.daily_patterns_updated, 1);
    }
}
