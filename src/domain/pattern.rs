use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::order::{Category, Shift};

/// Confidence/observations gate shared by both pattern shapes: a pattern
/// is usable for grading/baselines only once it clears this bar.
pub fn is_reliable(confidence: f64, observations: u32) -> bool {
    confidence >= 0.6 && observations >= 4
}

/// Learned expectation for `(restaurant, day_of_week)`, updated by EMA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyLaborPattern {
    pub restaurant: String,
    /// Monday = 0 .. Sunday = 6.
    pub day_of_week: u8,
    pub expected_labor_percentage: f64,
    pub expected_total_hours: f64,
    pub confidence: f64,
    pub observations: u32,
    pub last_updated: NaiveDateTime,
    /// Set when this pattern is a cross-day average fallback rather than
    /// an exact-key observation; fallback values must never be learned
    /// back into the store.
    pub is_fallback: bool,
    pub days_averaged: u32,
}

impl DailyLaborPattern {
    pub fn new(restaurant: String, day_of_week: u8, now: NaiveDateTime) -> Self {
        Self {
            restaurant,
            day_of_week,
            expected_labor_percentage: 0.0,
            expected_total_hours: 0.0,
            confidence: 0.0,
            observations: 0,
            last_updated: now,
            is_fallback: false,
            days_averaged: 0,
        }
    }

    pub fn is_reliable(&self) -> bool {
        is_reliable(self.confidence, self.observations)
    }
}

/// Learned fulfillment baseline for a `(restaurant, day, shift, window,
/// category)` cell, updated by EMA only from passing timeslots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeslotPattern {
    pub restaurant: String,
    pub day_of_week: String,
    pub shift: Shift,
    pub window: u32,
    pub category: Category,
    pub baseline_time: f64,
    pub variance: f64,
    pub confidence: f64,
    pub observations: u32,
    pub last_updated: NaiveDateTime,
}

impl TimeslotPattern {
    pub fn new(
        restaurant: String,
        day_of_week: String,
        shift: Shift,
        window: u32,
        category: Category,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            restaurant,
            day_of_week,
            shift,
            window,
            category,
            baseline_time: 0.0,
            variance: 0.0,
            confidence: 0.0,
            observations: 0,
            last_updated: now,
        }
    }

    pub fn is_reliable(&self) -> bool {
        is_reliable(self.confidence, self.observations)
    }

    /// Historical target used for grading when reliable:
    /// `baseline_time + variance`.
    pub fn historical_target(&self) -> f64 {
        self.baseline_time + self.variance
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct PatternLearningCounts {
    pub daily_patterns_updated: u32,
    pub timeslot_patterns_updated: u32,
}
