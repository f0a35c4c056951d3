use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::order::{Category, Shift};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CategoryStats {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
}

impl CategoryStats {
    pub fn record(&mut self, passed: bool) {
        self.total += 1;
        if passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn merge(&mut self, other: &CategoryStats) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeslotGrade {
    APlus,
    A,
    BPlus,
    B,
    CPlus,
    C,
    D,
    F,
    /// Window had zero orders.
    NotApplicable,
}

impl TimeslotGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeslotGrade::APlus => "A+",
            TimeslotGrade::A => "A",
            TimeslotGrade::BPlus => "B+",
            TimeslotGrade::B => "B",
            TimeslotGrade::CPlus => "C+",
            TimeslotGrade::C => "C",
            TimeslotGrade::D => "D",
            TimeslotGrade::F => "F",
            TimeslotGrade::NotApplicable => "N/A",
        }
    }

    /// Fixed pass_rate → letter grade thresholds.
    pub fn from_pass_rate(pass_rate: f64, total_orders: u32) -> Self {
        if total_orders == 0 {
            return TimeslotGrade::NotApplicable;
        }
        if pass_rate >= 0.95 {
            TimeslotGrade::APlus
        } else if pass_rate >= 0.90 {
            TimeslotGrade::A
        } else if pass_rate >= 0.85 {
            TimeslotGrade::BPlus
        } else if pass_rate >= 0.80 {
            TimeslotGrade::B
        } else if pass_rate >= 0.70 {
            TimeslotGrade::CPlus
        } else if pass_rate >= 0.60 {
            TimeslotGrade::C
        } else if pass_rate >= 0.50 {
            TimeslotGrade::D
        } else {
            TimeslotGrade::F
        }
    }
}

/// One of the 64 fixed 15-minute windows covering 06:00-22:00.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeslot {
    pub index: u32,
    pub time_window: String,
    pub shift: Shift,
    pub category_stats: BTreeMap<Category, CategoryStats>,
    pub avg_fulfillment: BTreeMap<Category, f64>,
    pub pass_rate: f64,
    pub passed_standards: bool,
    pub grade: TimeslotGrade,
}

impl Timeslot {
    /// Window index for a minute-of-day offset from 06:00, clamped to
    /// `[0, 64)`. Callers outside 06:00-22:00 must check bounds themselves.
    pub fn index_for_minutes_since_open(minutes_since_open: i64) -> Option<u32> {
        if minutes_since_open < 0 {
            return None;
        }
        let idx = (minutes_since_open / 15) as u32;
        if idx < 64 {
            Some(idx)
        } else {
            None
        }
    }

    pub fn window_label(index: u32) -> String {
        let start_minutes = 6 * 60 + index * 15;
        let end_minutes = start_minutes + 15;
        format!(
            "{:02}:{:02}-{:02}:{:02}",
            start_minutes / 60,
            start_minutes % 60,
            end_minutes / 60,
            end_minutes % 60,
        )
    }

    pub fn shift_for_index(index: u32) -> Shift {
        if index < 32 {
            Shift::Morning
        } else {
            Shift::Evening
        }
    }

    pub fn empty(index: u32) -> Self {
        Self {
            index,
            time_window: Self::window_label(index),
            shift: Self::shift_for_index(index),
            category_stats: BTreeMap::new(),
            avg_fulfillment: BTreeMap::new(),
            pass_rate: 0.0,
            passed_standards: false,
            grade: TimeslotGrade::NotApplicable,
        }
    }

    pub fn total_orders(&self) -> u32 {
        self.category_stats.values().map(|s| s.total).sum()
    }
}
