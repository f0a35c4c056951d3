use serde::{Deserialize, Serialize};

pub use crate::domain::order::Shift;

impl Shift {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shift::Morning => "Morning",
            Shift::Evening => "Evening",
        }
    }

    pub fn lowercase(&self) -> &'static str {
        match self {
            Shift::Morning => "morning",
            Shift::Evening => "evening",
        }
    }

    /// Which side of `cutoff_hour` an hour-of-day falls on.
    pub fn from_hour(hour: u32, cutoff_hour: u32) -> Self {
        if hour < cutoff_hour {
            Shift::Morning
        } else {
            Shift::Evening
        }
    }
}

/// How the day's orders/sales/labor were split between shifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMethod {
    /// Split by observed order timestamps (kitchen fire time or order open
    /// time), binned by `shifts.cutoff_hour`.
    Timestamp,
    /// No usable timestamps: fixed 0.35 / 0.65 ratio fallback.
    FixedRatio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleShiftMetrics {
    pub sales: f64,
    pub labor: f64,
    pub manager: String,
    pub voids: f64,
    pub order_count: u64,
}

/// Per-day metrics split across the two shifts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftMetrics {
    pub morning: SingleShiftMetrics,
    pub evening: SingleShiftMetrics,
    pub split_method: SplitMethod,
}
