use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A labor time entry parsed from the `labor` CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEntry {
    pub employee_name: String,
    pub job_title: String,
    pub clock_in: NaiveDateTime,
    pub clock_out: NaiveDateTime,
    pub total_hours: f64,
    pub payable_hours: f64,
    pub auto_clockout: bool,
}

impl TimeEntry {
    /// Returns `None` if `clock_in > clock_out`, which the data model
    /// forbids.
    pub fn new(
        employee_name: String,
        job_title: String,
        clock_in: NaiveDateTime,
        clock_out: NaiveDateTime,
        total_hours: f64,
        payable_hours: f64,
        auto_clockout: bool,
    ) -> Option<Self> {
        if clock_in > clock_out {
            return None;
        }
        Some(Self {
            employee_name,
            job_title,
            clock_in,
            clock_out,
            total_hours: total_hours.max(0.0),
            payable_hours: payable_hours.max(0.0),
            auto_clockout,
        })
    }

    /// Manager status derived from job title, never stored independently.
    pub fn is_manager(&self) -> bool {
        self.job_title.to_lowercase().contains("manager")
    }

    /// True for the system/cashier entries auto-clockout analysis must
    /// exclude even when `auto_clockout` is set.
    pub fn is_system_or_cashier(&self) -> bool {
        let title = self.job_title.to_lowercase();
        title.contains("system") || title.contains("cashier")
    }

    pub fn overlaps(&self, window_start: NaiveDateTime, window_end: NaiveDateTime) -> bool {
        self.clock_in < window_end && self.clock_out > window_start
    }
}
