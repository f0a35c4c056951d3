use serde::{Deserialize, Serialize};

/// Labor figures extracted during ingestion, before grading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LaborDto {
    pub total_hours_worked: f64,
    pub total_labor_cost: f64,
    pub employee_count: u32,
    pub regular_hours: Option<f64>,
    pub overtime_hours: Option<f64>,
}

impl LaborDto {
    pub fn new(total_hours_worked: f64, total_labor_cost: f64, employee_count: u32) -> Self {
        Self {
            total_hours_worked: total_hours_worked.max(0.0),
            total_labor_cost: total_labor_cost.max(0.0),
            employee_count,
            regular_hours: None,
            overtime_hours: None,
        }
    }

    pub fn with_split(mut self, regular_hours: f64, overtime_hours: f64) -> Self {
        self.regular_hours = Some(regular_hours);
        self.overtime_hours = Some(overtime_hours);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LaborStatus {
    Excellent,
    Good,
    Warning,
    Critical,
    Severe,
}

impl LaborStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaborStatus::Excellent => "EXCELLENT",
            LaborStatus::Good => "GOOD",
            LaborStatus::Warning => "WARNING",
            LaborStatus::Critical => "CRITICAL",
            LaborStatus::Severe => "SEVERE",
        }
    }

    /// Fixed thresholds from the labor percentage status table.
    pub fn from_percentage(pct: f64) -> Self {
        if pct <= 20.0 {
            LaborStatus::Excellent
        } else if pct <= 25.0 {
            LaborStatus::Good
        } else if pct <= 30.0 {
            LaborStatus::Warning
        } else if pct <= 35.0 {
            LaborStatus::Critical
        } else {
            LaborStatus::Severe
        }
    }

    /// Fixed string templates for status-derived warnings/recommendations.
    pub fn warnings(&self) -> Vec<String> {
        match self {
            LaborStatus::Excellent | LaborStatus::Good => vec![],
            LaborStatus::Warning => vec!["Labor cost trending above target range".to_string()],
            LaborStatus::Critical => vec!["Labor cost significantly above target range".to_string()],
            LaborStatus::Severe => vec!["Labor cost is critically high".to_string()],
        }
    }

    pub fn recommendations(&self) -> Vec<String> {
        match self {
            LaborStatus::Excellent => vec!["Maintain current staffing levels".to_string()],
            LaborStatus::Good => vec!["Continue monitoring labor efficiency".to_string()],
            LaborStatus::Warning => {
                vec!["Review shift schedules for overstaffing".to_string()]
            }
            LaborStatus::Critical => vec![
                "Reduce scheduled hours for upcoming shifts".to_string(),
                "Review overtime authorizations".to_string(),
            ],
            LaborStatus::Severe => vec![
                "Immediate schedule review required".to_string(),
                "Escalate to district manager".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaborGrade {
    APlus,
    A,
    BPlus,
    B,
    CPlus,
    C,
    DPlus,
    D,
    F,
}

impl LaborGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaborGrade::APlus => "A+",
            LaborGrade::A => "A",
            LaborGrade::BPlus => "B+",
            LaborGrade::B => "B",
            LaborGrade::CPlus => "C+",
            LaborGrade::C => "C",
            LaborGrade::DPlus => "D+",
            LaborGrade::D => "D",
            LaborGrade::F => "F",
        }
    }

    /// Fixed grade boundaries on labor percentage.
    pub fn from_percentage(pct: f64) -> Self {
        if pct <= 18.0 {
            LaborGrade::APlus
        } else if pct <= 20.0 {
            LaborGrade::A
        } else if pct <= 23.0 {
            LaborGrade::BPlus
        } else if pct <= 25.0 {
            LaborGrade::B
        } else if pct <= 28.0 {
            LaborGrade::CPlus
        } else if pct <= 30.0 {
            LaborGrade::C
        } else if pct <= 33.0 {
            LaborGrade::DPlus
        } else if pct <= 35.0 {
            LaborGrade::D
        } else {
            LaborGrade::F
        }
    }
}

/// Graded labor efficiency for a single `(restaurant, date)` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaborMetrics {
    pub labor_percentage: f64,
    pub status: LaborStatus,
    pub grade: LaborGrade,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

impl LaborMetrics {
    /// `sales == 0` yields `labor_percentage == 0` (never NaN), which per
    /// the boundary thresholds grades as F/SEVERE.
    pub fn compute(total_labor_cost: f64, sales: f64) -> Self {
        let labor_percentage = if sales == 0.0 {
            0.0
        } else {
            100.0 * total_labor_cost / sales
        };
        // sales == 0 is a data-quality boundary case, not a genuine
        // EXCELLENT day: pin status/grade to the worst bucket per spec.
        let (status, grade) = if sales == 0.0 {
            (LaborStatus::Severe, LaborGrade::F)
        } else {
            (
                LaborStatus::from_percentage(labor_percentage),
                LaborGrade::from_percentage(labor_percentage),
            )
        };
        Self {
            labor_percentage,
            warnings: status.warnings(),
            recommendations: status.recommendations(),
            status,
            grade,
        }
    }
}
