use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// The three fulfillment channels an order can be categorized into.
///
/// Iterate in [`crate::domain::CATEGORY_ORDER`], not `Category`'s
/// declaration order, wherever output needs to be deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Lobby,
    DriveThru,
    ToGo,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Lobby => "Lobby",
            Category::DriveThru => "Drive-Thru",
            Category::ToGo => "ToGo",
        }
    }

    /// Fixed fulfillment-minute standard used for grading pass/fail.
    pub fn fulfillment_standard(&self) -> f64 {
        match self {
            Category::Lobby => 15.0,
            Category::DriveThru => 7.0,
            Category::ToGo => 10.0,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Category::Lobby => 0,
            Category::DriveThru => 1,
            Category::ToGo => 2,
        }
    }
}

// Ordered by the fixed {Lobby, Drive-Thru, ToGo} sequence, not declaration
// order, so BTreeMap iteration over categories stays deterministic and
// matches spec output ordering.
impl PartialOrd for Category {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Category {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shift {
    Morning,
    Evening,
}

/// A single fulfilled order, categorized and timed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub check_number: String,
    pub category: Category,
    pub fulfillment_minutes: f64,
    pub order_duration_minutes: f64,
    pub order_time: Option<NaiveDateTime>,
    pub server: Option<String>,
    pub shift: Shift,
    pub table: Option<String>,
    pub cash_drawer: Option<String>,
    pub employee_position: Option<String>,
}

impl OrderRecord {
    /// Builds a record, clamping negative durations to 0 as the data model
    /// requires (`fulfillment_minutes >= 0`, `order_duration_minutes >= 0`).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        check_number: String,
        category: Category,
        fulfillment_minutes: f64,
        order_duration_minutes: f64,
        order_time: Option<NaiveDateTime>,
        server: Option<String>,
        shift: Shift,
    ) -> Self {
        Self {
            check_number,
            category,
            fulfillment_minutes: fulfillment_minutes.max(0.0),
            order_duration_minutes: order_duration_minutes.max(0.0),
            order_time,
            server,
            shift,
            table: None,
            cash_drawer: None,
            employee_position: None,
        }
    }

    pub fn with_table(mut self, table: Option<String>) -> Self {
        self.table = table;
        self
    }

    pub fn with_cash_drawer(mut self, cash_drawer: Option<String>) -> Self {
        self.cash_drawer = cash_drawer;
        self
    }

    pub fn with_employee_position(mut self, position: Option<String>) -> Self {
        self.employee_position = position;
        self
    }

    /// `fulfillment_minutes == 0` is treated as an invalid measurement: the
    /// order still counts toward totals but is excluded from averages and
    /// can never count as a pass.
    pub fn has_valid_fulfillment(&self) -> bool {
        self.fulfillment_minutes > 0.0
    }
}
