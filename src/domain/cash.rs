use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::order::Shift;

/// A single cash payout, stored as a positive magnitude even though the
/// source CSV records it as a negative amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorPayout {
    pub amount: f64,
    pub reason: String,
    pub vendor_name: String,
    pub manager: Option<String>,
    pub drawer: Option<String>,
    pub shift: Shift,
    pub time: NaiveDateTime,
}

impl VendorPayout {
    /// `amount` must be the already-positive magnitude; callers negate the
    /// raw CSV value before constructing.
    pub fn new(
        amount: f64,
        reason: String,
        manager: Option<String>,
        drawer: Option<String>,
        shift: Shift,
        time: NaiveDateTime,
    ) -> Option<Self> {
        if amount <= 0.0 {
            return None;
        }
        let vendor_name = derive_vendor_name(&reason);
        Some(Self {
            amount,
            reason,
            vendor_name,
            manager,
            drawer,
            shift,
            time,
        })
    }
}

/// Case-insensitive keyword match against a fixed priority list.
pub fn derive_vendor_name(reason: &str) -> String {
    let lower = reason.to_lowercase();
    const RULES: &[(&[&str], &str)] = &[
        (&["sysco"], "Sysco Food Services"),
        (&["us foods", "usf", "us food"], "US Foods"),
        (&["labatt", "beer", "beverage", "drink"], "Labatt (Beverage)"),
        (&["depot", "restaurant depot"], "Restaurant Depot"),
        (
            &["produce", "fresh", "vegetable", "fruit"],
            "Produce Supplier",
        ),
    ];
    for (keywords, vendor) in RULES {
        if keywords.iter().any(|k| lower.contains(k)) {
            return vendor.to_string();
        }
    }
    match reason.split_whitespace().next() {
        Some(word) => title_case(word),
        None => "Other Vendor".to_string(),
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DrawerTotals {
    pub cash_collected: f64,
    pub tips_distributed: f64,
    pub vendor_payouts: f64,
}

impl DrawerTotals {
    pub fn net_cash(&self) -> f64 {
        self.cash_collected - self.tips_distributed - self.vendor_payouts
    }
}

/// Per-shift cash reconciliation, rolling up per-drawer totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlow {
    pub by_drawer: HashMap<String, DrawerTotals>,
    pub by_shift: HashMap<Shift, DrawerTotals>,
    pub payouts: Vec<VendorPayout>,
}

impl CashFlow {
    pub fn empty() -> Self {
        Self {
            by_drawer: HashMap::new(),
            by_shift: HashMap::new(),
            payouts: Vec::new(),
        }
    }

    pub fn day_total(&self) -> DrawerTotals {
        let mut total = DrawerTotals::default();
        for t in self.by_shift.values() {
            total.cash_collected += t.cash_collected;
            total.tips_distributed += t.tips_distributed;
            total.vendor_payouts += t.vendor_payouts;
        }
        total
    }
}
