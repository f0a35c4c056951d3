//! Immutable domain records shared across pipeline stages.
//!
//! Every type here is constructed through a validating factory (`new`/
//! `try_new`) and carries no setters after construction; updated copies are
//! produced with `with_*` builder methods, mirroring the value-type
//! discipline the rest of this codebase already uses for DTOs.

pub mod cash;
pub mod labor;
pub mod order;
pub mod pattern;
pub mod run_result;
pub mod shift;
pub mod time_entry;
pub mod timeslot;

pub use cash::{CashFlow, VendorPayout};
pub use labor::{LaborDto, LaborGrade, LaborMetrics, LaborStatus};
pub use order::{Category, OrderRecord};
pub use pattern::{DailyLaborPattern, TimeslotPattern};
pub use run_result::PipelineRunResult;
pub use shift::{Shift, ShiftMetrics};
pub use time_entry::TimeEntry;
pub use timeslot::Timeslot;

/// Fixed iteration order used everywhere categories are aggregated or
/// serialized, so outputs stay byte-stable across runs.
pub const CATEGORY_ORDER: [Category; 3] = [Category::Lobby, Category::DriveThru, Category::ToGo];
