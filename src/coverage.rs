//! Pure time-based classification of a warranty coverage window.
//!
//! Everything in this module is a deterministic function of its inputs; the
//! caller supplies `now`. No I/O, no mutation, no hidden state. The review
//! workflow and HTTP layer compose these functions with stored records to
//! produce user-facing status.

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::entities::ReviewStatus;

/// A warranty within this many days of its coverage end is "expiring soon".
pub const EXPIRING_SOON_WINDOW_DAYS: i64 = 30;

/// Time-derived state of an approved warranty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum CoverageStatus {
    Active,
    ExpiringSoon,
    Expired,
}

impl CoverageStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CoverageStatus::Active => "Active",
            CoverageStatus::ExpiringSoon => "Expiring Soon",
            CoverageStatus::Expired => "Expired",
        }
    }
}

/// User-facing status combining review state and coverage time. Computed on
/// read, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DisplayStatus {
    pub core: CoverageStatus,
    pub days_remaining: u32,
    pub percent_remaining: u8,
    pub label: String,
}

/// Last calendar date of coverage: the purchase date advanced by exactly
/// `period_years` years. Chrono's month arithmetic clamps invalid targets
/// (Feb 29 in a non-leap year becomes Feb 28).
pub fn coverage_end(purchase_date: NaiveDate, period_years: u8) -> NaiveDate {
    purchase_date + Months::new(u32::from(period_years) * 12)
}

fn instant(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc()
}

/// Whole days between `now` and the coverage end, floored and clamped to 0.
pub fn days_remaining(purchase_date: NaiveDate, period_years: u8, now: DateTime<Utc>) -> u32 {
    let end = instant(coverage_end(purchase_date, period_years));
    (end - now).num_days().max(0) as u32
}

/// Share of the coverage window still ahead of `now`, rounded to an integer
/// percentage and clamped to [0, 100]. A degenerate zero-length window is
/// widened to one millisecond so the ratio stays defined.
pub fn percent_remaining(purchase_date: NaiveDate, period_years: u8, now: DateTime<Utc>) -> u8 {
    let start = instant(purchase_date);
    let end = instant(coverage_end(purchase_date, period_years));
    let total_ms = (end - start).num_milliseconds().max(1);
    let left_ms = (end - now).num_milliseconds().clamp(0, total_ms);
    let pct = (left_ms as f64 * 100.0 / total_ms as f64).round() as i64;
    pct.clamp(0, 100) as u8
}

/// Classifies the coverage window at `now`.
pub fn core_status(purchase_date: NaiveDate, period_years: u8, now: DateTime<Utc>) -> CoverageStatus {
    let end = instant(coverage_end(purchase_date, period_years));
    if now > end {
        CoverageStatus::Expired
    } else if i64::from(days_remaining(purchase_date, period_years, now))
        <= EXPIRING_SOON_WINDOW_DAYS
    {
        CoverageStatus::ExpiringSoon
    } else {
        CoverageStatus::Active
    }
}

/// Combines the time-based core status with the review state.
///
/// Only an approved record exposes the time-based label; a pending or
/// declined record shows its review state regardless of where `now` falls
/// in the coverage window.
pub fn display_status(
    purchase_date: NaiveDate,
    period_years: u8,
    review_status: ReviewStatus,
    now: DateTime<Utc>,
) -> DisplayStatus {
    let core = core_status(purchase_date, period_years, now);
    let label = match review_status {
        ReviewStatus::Approved => core.label().to_string(),
        other => other.label().to_string(),
    };

    DisplayStatus {
        core,
        days_remaining: days_remaining(purchase_date, period_years, now),
        percent_remaining: percent_remaining(purchase_date, period_years, now),
        label,
    }
}
