use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-user, per-week aggregate of captured vital signs and SOS reports.
/// Weeks start on Monday.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyVitalsRow {
    pub user_id: String,
    pub week_start: NaiveDate,
    pub avg_bpm: Option<f64>,
    pub avg_sys: Option<f64>,
    pub avg_dia: Option<f64>,
    pub n_hr: u32,
    pub n_bp: u32,
    pub sos_count: u32,
}
