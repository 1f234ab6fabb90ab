use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Heart-rate / blood-pressure entry captured after a qualifying phase.
///
/// Phase name and target are copied from the phase at capture time so the
/// record stays meaningful if the plan changes later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VitalSignRecord {
    pub id: String,
    pub phase_name: String,
    pub heart_rate: u16,
    pub systolic: Option<u16>,
    pub diastolic: Option<u16>,
    pub target: String,
    pub comment: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl VitalSignRecord {
    pub fn new(
        phase_name: impl Into<String>,
        heart_rate: u16,
        systolic: Option<u16>,
        diastolic: Option<u16>,
        target: impl Into<String>,
        comment: Option<String>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            phase_name: phase_name.into(),
            heart_rate,
            systolic,
            diastolic,
            target: target.into(),
            comment,
            captured_at,
        }
    }

    pub fn has_blood_pressure(&self) -> bool {
        self.systolic.is_some() || self.diastolic.is_some()
    }
}
