use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// SOS note reported by the patient while a phase is on screen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SymptomRecord {
    pub id: String,
    pub phase_name: String,
    pub symptoms: String,
    pub reported_at: DateTime<Utc>,
}

impl SymptomRecord {
    pub fn new(
        phase_name: impl Into<String>,
        symptoms: impl Into<String>,
        reported_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            phase_name: phase_name.into(),
            symptoms: symptoms.into(),
            reported_at,
        }
    }
}
