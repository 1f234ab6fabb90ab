//! Input handling for the vital-sign capture dialog and the SOS form.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("heart rate is required")]
    MissingHeartRate,
    #[error("heart rate '{0}' is not a valid number of beats per minute")]
    InvalidHeartRate(String),
    #[error("{field} pressure '{value}' is not a valid number")]
    InvalidPressure { field: &'static str, value: String },
}

/// Rejections the UI shows next to the form that caused them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("no vital-sign capture is pending")]
    NoPendingCapture,
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("describe the symptoms before sending an SOS")]
    EmptySymptom,
}

/// Raw field contents of the capture dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureInput {
    pub heart_rate: String,
    pub systolic: String,
    pub diastolic: String,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidCapture {
    pub heart_rate: u16,
    pub systolic: Option<u16>,
    pub diastolic: Option<u16>,
    pub comment: Option<String>,
}

impl CaptureInput {
    pub fn heart_rate(value: impl Into<String>) -> Self {
        Self {
            heart_rate: value.into(),
            ..Self::default()
        }
    }

    pub fn with_pressure(mut self, systolic: impl Into<String>, diastolic: impl Into<String>) -> Self {
        self.systolic = systolic.into();
        self.diastolic = diastolic.into();
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Whether the save button should be enabled. Skip is always allowed.
    pub fn can_save(&self) -> bool {
        parse_heart_rate(&self.heart_rate).is_ok()
    }

    pub fn validate(&self) -> Result<ValidCapture, CaptureError> {
        let heart_rate = parse_heart_rate(&self.heart_rate)?;
        let systolic = parse_pressure("systolic", &self.systolic)?;
        let diastolic = parse_pressure("diastolic", &self.diastolic)?;
        let comment = Some(self.comment.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Ok(ValidCapture {
            heart_rate,
            systolic,
            diastolic,
            comment,
        })
    }
}

fn parse_heart_rate(raw: &str) -> Result<u16, CaptureError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CaptureError::MissingHeartRate);
    }
    match raw.parse::<u16>() {
        Ok(bpm) if bpm > 0 => Ok(bpm),
        _ => Err(CaptureError::InvalidHeartRate(raw.to_string())),
    }
}

fn parse_pressure(field: &'static str, raw: &str) -> Result<Option<u16>, CaptureError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<u16>() {
        Ok(value) if value > 0 => Ok(Some(value)),
        _ => Err(CaptureError::InvalidPressure {
            field,
            value: raw.to_string(),
        }),
    }
}

/// Trimmed SOS text, or `EmptySymptom` when nothing but whitespace was typed.
pub fn validate_symptom(text: &str) -> Result<&str, ActionError> {
    let text = text.trim();
    if text.is_empty() {
        Err(ActionError::EmptySymptom)
    } else {
        Ok(text)
    }
}
