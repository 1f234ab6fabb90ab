use serde::Serialize;

use crate::{
    models::{SymptomRecord, VitalSignRecord},
    plans::{classify_phase, Phase, Plan, RpeRange},
    recorder::RecorderView,
};

use super::state::{PlaybackStatus, SequencerState};

/// Label of the primary button while the timer is not running.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StartLabel {
    Start,
    Resume,
}

/// What the capture dialog shows for the phase that just finished.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureDialog {
    pub phase_index: usize,
    pub phase_name: String,
    pub target: String,
}

/// Everything the hosting UI needs to render one frame of playback.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub plan_id: String,
    pub plan_name: String,
    pub hr_range: String,
    pub rpe: Option<RpeRange>,
    pub status: PlaybackStatus,
    pub phase_index: usize,
    pub phase_count: usize,
    pub phase: Phase,
    pub remaining_secs: u32,
    pub remaining_label: String,
    pub total_secs: u64,
    pub elapsed_secs: u64,
    pub progress: f64,
    pub running: bool,
    pub completed: bool,
    pub start_label: StartLabel,
    pub is_rest_phase: bool,
    pub rest_message: Option<String>,
    pub pending_capture: Option<CaptureDialog>,
    pub session_id: Option<String>,
    pub vital_signs: Vec<VitalSignRecord>,
    pub symptoms: Vec<SymptomRecord>,
}

impl PlaybackSnapshot {
    pub fn build(plan: &Plan, state: &SequencerState, records: RecorderView) -> Self {
        let phase = plan
            .phases
            .get(state.phase_index)
            .cloned()
            .unwrap_or_default();
        let is_rest_phase = classify_phase(&phase).is_rest;

        let pending_capture = state.pending_capture.and_then(|index| {
            plan.phases.get(index).map(|pending| CaptureDialog {
                phase_index: index,
                phase_name: pending.name.clone(),
                target: pending.heart_rate_target().unwrap_or_default().to_string(),
            })
        });

        let start_label = if state.nothing_elapsed(plan) {
            StartLabel::Start
        } else {
            StartLabel::Resume
        };

        Self {
            plan_id: plan.id.clone(),
            plan_name: plan.name.clone(),
            hr_range: plan.hr_range.clone(),
            rpe: plan.rpe,
            status: state.status,
            phase_index: state.phase_index,
            phase_count: plan.phases.len(),
            remaining_secs: state.remaining_secs,
            remaining_label: format_clock(state.remaining_secs),
            total_secs: plan.total_secs(),
            elapsed_secs: state.elapsed_secs(plan),
            progress: state.progress(plan),
            running: state.is_running(),
            completed: state.is_completed(),
            start_label,
            rest_message: if is_rest_phase {
                plan.rest_message.clone()
            } else {
                None
            },
            is_rest_phase,
            phase,
            pending_capture,
            session_id: records.session_id,
            vital_signs: records.vital_signs,
            symptoms: records.symptoms,
        }
    }
}

/// `M:SS`, minutes unpadded.
pub fn format_clock(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
