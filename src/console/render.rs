//! Plain-text rendering of snapshots and stored data for the console.

use crate::{
    db::{SessionRow, WeeklyVitalsRow},
    plans::Plan,
    timer::{CaptureDialog, PlaybackSnapshot, PlaybackStatus, StartLabel},
};

pub fn render_plan_intro(plan: &Plan) -> String {
    let mut out = format!(
        "{} ({} phases, {})",
        plan.name,
        plan.phases.len(),
        crate::timer::format_clock(u32::try_from(plan.total_secs()).unwrap_or(u32::MAX))
    );
    if !plan.intro.is_empty() {
        out.push_str(&format!("\n{}", plan.intro));
    }
    if !plan.hr_range.is_empty() {
        out.push_str(&format!("\nTarget heart rate: {}", plan.hr_range));
    }
    if let Some(rpe) = plan.rpe {
        out.push_str(&format!("\nPerceived exertion: {}-{} of 10", rpe.min, rpe.max));
    }
    out
}

fn status_word(snapshot: &PlaybackSnapshot) -> &'static str {
    match snapshot.status {
        PlaybackStatus::Idle => "ready",
        PlaybackStatus::Running => "running",
        PlaybackStatus::PausedByUser => "paused",
        PlaybackStatus::AwaitingCapture => "waiting for vital signs",
        PlaybackStatus::Completed => "completed",
    }
}

/// One line: phase, position, clock, status and overall progress.
pub fn render_status(snapshot: &PlaybackSnapshot) -> String {
    let mut line = format!(
        "[{}/{}] {} {} {} ({:.0}%)",
        snapshot.phase_index + 1,
        snapshot.phase_count,
        snapshot.phase.name,
        snapshot.remaining_label,
        status_word(snapshot),
        snapshot.progress * 100.0,
    );
    if let Some(target) = snapshot.phase.heart_rate_target() {
        line.push_str(&format!(" target {target}"));
    }
    if !snapshot.running && !snapshot.completed && snapshot.pending_capture.is_none() {
        let hint = match snapshot.start_label {
            StartLabel::Start => "start",
            StartLabel::Resume => "resume",
        };
        line.push_str(&format!(" · type `{hint}`"));
    }
    line
}

/// Shown when a new phase begins.
pub fn render_phase_header(snapshot: &PlaybackSnapshot) -> String {
    let phase = &snapshot.phase;
    let mut out = format!(
        "== Phase {} of {}: {} ({}, {}) ==",
        snapshot.phase_index + 1,
        snapshot.phase_count,
        phase.name,
        phase.intensity,
        crate::timer::format_clock(phase.duration)
    );
    if !phase.description.is_empty() {
        out.push_str(&format!("\n{}", phase.description));
    }
    if let (Some(action), Some(every)) = (&phase.beep_action, phase.beep_interval) {
        out.push_str(&format!("\nEvery {every}s at the beep: {action}"));
    }
    if let Some(message) = &snapshot.rest_message {
        out.push_str(&format!("\n{message}"));
    }
    out
}

pub fn render_capture_prompt(dialog: &CaptureDialog) -> String {
    format!(
        "{} finished. Target {}.\nsave <hr> [sys/dia] [note] to record, or skip",
        dialog.phase_name, dialog.target
    )
}

pub fn render_session_row(row: &SessionRow) -> String {
    let state = if row.completed { "completed" } else { "unfinished" };
    format!(
        "{}  {:<28} {}  {}",
        row.started_at.format("%Y-%m-%d %H:%M"),
        row.plan_name,
        state,
        row.id
    )
}

fn average(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.0}"))
}

pub fn render_report_row(row: &WeeklyVitalsRow) -> String {
    format!(
        "{}  {:<12} bpm {:>4} ({})  bp {}/{} ({})  sos {}",
        row.week_start,
        row.user_id,
        average(row.avg_bpm),
        row.n_hr,
        average(row.avg_sys),
        average(row.avg_dia),
        row.n_bp,
        row.sos_count
    )
}

/// What to print for a published snapshot given the previous one.
pub fn announcement(previous: &PlaybackSnapshot, next: &PlaybackSnapshot) -> Option<String> {
    if let Some(dialog) = &next.pending_capture {
        if previous.pending_capture.is_none() {
            return Some(render_capture_prompt(dialog));
        }
        return None;
    }
    if next.completed && !previous.completed {
        return Some(format!(
            "Plan completed. {} vital sign(s), {} SOS report(s) recorded.",
            next.vital_signs.len(),
            next.symptoms.len()
        ));
    }
    let entered_phase = next.phase_index != previous.phase_index
        || previous.status == PlaybackStatus::Idle;
    if next.running && entered_phase {
        return Some(format!("{}\n{}", render_phase_header(next), render_status(next)));
    }
    if next.status != previous.status {
        return Some(render_status(next));
    }
    if next.running
        && next.remaining_secs != previous.remaining_secs
        && next.remaining_secs > 0
        && (next.remaining_secs % 30 == 0 || next.remaining_secs <= 3)
    {
        return Some(render_status(next));
    }
    None
}
