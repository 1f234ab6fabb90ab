use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    cues::{CountdownStep, CueKind},
    models::{SymptomRecord, VitalSignRecord},
    plans::{classify_phase, Plan},
};

use super::capture::{validate_symptom, ActionError, CaptureInput};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Running,
    PausedByUser,
    /// Halted after a qualifying phase until vital signs are saved or skipped.
    AwaitingCapture,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerAction {
    Start,
    Pause,
    Reset,
    Tick,
    SaveCapture(CaptureInput),
    SkipCapture,
    ReportSymptom(String),
}

/// Side effects requested by a transition. The host executes them; the
/// reducer itself never touches audio or storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Cue(CueKind),
    OpenSession,
    AppendVitalSign(VitalSignRecord),
    AppendSymptom(SymptomRecord),
    CompleteSession,
    BeginNewAttempt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: SequencerState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(state: &SequencerState) -> Self {
        Self {
            state: state.clone(),
            effects: Vec::new(),
        }
    }
}

/// Runtime state of one playback. `phase_index` always points into the
/// plan and `remaining_secs` never exceeds the current phase's duration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SequencerState {
    pub status: PlaybackStatus,
    pub phase_index: usize,
    pub remaining_secs: u32,
    /// Index of the finished phase whose vital signs are being asked for.
    pub pending_capture: Option<usize>,
    /// Elapsed-in-phase offset of the last interval cue, 0 when none fired.
    pub last_beep_offset: u32,
    /// Set once the first start of this attempt has asked for a session.
    pub session_requested: bool,
}

fn duration_at(plan: &Plan, index: usize) -> u32 {
    plan.phases.get(index).map(|phase| phase.duration).unwrap_or(0)
}

impl SequencerState {
    pub fn new(plan: &Plan) -> Self {
        Self {
            remaining_secs: duration_at(plan, 0),
            ..Self::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == PlaybackStatus::Running
    }

    pub fn is_completed(&self) -> bool {
        self.status == PlaybackStatus::Completed
    }

    /// True until the first second of the first phase has elapsed.
    pub fn nothing_elapsed(&self, plan: &Plan) -> bool {
        self.phase_index == 0 && self.remaining_secs == duration_at(plan, 0)
    }

    pub fn elapsed_in_phase(&self, plan: &Plan) -> u32 {
        duration_at(plan, self.phase_index).saturating_sub(self.remaining_secs)
    }

    pub fn elapsed_secs(&self, plan: &Plan) -> u64 {
        plan.secs_before(self.phase_index) + u64::from(self.elapsed_in_phase(plan))
    }

    /// Fraction of the whole plan already played, in `0.0..=1.0`.
    pub fn progress(&self, plan: &Plan) -> f64 {
        let total = plan.total_secs();
        if total == 0 {
            return 0.0;
        }
        (self.elapsed_secs(plan) as f64 / total as f64).min(1.0)
    }

    pub fn apply(
        &self,
        plan: &Plan,
        action: TimerAction,
        now: DateTime<Utc>,
    ) -> Result<Transition, ActionError> {
        match action {
            TimerAction::Start => Ok(self.start()),
            TimerAction::Pause => Ok(self.pause()),
            TimerAction::Reset => Ok(Transition {
                state: Self::new(plan),
                effects: vec![Effect::BeginNewAttempt],
            }),
            TimerAction::Tick => Ok(self.tick(plan)),
            TimerAction::SaveCapture(input) => self.save_capture(plan, &input, now),
            TimerAction::SkipCapture => self.resolve_capture(plan, None),
            TimerAction::ReportSymptom(text) => self.report_symptom(plan, &text, now),
        }
    }

    fn start(&self) -> Transition {
        if !matches!(
            self.status,
            PlaybackStatus::Idle | PlaybackStatus::PausedByUser
        ) {
            return Transition::unchanged(self);
        }

        let mut next = self.clone();
        let mut effects = Vec::new();
        next.status = PlaybackStatus::Running;

        if !self.session_requested {
            next.session_requested = true;
            effects.push(Effect::OpenSession);
        }
        if self.phase_index > 0 {
            effects.push(Effect::Cue(CueKind::PhaseStart));
        }

        Transition {
            state: next,
            effects,
        }
    }

    fn pause(&self) -> Transition {
        if self.status != PlaybackStatus::Running {
            return Transition::unchanged(self);
        }
        let mut next = self.clone();
        next.status = PlaybackStatus::PausedByUser;
        Transition {
            state: next,
            effects: Vec::new(),
        }
    }

    /// One elapsed second. Evaluation order within a tick: countdown cue,
    /// then end of phase, then interval cue.
    fn tick(&self, plan: &Plan) -> Transition {
        if self.status != PlaybackStatus::Running {
            return Transition::unchanged(self);
        }
        let Some(phase) = plan.phases.get(self.phase_index) else {
            return Transition::unchanged(self);
        };

        let mut next = self.clone();
        let mut effects = Vec::new();
        next.remaining_secs = self.remaining_secs.saturating_sub(1);

        if let Some(step) = CountdownStep::from_remaining(next.remaining_secs) {
            effects.push(Effect::Cue(CueKind::Countdown(step)));
        }

        if next.remaining_secs == 0 {
            effects.push(Effect::Cue(CueKind::PhaseEnd));

            if self.phase_index >= plan.last_index() {
                next.status = PlaybackStatus::Completed;
                effects.push(Effect::CompleteSession);
            } else if classify_phase(phase).qualifies_for_capture {
                next.status = PlaybackStatus::AwaitingCapture;
                next.pending_capture = Some(self.phase_index);
            } else {
                next.enter_phase(plan, self.phase_index + 1);
            }
        } else if let Some(interval) = phase.beep_interval.filter(|secs| *secs > 0) {
            let elapsed = phase.duration.saturating_sub(next.remaining_secs);
            if elapsed > 0 && elapsed % interval == 0 && elapsed != self.last_beep_offset {
                effects.push(Effect::Cue(CueKind::Interval));
                next.last_beep_offset = elapsed;
            }
        }

        Transition {
            state: next,
            effects,
        }
    }

    fn pending_phase(&self) -> Result<usize, ActionError> {
        match (self.status, self.pending_capture) {
            (PlaybackStatus::AwaitingCapture, Some(index)) => Ok(index),
            _ => Err(ActionError::NoPendingCapture),
        }
    }

    fn save_capture(
        &self,
        plan: &Plan,
        input: &CaptureInput,
        now: DateTime<Utc>,
    ) -> Result<Transition, ActionError> {
        let pending = self.pending_phase()?;
        let capture = input.validate()?;
        let phase = plan
            .phases
            .get(pending)
            .ok_or(ActionError::NoPendingCapture)?;

        let record = VitalSignRecord::new(
            phase.name.clone(),
            capture.heart_rate,
            capture.systolic,
            capture.diastolic,
            phase.heart_rate_target().unwrap_or_default(),
            capture.comment,
            now,
        );

        self.resolve_capture(plan, Some(record))
    }

    fn resolve_capture(
        &self,
        plan: &Plan,
        record: Option<VitalSignRecord>,
    ) -> Result<Transition, ActionError> {
        let pending = self.pending_phase()?;

        let mut next = self.clone();
        let mut effects = Vec::new();
        if let Some(record) = record {
            effects.push(Effect::AppendVitalSign(record));
        }

        next.enter_phase(plan, pending + 1);
        next.status = PlaybackStatus::Running;
        effects.push(Effect::Cue(CueKind::PhaseStart));

        Ok(Transition {
            state: next,
            effects,
        })
    }

    fn report_symptom(
        &self,
        plan: &Plan,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Transition, ActionError> {
        let symptoms = validate_symptom(text)?;
        let phase_name = plan
            .phases
            .get(self.phase_index)
            .map(|phase| phase.name.as_str())
            .unwrap_or_default();

        Ok(Transition {
            state: self.clone(),
            effects: vec![Effect::AppendSymptom(SymptomRecord::new(
                phase_name, symptoms, now,
            ))],
        })
    }

    fn enter_phase(&mut self, plan: &Plan, index: usize) {
        self.phase_index = index;
        self.remaining_secs = duration_at(plan, index);
        self.pending_capture = None;
        self.last_beep_offset = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plans::fixtures::{phase, plan};

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn step(state: &SequencerState, plan: &Plan, action: TimerAction) -> (SequencerState, Vec<Effect>) {
        let transition = state.apply(plan, action, now()).unwrap();
        (transition.state, transition.effects)
    }

    /// Ticks until the status leaves `Running`, returning the tick count and
    /// every effect emitted along the way.
    fn run_until_halt(state: SequencerState, plan: &Plan) -> (SequencerState, u64, Vec<Effect>) {
        let mut state = state;
        let mut ticks = 0;
        let mut effects = Vec::new();
        while state.is_running() {
            let (next, emitted) = step(&state, plan, TimerAction::Tick);
            state = next;
            effects.extend(emitted);
            ticks += 1;
        }
        (state, ticks, effects)
    }

    fn cues(effects: &[Effect]) -> Vec<CueKind> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Cue(kind) => Some(*kind),
                _ => None,
            })
            .collect()
    }

    fn rehab_plan() -> Plan {
        plan(vec![
            phase("Calentamiento", 5, Some("60-70 lpm")),
            phase("Set 1", 4, Some("70-75 lpm")),
            phase("Descanso", 3, None),
            phase("Set 2", 4, Some("70-80 lpm")),
        ])
    }

    #[test]
    fn new_state_is_idle_at_first_phase() {
        let plan = rehab_plan();
        let state = SequencerState::new(&plan);
        assert_eq!(state.status, PlaybackStatus::Idle);
        assert_eq!(state.phase_index, 0);
        assert_eq!(state.remaining_secs, 5);
        assert!(state.nothing_elapsed(&plan));
        assert_eq!(state.progress(&plan), 0.0);
    }

    #[test]
    fn first_start_opens_session_once() {
        let plan = rehab_plan();
        let (running, effects) = step(&SequencerState::new(&plan), &plan, TimerAction::Start);
        assert_eq!(running.status, PlaybackStatus::Running);
        assert_eq!(effects, vec![Effect::OpenSession]);

        let (paused, effects) = step(&running, &plan, TimerAction::Pause);
        assert_eq!(paused.status, PlaybackStatus::PausedByUser);
        assert!(effects.is_empty());

        let (resumed, effects) = step(&paused, &plan, TimerAction::Start);
        assert!(resumed.is_running());
        assert!(effects.is_empty());
    }

    #[test]
    fn tick_outside_running_is_ignored() {
        let plan = rehab_plan();
        let idle = SequencerState::new(&plan);
        let (after, effects) = step(&idle, &plan, TimerAction::Tick);
        assert_eq!(after, idle);
        assert!(effects.is_empty());
    }

    #[test]
    fn qualifying_phase_waits_for_capture() {
        let plan = rehab_plan();
        let (running, _) = step(&SequencerState::new(&plan), &plan, TimerAction::Start);
        let (halted, ticks, effects) = run_until_halt(running, &plan);

        assert_eq!(ticks, 5);
        assert_eq!(halted.status, PlaybackStatus::AwaitingCapture);
        assert_eq!(halted.pending_capture, Some(0));
        assert_eq!(halted.phase_index, 0);
        assert_eq!(halted.remaining_secs, 0);
        assert_eq!(cues(&effects).last(), Some(&CueKind::PhaseEnd));

        // More ticks do nothing while the dialog is open.
        let (still, effects) = step(&halted, &plan, TimerAction::Tick);
        assert_eq!(still, halted);
        assert!(effects.is_empty());
    }

    #[test]
    fn saving_capture_records_and_advances() {
        let plan = plan(vec![
            phase("Set 1", 2, Some("70-75 lpm")),
            phase("Vuelta a la calma", 2, None),
        ]);
        let (running, _) = step(&SequencerState::new(&plan), &plan, TimerAction::Start);
        let (halted, _, _) = run_until_halt(running, &plan);

        let (next, effects) = step(
            &halted,
            &plan,
            TimerAction::SaveCapture(CaptureInput::heart_rate("72")),
        );

        assert!(next.is_running());
        assert_eq!(next.phase_index, 1);
        assert_eq!(next.remaining_secs, 2);
        assert_eq!(next.pending_capture, None);

        let records: Vec<&VitalSignRecord> = effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::AppendVitalSign(record) => Some(record),
                _ => None,
            })
            .collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].phase_name, "Set 1");
        assert_eq!(records[0].heart_rate, 72);
        assert_eq!(records[0].target, "70-75 lpm");
        assert_eq!(cues(&effects), vec![CueKind::PhaseStart]);
    }

    #[test]
    fn skipping_capture_advances_without_record() {
        let plan = rehab_plan();
        let (running, _) = step(&SequencerState::new(&plan), &plan, TimerAction::Start);
        let (halted, _, _) = run_until_halt(running, &plan);

        let (next, effects) = step(&halted, &plan, TimerAction::SkipCapture);
        assert!(next.is_running());
        assert_eq!(next.phase_index, 1);
        assert_eq!(next.remaining_secs, 4);
        assert!(!effects
            .iter()
            .any(|effect| matches!(effect, Effect::AppendVitalSign(_))));
    }

    #[test]
    fn invalid_capture_keeps_waiting() {
        let plan = rehab_plan();
        let (running, _) = step(&SequencerState::new(&plan), &plan, TimerAction::Start);
        let (halted, _, _) = run_until_halt(running, &plan);

        let err = halted
            .apply(&plan, TimerAction::SaveCapture(CaptureInput::default()), now())
            .unwrap_err();
        assert!(matches!(err, ActionError::Capture(_)));
        assert_eq!(halted.status, PlaybackStatus::AwaitingCapture);
    }

    #[test]
    fn capture_actions_need_a_pending_phase() {
        let plan = rehab_plan();
        let state = SequencerState::new(&plan);
        assert_eq!(
            state.apply(&plan, TimerAction::SkipCapture, now()),
            Err(ActionError::NoPendingCapture)
        );
        assert_eq!(
            state.apply(
                &plan,
                TimerAction::SaveCapture(CaptureInput::heart_rate("80")),
                now()
            ),
            Err(ActionError::NoPendingCapture)
        );
    }

    #[test]
    fn non_qualifying_phase_auto_advances() {
        let plan = plan(vec![
            phase("Descanso", 2, None),
            phase("Set 1", 3, None),
            phase("Final", 1, None),
        ]);
        let (mut state, _) = step(&SequencerState::new(&plan), &plan, TimerAction::Start);
        for _ in 0..2 {
            state = step(&state, &plan, TimerAction::Tick).0;
        }
        assert!(state.is_running());
        assert_eq!(state.phase_index, 1);
        assert_eq!(state.remaining_secs, 3);
    }

    #[test]
    fn last_phase_completes_even_when_qualifying() {
        let plan = plan(vec![
            phase("Calentamiento", 2, None),
            phase("Set 1", 2, Some("70-75 lpm")),
        ]);
        let (running, _) = step(&SequencerState::new(&plan), &plan, TimerAction::Start);
        let (done, ticks, effects) = run_until_halt(running, &plan);

        assert_eq!(ticks, 4);
        assert_eq!(done.status, PlaybackStatus::Completed);
        assert_eq!(done.pending_capture, None);
        assert_eq!(done.progress(&plan), 1.0);
        assert_eq!(
            effects
                .iter()
                .filter(|effect| **effect == Effect::CompleteSession)
                .count(),
            1
        );

        let (after, effects) = step(&done, &plan, TimerAction::Start);
        assert_eq!(after, done);
        assert!(effects.is_empty());
    }

    #[test]
    fn full_run_takes_sum_of_durations() {
        let plan = rehab_plan();
        let (mut state, _) = step(&SequencerState::new(&plan), &plan, TimerAction::Start);
        let mut ticks = 0;
        let mut captures = 0;

        loop {
            let (halted, spent, _) = run_until_halt(state, &plan);
            ticks += spent;
            match halted.status {
                PlaybackStatus::AwaitingCapture => {
                    captures += 1;
                    state = step(&halted, &plan, TimerAction::SkipCapture).0;
                }
                PlaybackStatus::Completed => break,
                other => panic!("unexpected halt in {other:?}"),
            }
        }

        assert_eq!(ticks, plan.total_secs());
        assert_eq!(captures, 2);
    }

    #[test]
    fn interval_cues_fire_once_per_boundary() {
        let mut beeping = phase("Paseo", 90, None);
        beeping.beep_interval = Some(30);
        let plan = plan(vec![beeping, phase("Final", 1, None)]);

        let (mut state, _) = step(&SequencerState::new(&plan), &plan, TimerAction::Start);
        let mut fired_at = Vec::new();
        while state.phase_index == 0 {
            let (next, effects) = step(&state, &plan, TimerAction::Tick);
            if cues(&effects).contains(&CueKind::Interval) {
                fired_at.push(next.elapsed_in_phase(&plan));
            }
            state = next;
        }
        assert_eq!(fired_at, vec![30, 60]);
    }

    #[test]
    fn interval_longer_than_phase_never_fires() {
        let mut beeping = phase("Set corto", 20, None);
        beeping.beep_interval = Some(20);
        let plan = plan(vec![beeping, phase("Final", 1, None)]);

        let (running, _) = step(&SequencerState::new(&plan), &plan, TimerAction::Start);
        let (_, _, effects) = run_until_halt(running, &plan);
        assert!(!cues(&effects).contains(&CueKind::Interval));
    }

    #[test]
    fn countdown_fires_for_every_phase() {
        let plan = rehab_plan();
        let (mut state, _) = step(&SequencerState::new(&plan), &plan, TimerAction::Start);
        let mut countdowns = Vec::new();

        loop {
            let (halted, _, effects) = run_until_halt(state, &plan);
            countdowns.extend(
                cues(&effects)
                    .into_iter()
                    .filter(|kind| matches!(kind, CueKind::Countdown(_))),
            );
            if halted.is_completed() {
                break;
            }
            state = step(&halted, &plan, TimerAction::SkipCapture).0;
        }

        let expected_per_phase = [
            CueKind::Countdown(CountdownStep::Three),
            CueKind::Countdown(CountdownStep::Two),
            CueKind::Countdown(CountdownStep::One),
        ];
        assert_eq!(countdowns.len(), 3 * plan.phases.len());
        for chunk in countdowns.chunks(3) {
            assert_eq!(chunk, expected_per_phase);
        }
    }

    #[test]
    fn resume_after_first_phase_cues_phase_start() {
        let plan = plan(vec![phase("Descanso", 1, None), phase("Set 1", 10, None)]);
        let (running, _) = step(&SequencerState::new(&plan), &plan, TimerAction::Start);
        let (advanced, effects) = step(&running, &plan, TimerAction::Tick);
        assert_eq!(advanced.phase_index, 1);
        assert!(!cues(&effects).contains(&CueKind::PhaseStart));

        let (paused, _) = step(&advanced, &plan, TimerAction::Pause);
        let (_, effects) = step(&paused, &plan, TimerAction::Start);
        assert_eq!(effects, vec![Effect::Cue(CueKind::PhaseStart)]);
    }

    #[test]
    fn reset_is_idempotent_from_any_state() {
        let plan = rehab_plan();
        let (running, _) = step(&SequencerState::new(&plan), &plan, TimerAction::Start);
        let (halted, _, _) = run_until_halt(running, &plan);

        let (once, effects) = step(&halted, &plan, TimerAction::Reset);
        let (twice, _) = step(&once, &plan, TimerAction::Reset);

        assert_eq!(effects, vec![Effect::BeginNewAttempt]);
        assert_eq!(once, SequencerState::new(&plan));
        assert_eq!(twice, once);
        assert!(!once.session_requested);
    }

    #[test]
    fn symptom_report_uses_current_phase() {
        let plan = rehab_plan();
        let state = SequencerState::new(&plan);

        assert_eq!(
            state.apply(&plan, TimerAction::ReportSymptom("   ".into()), now()),
            Err(ActionError::EmptySymptom)
        );

        let (after, effects) = step(&state, &plan, TimerAction::ReportSymptom(" mareo ".into()));
        assert_eq!(after, state);
        match effects.as_slice() {
            [Effect::AppendSymptom(record)] => {
                assert_eq!(record.phase_name, "Calentamiento");
                assert_eq!(record.symptoms, "mareo");
            }
            other => panic!("unexpected effects {other:?}"),
        }
    }

    #[test]
    fn progress_counts_completed_phases() {
        let plan = rehab_plan();
        let state = SequencerState {
            status: PlaybackStatus::Running,
            phase_index: 2,
            remaining_secs: 1,
            ..SequencerState::default()
        };
        assert_eq!(state.elapsed_secs(&plan), 11);
        assert!((state.progress(&plan) - 11.0 / 16.0).abs() < f64::EPSILON);
    }
}
