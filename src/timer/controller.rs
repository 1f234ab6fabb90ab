use std::{sync::Arc, time::Duration};

use chrono::{Local, Utc};
use log::{debug, info, warn};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    cues::CueEngine,
    identity::IdentityProvider,
    ledger::LocalCompletionLedger,
    plans::Plan,
    recorder::SessionRecorder,
};

use super::{
    capture::{ActionError, CaptureInput},
    snapshot::PlaybackSnapshot,
    state::{Effect, SequencerState, TimerAction},
};

/// Capabilities the controller drives. Built once per playback.
#[derive(Clone)]
pub struct PlaybackServices {
    pub cues: CueEngine,
    pub recorder: SessionRecorder,
    pub identity: Arc<dyn IdentityProvider>,
    pub ledger: Option<Arc<LocalCompletionLedger>>,
}

struct Playback {
    plan: Plan,
    state: Mutex<SequencerState>,
    services: PlaybackServices,
    snapshots: watch::Sender<PlaybackSnapshot>,
}

impl Playback {
    /// Applies one action and runs its effects while the state lock is
    /// held, so effects from concurrent callers never interleave.
    /// Returns whether the timer was running before and after.
    async fn step(&self, action: TimerAction) -> Result<(bool, bool, PlaybackSnapshot), ActionError> {
        let mut state = self.state.lock().await;
        let transition = state.apply(&self.plan, action, Utc::now())?;
        let was_running = state.is_running();
        *state = transition.state;

        for effect in transition.effects {
            self.execute(effect);
        }

        let snapshot = PlaybackSnapshot::build(&self.plan, &state, self.services.recorder.view());
        self.snapshots.send_replace(snapshot.clone());
        Ok((was_running, state.is_running(), snapshot))
    }

    fn execute(&self, effect: Effect) {
        let services = &self.services;
        match effect {
            Effect::Cue(kind) => services.cues.emit(kind),
            Effect::OpenSession => match services.identity.current_user() {
                Some(user) => {
                    services
                        .recorder
                        .open_session(&user.id, &self.plan.id, &self.plan.name);
                }
                None => debug!("No signed-in user; playing {} without a session", self.plan.id),
            },
            Effect::AppendVitalSign(record) => services.recorder.append_vital_sign(record),
            Effect::AppendSymptom(record) => services.recorder.append_symptom(record),
            Effect::CompleteSession => {
                info!("Plan {} completed", self.plan.id);
                services.recorder.complete_session();
                if let Some(ledger) = &services.ledger {
                    ledger.mark_completed_in_background(Local::now().date_naive());
                }
            }
            Effect::BeginNewAttempt => services.recorder.begin_new_attempt(),
        }
    }
}

#[derive(Clone)]
pub struct TimerController {
    playback: Arc<Playback>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_interval: Duration,
}

impl TimerController {
    /// Fails when the plan cannot be played, e.g. it has no phases.
    pub fn new(plan: Plan, services: PlaybackServices, tick_interval: Duration) -> anyhow::Result<Self> {
        plan.validate()?;

        let state = SequencerState::new(&plan);
        let initial = PlaybackSnapshot::build(&plan, &state, services.recorder.view());
        let (snapshots, _) = watch::channel(initial);

        Ok(Self {
            playback: Arc::new(Playback {
                plan,
                state: Mutex::new(state),
                services,
                snapshots,
            }),
            ticker: Arc::new(Mutex::new(None)),
            tick_interval,
        })
    }

    pub fn plan(&self) -> &Plan {
        &self.playback.plan
    }

    pub fn recorder(&self) -> &SessionRecorder {
        &self.playback.services.recorder
    }

    pub async fn snapshot(&self) -> PlaybackSnapshot {
        let state = self.playback.state.lock().await;
        PlaybackSnapshot::build(
            &self.playback.plan,
            &state,
            self.playback.services.recorder.view(),
        )
    }

    /// Every state change is published here.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.playback.snapshots.subscribe()
    }

    /// Starts or resumes.
    pub async fn start(&self) -> Result<PlaybackSnapshot, ActionError> {
        self.dispatch(TimerAction::Start).await
    }

    pub async fn pause(&self) -> Result<PlaybackSnapshot, ActionError> {
        self.dispatch(TimerAction::Pause).await
    }

    pub async fn reset(&self) -> Result<PlaybackSnapshot, ActionError> {
        self.dispatch(TimerAction::Reset).await
    }

    pub async fn save_capture(&self, input: CaptureInput) -> Result<PlaybackSnapshot, ActionError> {
        self.dispatch(TimerAction::SaveCapture(input)).await
    }

    pub async fn skip_capture(&self) -> Result<PlaybackSnapshot, ActionError> {
        self.dispatch(TimerAction::SkipCapture).await
    }

    pub async fn report_symptom(&self, text: &str) -> Result<PlaybackSnapshot, ActionError> {
        self.dispatch(TimerAction::ReportSymptom(text.to_string()))
            .await
    }

    /// Stops ticking, releases audio and waits for pending writes.
    pub async fn shutdown(&self) {
        cancel_ticker(&mut *self.ticker.lock().await);
        self.playback.services.cues.close();
        self.playback.services.recorder.flush().await;
    }

    /// The ticker slot stays locked from the state change until the ticker
    /// matches it, so concurrent start and pause cannot leave a running
    /// state without a ticker or a ticker behind a paused state.
    async fn dispatch(&self, action: TimerAction) -> Result<PlaybackSnapshot, ActionError> {
        let mut ticker = self.ticker.lock().await;
        let (was_running, now_running, snapshot) = self.playback.step(action).await?;

        if !was_running && now_running {
            self.spawn_ticker(&mut ticker);
        } else if was_running && !now_running {
            cancel_ticker(&mut ticker);
        }

        Ok(snapshot)
    }

    fn spawn_ticker(&self, slot: &mut Option<JoinHandle<()>>) {
        cancel_ticker(slot);

        let playback = self.playback.clone();
        let period = self.tick_interval;

        let handle = tokio::spawn(async move {
            // First tick one full period after starting, not immediately.
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;

                match playback.step(TimerAction::Tick).await {
                    Ok((_, true, _)) => {}
                    Ok((_, false, _)) => break,
                    Err(err) => {
                        warn!("Tick rejected: {err}");
                        break;
                    }
                }
            }
        });

        *slot = Some(handle);
    }
}

fn cancel_ticker(slot: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = slot.take() {
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use anyhow::Result;
    use async_trait::async_trait;

    use super::*;
    use crate::{
        audio::AudioCueSink,
        cues::ToneRequest,
        identity::{StaticIdentity, UserIdentity},
        models::{SymptomRecord, VitalSignRecord},
        plans::fixtures::{phase, plan},
        recorder::{SessionStore, SessionUpdate},
        timer::state::PlaybackStatus,
    };

    #[derive(Default)]
    struct Tones(StdMutex<Vec<f32>>);

    impl AudioCueSink for Tones {
        fn play(&self, tone: ToneRequest) -> Result<()> {
            self.0.lock().unwrap().push(tone.frequency_hz);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Store {
        sessions: StdMutex<Vec<(String, bool)>>,
        vital_signs: StdMutex<Vec<VitalSignRecord>>,
        symptoms: StdMutex<Vec<SymptomRecord>>,
    }

    #[async_trait]
    impl SessionStore for Store {
        async fn create_session(&self, user_id: &str, _slug: &str, _name: &str) -> Result<String> {
            let mut sessions = self.sessions.lock().unwrap();
            sessions.push((user_id.to_string(), false));
            Ok(format!("s{}", sessions.len()))
        }

        async fn insert_vital_sign(&self, _session_id: &str, record: &VitalSignRecord) -> Result<()> {
            self.vital_signs.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn insert_symptom(&self, _session_id: &str, record: &SymptomRecord) -> Result<()> {
            self.symptoms.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn update_session(&self, session_id: &str, update: SessionUpdate) -> Result<()> {
            let index: usize = session_id.trim_start_matches('s').parse()?;
            self.sessions.lock().unwrap()[index - 1].1 = update.completed;
            Ok(())
        }
    }

    struct Harness {
        controller: TimerController,
        store: Arc<Store>,
        tones: Arc<Tones>,
        ledger: Arc<LocalCompletionLedger>,
        _dir: tempfile::TempDir,
    }

    fn harness(plan: Plan, identity: StaticIdentity) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::default());
        let tones = Arc::new(Tones::default());
        let ledger = Arc::new(LocalCompletionLedger::open(dir.path().join("ledger.json")).unwrap());
        let services = PlaybackServices {
            cues: CueEngine::new(tones.clone(), true),
            recorder: SessionRecorder::spawn(store.clone()),
            identity: Arc::new(identity),
            ledger: Some(ledger.clone()),
        };
        Harness {
            controller: TimerController::new(plan, services, Duration::from_secs(1)).unwrap(),
            store,
            tones,
            ledger,
            _dir: dir,
        }
    }

    fn patient() -> StaticIdentity {
        StaticIdentity::signed_in(
            UserIdentity {
                id: "u1".into(),
                email: "ana@example.com".into(),
                metadata: serde_json::Value::Null,
            },
            None,
        )
    }

    fn two_phase_plan() -> Plan {
        plan(vec![
            phase("Set 1", 3, Some("70-75 lpm")),
            phase("Descanso", 2, None),
        ])
    }

    async fn sleep_ms(ms: u64) {
        time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn runs_through_capture_to_completion() {
        let h = harness(two_phase_plan(), patient());

        let started = h.controller.start().await.unwrap();
        assert!(started.running);

        sleep_ms(3_500).await;
        let snapshot = h.controller.snapshot().await;
        assert_eq!(snapshot.status, PlaybackStatus::AwaitingCapture);
        assert_eq!(snapshot.pending_capture.as_ref().map(|c| c.phase_index), Some(0));

        // Held indefinitely while the dialog is open.
        sleep_ms(10_000).await;
        assert_eq!(h.controller.snapshot().await.remaining_secs, 0);

        let resumed = h
            .controller
            .save_capture(CaptureInput::heart_rate("72").with_pressure("120", "80"))
            .await
            .unwrap();
        assert_eq!(resumed.phase_index, 1);
        assert!(resumed.running);

        sleep_ms(2_500).await;
        let done = h.controller.snapshot().await;
        assert!(done.completed);
        assert!(!done.running);

        h.controller.shutdown().await;
        assert_eq!(h.store.vital_signs.lock().unwrap()[0].heart_rate, 72);
        assert_eq!(*h.store.sessions.lock().unwrap(), vec![("u1".to_string(), true)]);
        assert_eq!(h.ledger.days().len(), 1);

        let tones = h.tones.0.lock().unwrap().clone();
        // 2-1 and end for the set, start after capture, 1 and end for the rest.
        assert_eq!(tones, vec![659.0, 784.0, 1000.0, 800.0, 784.0, 1000.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_the_countdown() {
        let h = harness(plan(vec![phase("Set 1", 10, None), phase("Descanso", 5, None)]), patient());

        h.controller.start().await.unwrap();
        sleep_ms(2_500).await;
        let paused = h.controller.pause().await.unwrap();
        assert_eq!(paused.remaining_secs, 8);
        assert_eq!(paused.status, PlaybackStatus::PausedByUser);

        sleep_ms(5_000).await;
        assert_eq!(h.controller.snapshot().await.remaining_secs, 8);

        let resumed = h.controller.start().await.unwrap();
        assert!(resumed.running);
        sleep_ms(1_500).await;
        assert_eq!(h.controller.snapshot().await.remaining_secs, 7);

        h.controller.shutdown().await;
        // One session for the whole attempt, despite the resume.
        assert_eq!(h.store.sessions.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_starts_a_new_attempt() {
        let h = harness(two_phase_plan(), patient());

        h.controller.start().await.unwrap();
        sleep_ms(1_500).await;
        h.controller.report_symptom("mareo").await.unwrap();

        let reset = h.controller.reset().await.unwrap();
        assert_eq!(reset.status, PlaybackStatus::Idle);
        assert_eq!(reset.remaining_secs, 3);
        assert!(reset.symptoms.is_empty());

        sleep_ms(3_000).await;
        assert_eq!(h.controller.snapshot().await.remaining_secs, 3);

        h.controller.start().await.unwrap();
        h.controller.shutdown().await;
        assert_eq!(h.store.sessions.lock().unwrap().len(), 2);
        assert_eq!(h.store.symptoms.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn anonymous_playback_keeps_records_locally() {
        let h = harness(two_phase_plan(), StaticIdentity::anonymous());

        h.controller.start().await.unwrap();
        h.controller.report_symptom("dolor de pecho").await.unwrap();
        sleep_ms(3_500).await;
        h.controller.skip_capture().await.unwrap();
        h.controller.shutdown().await;

        let snapshot = h.controller.snapshot().await;
        assert_eq!(snapshot.session_id, None);
        assert_eq!(snapshot.symptoms.len(), 1);
        assert!(h.store.sessions.lock().unwrap().is_empty());
        assert!(h.store.symptoms.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_actions_leave_state_alone() {
        let h = harness(two_phase_plan(), patient());

        assert_eq!(
            h.controller.skip_capture().await.unwrap_err(),
            ActionError::NoPendingCapture
        );
        assert_eq!(
            h.controller.report_symptom("   ").await.unwrap_err(),
            ActionError::EmptySymptom
        );

        h.controller.start().await.unwrap();
        sleep_ms(3_500).await;
        assert!(h
            .controller
            .save_capture(CaptureInput::heart_rate(""))
            .await
            .is_err());
        assert_eq!(
            h.controller.snapshot().await.status,
            PlaybackStatus::AwaitingCapture
        );
        h.controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_every_tick() {
        let h = harness(two_phase_plan(), patient());
        let mut updates = h.controller.subscribe();

        h.controller.start().await.unwrap();
        updates.changed().await.unwrap();
        assert!(updates.borrow_and_update().running);

        updates.changed().await.unwrap();
        assert_eq!(updates.borrow_and_update().remaining_secs, 2);
        h.controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn racing_pause_and_start_keep_ticker_in_step() {
        let h = harness(plan(vec![phase("Set 1", 100, None)]), patient());
        h.controller.start().await.unwrap();

        for round in 0..6 {
            let (first, second) = (h.controller.clone(), h.controller.clone());
            if round % 2 == 0 {
                let _ = tokio::join!(
                    tokio::spawn(async move { first.pause().await }),
                    tokio::spawn(async move { second.start().await }),
                );
            } else {
                let _ = tokio::join!(
                    tokio::spawn(async move { first.start().await }),
                    tokio::spawn(async move { second.pause().await }),
                );
            }

            let before = h.controller.snapshot().await;
            sleep_ms(2_000).await;
            let after = h.controller.snapshot().await;
            if before.running {
                assert!(after.remaining_secs < before.remaining_secs, "round {round}");
            } else {
                assert_eq!(after.remaining_secs, before.remaining_secs, "round {round}");
            }
        }
        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn empty_plan_is_rejected() {
        let services = PlaybackServices {
            cues: CueEngine::new(Arc::new(Tones::default()), false),
            recorder: SessionRecorder::spawn(Arc::new(Store::default())),
            identity: Arc::new(StaticIdentity::anonymous()),
            ledger: None,
        };
        let err = TimerController::new(plan(Vec::new()), services, Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(err.to_string().contains("no phases"));
    }
}
