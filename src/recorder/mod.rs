//! Session recorder: the only path from playback to persistent storage.
//!
//! Every record lands in an in-memory buffer first (what the UI shows), then
//! a single background worker pushes it to the `SessionStore` in submission
//! order. Store failures become warnings; records that never made it are
//! retried once more when the session completes.

mod worker;

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::models::{SymptomRecord, VitalSignRecord};

use worker::{RecorderJob, RecorderWorker};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    pub completed: bool,
}

/// Backend that owns sessions and their records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the id of the newly created session.
    async fn create_session(&self, user_id: &str, plan_slug: &str, plan_name: &str)
        -> Result<String>;

    async fn insert_vital_sign(&self, session_id: &str, record: &VitalSignRecord) -> Result<()>;

    async fn insert_symptom(&self, session_id: &str, record: &SymptomRecord) -> Result<()>;

    async fn update_session(&self, session_id: &str, update: SessionUpdate) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionSlot {
    Absent,
    Opening,
    Open(String),
    Unavailable,
}

#[derive(Debug, Clone)]
pub(crate) struct Buffered<T> {
    pub record: T,
    pub persisted: bool,
}

impl<T> Buffered<T> {
    fn new(record: T) -> Self {
        Self {
            record,
            persisted: false,
        }
    }
}

#[derive(Debug)]
pub(crate) struct RecordLog {
    pub attempt: u64,
    pub session: SessionSlot,
    pub completed: bool,
    pub vital_signs: Vec<Buffered<VitalSignRecord>>,
    pub symptoms: Vec<Buffered<SymptomRecord>>,
}

impl RecordLog {
    fn new() -> Self {
        Self {
            attempt: 0,
            session: SessionSlot::Absent,
            completed: false,
            vital_signs: Vec::new(),
            symptoms: Vec::new(),
        }
    }

    pub fn unflushed(&self) -> usize {
        self.vital_signs.iter().filter(|entry| !entry.persisted).count()
            + self.symptoms.iter().filter(|entry| !entry.persisted).count()
    }
}

/// Read-only copy of the buffer for rendering.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecorderView {
    pub session_id: Option<String>,
    pub vital_signs: Vec<VitalSignRecord>,
    pub symptoms: Vec<SymptomRecord>,
    pub unflushed: usize,
}

pub(crate) fn lock_log(log: &Mutex<RecordLog>) -> MutexGuard<'_, RecordLog> {
    log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone)]
pub struct SessionRecorder {
    jobs: mpsc::UnboundedSender<RecorderJob>,
    log: Arc<Mutex<RecordLog>>,
}

impl SessionRecorder {
    /// Starts the persistence worker on the current tokio runtime.
    pub fn spawn(store: Arc<dyn SessionStore>) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let log = Arc::new(Mutex::new(RecordLog::new()));

        tokio::spawn(RecorderWorker::new(store, log.clone()).run(rx));

        Self { jobs, log }
    }

    /// Asks the store for a new session. Returns `false` when this attempt
    /// already opened (or tried to open) one.
    pub fn open_session(&self, user_id: &str, plan_slug: &str, plan_name: &str) -> bool {
        let attempt = {
            let mut log = lock_log(&self.log);
            if log.session != SessionSlot::Absent {
                return false;
            }
            log.session = SessionSlot::Opening;
            log.attempt
        };

        self.submit(RecorderJob::Open {
            attempt,
            user_id: user_id.to_string(),
            plan_slug: plan_slug.to_string(),
            plan_name: plan_name.to_string(),
        });
        true
    }

    pub fn append_vital_sign(&self, record: VitalSignRecord) {
        let attempt = {
            let mut log = lock_log(&self.log);
            log.vital_signs.push(Buffered::new(record.clone()));
            log.attempt
        };
        self.submit(RecorderJob::AppendVitalSign { attempt, record });
    }

    pub fn append_symptom(&self, record: SymptomRecord) {
        let attempt = {
            let mut log = lock_log(&self.log);
            log.symptoms.push(Buffered::new(record.clone()));
            log.attempt
        };
        self.submit(RecorderJob::AppendSymptom { attempt, record });
    }

    /// Marks the session complete, at most once per attempt.
    pub fn complete_session(&self) -> bool {
        let attempt = {
            let mut log = lock_log(&self.log);
            if log.completed {
                return false;
            }
            log.completed = true;
            log.attempt
        };
        self.submit(RecorderJob::Complete { attempt });
        true
    }

    /// Forgets the current session and clears the displayed records. Records
    /// already handed to the worker are still written.
    pub fn begin_new_attempt(&self) {
        let mut log = lock_log(&self.log);
        let unflushed = log.unflushed();
        if unflushed > 0 {
            debug!(
                "starting a new attempt with {unflushed} record(s) of attempt {} not yet confirmed",
                log.attempt
            );
        }
        log.attempt += 1;
        log.session = SessionSlot::Absent;
        log.completed = false;
        log.vital_signs.clear();
        log.symptoms.clear();
    }

    pub fn session_id(&self) -> Option<String> {
        match &lock_log(&self.log).session {
            SessionSlot::Open(id) => Some(id.clone()),
            _ => None,
        }
    }

    pub fn view(&self) -> RecorderView {
        let log = lock_log(&self.log);
        RecorderView {
            session_id: match &log.session {
                SessionSlot::Open(id) => Some(id.clone()),
                _ => None,
            },
            vital_signs: log.vital_signs.iter().map(|e| e.record.clone()).collect(),
            symptoms: log.symptoms.iter().map(|e| e.record.clone()).collect(),
            unflushed: log.unflushed(),
        }
    }

    /// Resolves once every job submitted so far has been handled.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.jobs.send(RecorderJob::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    fn submit(&self, job: RecorderJob) {
        if self.jobs.send(job).is_err() {
            debug!("recorder worker is gone; record kept in memory only");
        }
    }
}
