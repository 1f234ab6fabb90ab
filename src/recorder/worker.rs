use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex},
};

use tokio::sync::{mpsc, oneshot};

use crate::models::{SymptomRecord, VitalSignRecord};

use super::{lock_log, RecordLog, SessionSlot, SessionStore, SessionUpdate};

// Set to false to silence persistence chatter from this worker.
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub(crate) enum RecorderJob {
    Open {
        attempt: u64,
        user_id: String,
        plan_slug: String,
        plan_name: String,
    },
    AppendVitalSign {
        attempt: u64,
        record: VitalSignRecord,
    },
    AppendSymptom {
        attempt: u64,
        record: SymptomRecord,
    },
    Complete {
        attempt: u64,
    },
    Flush(oneshot::Sender<()>),
}

/// A record accepted for a session but not yet confirmed by the store.
enum PendingWrite {
    VitalSign(VitalSignRecord),
    Symptom(SymptomRecord),
}

impl PendingWrite {
    fn id(&self) -> &str {
        match self {
            PendingWrite::VitalSign(record) => &record.id,
            PendingWrite::Symptom(record) => &record.id,
        }
    }
}

struct Queued {
    attempt: u64,
    session_id: String,
    write: PendingWrite,
}

/// Drains recorder jobs one at a time. Writes for a session go to the store
/// strictly in submission order: once one fails, everything after it for
/// that session waits in the backlog and the failed record is retried first.
pub(crate) struct RecorderWorker {
    store: Arc<dyn SessionStore>,
    log: Arc<Mutex<RecordLog>>,
    /// Session opened for the given attempt.
    session: Option<(u64, String)>,
    backlog: VecDeque<Queued>,
}

impl RecorderWorker {
    pub fn new(store: Arc<dyn SessionStore>, log: Arc<Mutex<RecordLog>>) -> Self {
        Self {
            store,
            log,
            session: None,
            backlog: VecDeque::new(),
        }
    }

    pub async fn run(mut self, mut jobs: mpsc::UnboundedReceiver<RecorderJob>) {
        while let Some(job) = jobs.recv().await {
            match job {
                RecorderJob::Open {
                    attempt,
                    user_id,
                    plan_slug,
                    plan_name,
                } => self.open(attempt, &user_id, &plan_slug, &plan_name).await,
                RecorderJob::AppendVitalSign { attempt, record } => {
                    self.enqueue(attempt, PendingWrite::VitalSign(record)).await
                }
                RecorderJob::AppendSymptom { attempt, record } => {
                    self.enqueue(attempt, PendingWrite::Symptom(record)).await
                }
                RecorderJob::Complete { attempt } => self.complete(attempt).await,
                RecorderJob::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        if !self.backlog.is_empty() {
            log_warn!(
                "recorder worker stopped with {} record(s) never stored",
                self.backlog.len()
            );
        }
        log_debug!("recorder worker stopped");
    }

    fn session_for(&self, attempt: u64) -> Option<String> {
        match &self.session {
            Some((owner, id)) if *owner == attempt => Some(id.clone()),
            _ => None,
        }
    }

    async fn open(&mut self, attempt: u64, user_id: &str, plan_slug: &str, plan_name: &str) {
        let slot = match self.store.create_session(user_id, plan_slug, plan_name).await {
            Ok(id) => {
                log_info!("opened session {id} for plan {plan_slug}");
                self.session = Some((attempt, id.clone()));
                SessionSlot::Open(id)
            }
            Err(err) => {
                log_warn!("could not open session for plan {plan_slug}, continuing without persistence: {err:#}");
                SessionSlot::Unavailable
            }
        };

        let mut log = lock_log(&self.log);
        if log.attempt == attempt {
            log.session = slot;
        }
    }

    async fn enqueue(&mut self, attempt: u64, write: PendingWrite) {
        let Some(session_id) = self.session_for(attempt) else {
            log_debug!("no session; record {} kept in memory only", write.id());
            return;
        };

        self.backlog.push_back(Queued {
            attempt,
            session_id,
            write,
        });
        self.drain().await;
    }

    /// Sends backlog entries in order. A failure blocks the rest of that
    /// session's entries until the next drain; other sessions carry on.
    async fn drain(&mut self) {
        let mut blocked: HashSet<String> = HashSet::new();
        let mut waiting = VecDeque::with_capacity(self.backlog.len());

        while let Some(queued) = self.backlog.pop_front() {
            if blocked.contains(&queued.session_id) {
                waiting.push_back(queued);
                continue;
            }

            let result = match &queued.write {
                PendingWrite::VitalSign(record) => {
                    self.store.insert_vital_sign(&queued.session_id, record).await
                }
                PendingWrite::Symptom(record) => {
                    self.store.insert_symptom(&queued.session_id, record).await
                }
            };

            match result {
                Ok(()) => self.mark_persisted(&queued),
                Err(err) => {
                    log_warn!(
                        "record {} for session {} not persisted yet: {err:#}",
                        queued.write.id(),
                        queued.session_id
                    );
                    blocked.insert(queued.session_id.clone());
                    waiting.push_back(queued);
                }
            }
        }

        self.backlog = waiting;
    }

    async fn complete(&mut self, attempt: u64) {
        let Some(session_id) = self.session_for(attempt) else {
            log_debug!("no session to complete for attempt {attempt}");
            return;
        };

        match self
            .store
            .update_session(&session_id, SessionUpdate { completed: true })
            .await
        {
            Ok(()) => log_info!("session {session_id} completed"),
            Err(err) => log_warn!("failed to mark session {session_id} complete: {err:#}"),
        }

        let pending = self.pending_for(&session_id);
        if pending == 0 {
            return;
        }
        log_info!("retrying {pending} record(s) for session {session_id}");
        self.drain().await;

        let remaining = self.pending_for(&session_id);
        if remaining > 0 {
            log_warn!("{remaining} record(s) of session {session_id} remain unsaved");
        }
    }

    fn pending_for(&self, session_id: &str) -> usize {
        self.backlog
            .iter()
            .filter(|queued| queued.session_id == session_id)
            .count()
    }

    fn mark_persisted(&self, queued: &Queued) {
        let mut log = lock_log(&self.log);
        if log.attempt != queued.attempt {
            return;
        }
        let record_id = queued.write.id();
        match queued.write {
            PendingWrite::VitalSign(_) => {
                if let Some(entry) = log
                    .vital_signs
                    .iter_mut()
                    .find(|entry| entry.record.id == record_id)
                {
                    entry.persisted = true;
                }
            }
            PendingWrite::Symptom(_) => {
                if let Some(entry) = log
                    .symptoms
                    .iter_mut()
                    .find(|entry| entry.record.id == record_id)
                {
                    entry.persisted = true;
                }
            }
        }
    }
}
