//! Days on which a plan was played to the end, kept on the device so the
//! calendar works even when the session store is unreachable.

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{Context, Result};
use chrono::{Datelike, Days, NaiveDate};
use log::warn;
use serde::{Deserialize, Serialize};

pub const LEDGER_KEY: &str = "bolita-completed-days";

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(rename = "bolita-completed-days", default)]
    completed_days: BTreeSet<NaiveDate>,
}

pub struct LocalCompletionLedger {
    path: PathBuf,
    data: Mutex<LedgerFile>,
    /// Serializes file writes; each writer saves the set as of its turn.
    write_lock: Mutex<()>,
}

impl LocalCompletionLedger {
    pub fn open(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read ledger from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring malformed ledger at {}: {err}", path.display());
                LedgerFile::default()
            })
        } else {
            LedgerFile::default()
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `false` if the day was already marked.
    pub fn mark_completed(&self, day: NaiveDate) -> Result<bool> {
        if !self.lock().completed_days.insert(day) {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Marks the day in memory now and writes the file on the blocking pool.
    /// Returns `false` if the day was already marked.
    pub fn mark_completed_in_background(self: &Arc<Self>, day: NaiveDate) -> bool {
        if !self.lock().completed_days.insert(day) {
            return false;
        }
        let ledger = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            if let Err(err) = ledger.persist() {
                warn!("Failed to record completed day {day}: {err:#}");
            }
        });
        true
    }

    pub fn is_completed(&self, day: NaiveDate) -> bool {
        self.lock().completed_days.contains(&day)
    }

    /// Completed days in the Monday to Sunday week containing `day`.
    pub fn completed_in_week(&self, day: NaiveDate) -> usize {
        let offset = u64::from(day.weekday().num_days_from_monday());
        let Some(monday) = day.checked_sub_days(Days::new(offset)) else {
            return 0;
        };
        let Some(sunday) = monday.checked_add_days(Days::new(6)) else {
            return 0;
        };
        self.lock().completed_days.range(monday..=sunday).count()
    }

    pub fn days(&self) -> Vec<NaiveDate> {
        self.lock().completed_days.iter().copied().collect()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerFile> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self) -> Result<()> {
        let _writing = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let serialized = serde_json::to_string_pretty(&*self.lock())?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        // Readers only ever see a complete file.
        let staged = self.path.with_extension("json.tmp");
        fs::write(&staged, serialized)
            .with_context(|| format!("Failed to write ledger to {}", staged.display()))?;
        fs::rename(&staged, &self.path)
            .with_context(|| format!("Failed to replace ledger at {}", self.path.display()))
    }
}
