//! Exercise plans: the static, ordered phase sequences a patient plays through.
//!
//! Plans are plain data. They are loaded from the embedded catalog or from a
//! JSON file and validated once; the sequencer assumes a validated plan.

pub mod catalog;
pub mod classify;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

pub use catalog::PlanCatalog;
pub use classify::{classify_phase, PhaseRole};

/// Recommended rated-perceived-exertion band on the 0-10 scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpeRange {
    pub min: u8,
    pub max: u8,
}

impl Default for RpeRange {
    fn default() -> Self {
        Self { min: 2, max: 4 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    pub name: String,
    /// Whole seconds, always > 0.
    pub duration: u32,
    pub intensity: String,
    #[serde(default)]
    pub hr_target: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub beep_interval: Option<u32>,
    #[serde(default)]
    pub beep_action: Option<String>,
}

impl Phase {
    /// Heart-rate target, treating blank text as absent.
    pub fn heart_rate_target(&self) -> Option<&str> {
        self.hr_target
            .as_deref()
            .map(str::trim)
            .filter(|target| !target.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Stable slug, stored with every session.
    pub id: String,
    pub name: String,
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub intro: String,
    #[serde(default)]
    pub hr_range: String,
    #[serde(default)]
    pub rest_message: Option<String>,
    #[serde(default)]
    pub rpe: Option<RpeRange>,
}

impl Plan {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("plan id is required");
        }
        if self.phases.is_empty() {
            bail!("plan '{}' has no phases", self.id);
        }
        for (index, phase) in self.phases.iter().enumerate() {
            if phase.duration == 0 {
                bail!(
                    "plan '{}' phase {} ('{}') must last at least one second",
                    self.id,
                    index,
                    phase.name
                );
            }
            if phase.beep_interval == Some(0) {
                bail!(
                    "plan '{}' phase {} ('{}') has a zero beep interval",
                    self.id,
                    index,
                    phase.name
                );
            }
        }
        if let Some(rpe) = self.rpe {
            if rpe.min > rpe.max || rpe.max > 10 {
                bail!("plan '{}' has an invalid RPE range {}-{}", self.id, rpe.min, rpe.max);
            }
        }
        Ok(())
    }

    pub fn total_secs(&self) -> u64 {
        self.phases.iter().map(|phase| u64::from(phase.duration)).sum()
    }

    /// Seconds covered by every phase before `index`.
    pub fn secs_before(&self, index: usize) -> u64 {
        self.phases
            .iter()
            .take(index)
            .map(|phase| u64::from(phase.duration))
            .sum()
    }

    pub fn last_index(&self) -> usize {
        self.phases.len().saturating_sub(1)
    }
}
