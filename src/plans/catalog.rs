use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};

use super::Plan;

const BUILTIN_PLANS: &str = include_str!("catalog.json");

/// Set of validated plans addressable by slug.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_PLANS).context("built-in plan catalog is invalid")
    }

    /// Accepts either a single plan object or an array of plans.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(raw).context("failed to parse plan JSON")?;
        let plans: Vec<Plan> = if value.is_array() {
            serde_json::from_value(value)?
        } else {
            vec![serde_json::from_value(value)?]
        };

        for plan in &plans {
            plan.validate()?;
        }

        Ok(Self { plans })
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read plans from {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid plan file {}", path.display()))
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }

    pub fn find(&self, slug: &str) -> Option<&Plan> {
        self.plans.iter().find(|plan| plan.id == slug)
    }

    /// Resolves `selector` as a slug first, then as a path to a plan file.
    pub fn resolve(&self, selector: &str) -> Result<Plan> {
        if let Some(plan) = self.find(selector) {
            return Ok(plan.clone());
        }

        let path = Path::new(selector);
        if path.exists() {
            let loaded = Self::load_file(path)?;
            return loaded
                .plans
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("plan file {} is empty", path.display()));
        }

        Err(anyhow!("unknown plan '{selector}'"))
    }
}
