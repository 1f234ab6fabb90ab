use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::{
    models::{SymptomRecord, VitalSignRecord},
    recorder::{SessionStore, SessionUpdate},
};

use super::connection::Database;

#[async_trait]
impl SessionStore for Database {
    async fn create_session(
        &self,
        user_id: &str,
        plan_slug: &str,
        plan_name: &str,
    ) -> Result<String> {
        self.insert_session(user_id, plan_slug, plan_name, Utc::now())
            .await
    }

    async fn insert_vital_sign(&self, session_id: &str, record: &VitalSignRecord) -> Result<()> {
        Database::insert_vital_sign(self, session_id, record).await
    }

    async fn insert_symptom(&self, session_id: &str, record: &SymptomRecord) -> Result<()> {
        Database::insert_symptom(self, session_id, record).await
    }

    async fn update_session(&self, session_id: &str, update: SessionUpdate) -> Result<()> {
        if update.completed {
            self.mark_session_completed(session_id, Utc::now()).await?;
        }
        Ok(())
    }
}
