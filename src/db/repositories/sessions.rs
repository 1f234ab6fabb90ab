use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime, to_timestamp},
    models::SessionRow,
};

const SESSION_COLUMNS: &str =
    "id, user_id, plan_slug, plan_name, started_at, completed, completed_at, created_at, updated_at";

fn row_to_session(row: &Row) -> Result<SessionRow> {
    let started_at: String = row.get("started_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(SessionRow {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        plan_slug: row.get("plan_slug")?,
        plan_name: row.get("plan_name")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        completed: row.get::<_, i64>("completed")? != 0,
        completed_at: parse_optional_datetime(completed_at, "completed_at")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    /// Inserts a fresh, not yet completed session and returns its id.
    pub async fn insert_session(
        &self,
        user_id: &str,
        plan_slug: &str,
        plan_name: &str,
        started_at: DateTime<Utc>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let record = (
            id.clone(),
            user_id.to_string(),
            plan_slug.to_string(),
            plan_name.to_string(),
        );
        self.execute(move |conn| {
            let (id, user_id, plan_slug, plan_name) = record;
            let started = to_timestamp(&started_at);
            conn.execute(
                "INSERT INTO sessions (id, user_id, plan_slug, plan_name, started_at, completed, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?5, ?5)",
                params![id, user_id, plan_slug, plan_name, started],
            )?;
            Ok(())
        })
        .await?;
        Ok(id)
    }

    pub async fn mark_session_completed(
        &self,
        session_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let finished = to_timestamp(&completed_at);
            let rows_affected = conn.execute(
                "UPDATE sessions
                 SET completed = 1,
                     completed_at = COALESCE(completed_at, ?1),
                     updated_at = ?1
                 WHERE id = ?2",
                params![finished, session_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("Session not found"));
            }
            Ok(())
        })
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionRow>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;

            let session = stmt
                .query_row(params![session_id], |row| Ok(row_to_session(row)))
                .optional()?
                .transpose()?;

            Ok(session)
        })
        .await
    }

    /// Most recent first.
    pub async fn list_sessions_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SessionRow>> {
        let user_id = user_id.to_string();
        let limit = limit as i64;
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE user_id = ?1
                 ORDER BY started_at DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;

            let mut rows = stmt.query(params![user_id, limit])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }

            Ok(sessions)
        })
        .await
    }
}
