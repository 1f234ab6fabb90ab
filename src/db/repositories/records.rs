use anyhow::Result;
use rusqlite::{params, Row};

use crate::{
    db::{
        connection::Database,
        helpers::{parse_datetime, to_optional_u16, to_timestamp, to_u16},
    },
    models::{SymptomRecord, VitalSignRecord},
};

fn row_to_vital_sign(row: &Row) -> Result<VitalSignRecord> {
    let captured_at: String = row.get("captured_at")?;

    Ok(VitalSignRecord {
        id: row.get("id")?,
        phase_name: row.get("phase_name")?,
        heart_rate: to_u16(row.get("heart_rate")?, "heart_rate")?,
        systolic: to_optional_u16(row.get("systolic")?, "systolic")?,
        diastolic: to_optional_u16(row.get("diastolic")?, "diastolic")?,
        target: row.get("target")?,
        comment: row.get("comment")?,
        captured_at: parse_datetime(&captured_at, "captured_at")?,
    })
}

fn row_to_symptom(row: &Row) -> Result<SymptomRecord> {
    let reported_at: String = row.get("reported_at")?;

    Ok(SymptomRecord {
        id: row.get("id")?,
        phase_name: row.get("phase_name")?,
        symptoms: row.get("symptoms")?,
        reported_at: parse_datetime(&reported_at, "reported_at")?,
    })
}

impl Database {
    /// Re-inserting a record with the same id is a no-op, so retries are safe.
    pub async fn insert_vital_sign(&self, session_id: &str, record: &VitalSignRecord) -> Result<()> {
        let session_id = session_id.to_string();
        let record = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO vital_signs
                    (id, session_id, phase_name, heart_rate, systolic, diastolic, target, comment, captured_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id,
                    session_id,
                    record.phase_name,
                    record.heart_rate,
                    record.systolic,
                    record.diastolic,
                    record.target,
                    record.comment,
                    to_timestamp(&record.captured_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn insert_symptom(&self, session_id: &str, record: &SymptomRecord) -> Result<()> {
        let session_id = session_id.to_string();
        let record = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO symptoms (id, session_id, phase_name, symptoms, reported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    session_id,
                    record.phase_name,
                    record.symptoms,
                    to_timestamp(&record.reported_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// In insertion order.
    pub async fn vital_signs_for_session(&self, session_id: &str) -> Result<Vec<VitalSignRecord>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, phase_name, heart_rate, systolic, diastolic, target, comment, captured_at
                 FROM vital_signs
                 WHERE session_id = ?1
                 ORDER BY rowid ASC",
            )?;

            let mut rows = stmt.query(params![session_id])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_vital_sign(row)?);
            }
            Ok(records)
        })
        .await
    }

    /// In insertion order.
    pub async fn symptoms_for_session(&self, session_id: &str) -> Result<Vec<SymptomRecord>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, phase_name, symptoms, reported_at
                 FROM symptoms
                 WHERE session_id = ?1
                 ORDER BY rowid ASC",
            )?;

            let mut rows = stmt.query(params![session_id])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_symptom(row)?);
            }
            Ok(records)
        })
        .await
    }
}
