use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::Row;

use crate::db::{connection::Database, models::WeeklyVitalsRow};

// Weeks are keyed by their Monday: 'weekday 0' moves forward to Sunday
// (or stays on it), then six days back.
const WEEKLY_REPORT_SQL: &str = "
WITH vitals AS (
    SELECT s.user_id,
           date(v.captured_at, 'weekday 0', '-6 days') AS week_start,
           v.heart_rate,
           v.systolic,
           v.diastolic
    FROM vital_signs v
    JOIN sessions s ON s.id = v.session_id
),
hr AS (
    SELECT user_id,
           week_start,
           AVG(heart_rate) AS avg_bpm,
           AVG(systolic) AS avg_sys,
           AVG(diastolic) AS avg_dia,
           COUNT(heart_rate) AS n_hr,
           SUM(CASE WHEN systolic IS NOT NULL OR diastolic IS NOT NULL THEN 1 ELSE 0 END) AS n_bp
    FROM vitals
    GROUP BY user_id, week_start
),
sos AS (
    SELECT s.user_id,
           date(y.reported_at, 'weekday 0', '-6 days') AS week_start,
           COUNT(*) AS sos_count
    FROM symptoms y
    JOIN sessions s ON s.id = y.session_id
    GROUP BY s.user_id, week_start
),
weeks AS (
    SELECT user_id, week_start FROM hr
    UNION
    SELECT user_id, week_start FROM sos
)
SELECT w.user_id,
       w.week_start,
       hr.avg_bpm,
       hr.avg_sys,
       hr.avg_dia,
       COALESCE(hr.n_hr, 0) AS n_hr,
       COALESCE(hr.n_bp, 0) AS n_bp,
       COALESCE(sos.sos_count, 0) AS sos_count
FROM weeks w
LEFT JOIN hr ON hr.user_id = w.user_id AND hr.week_start = w.week_start
LEFT JOIN sos ON sos.user_id = w.user_id AND sos.week_start = w.week_start
ORDER BY w.week_start DESC, w.user_id ASC
";

fn row_to_weekly(row: &Row) -> Result<WeeklyVitalsRow> {
    let week_start: String = row.get("week_start")?;

    Ok(WeeklyVitalsRow {
        user_id: row.get("user_id")?,
        week_start: NaiveDate::parse_from_str(&week_start, "%Y-%m-%d")
            .with_context(|| format!("failed to parse week_start {week_start}"))?,
        avg_bpm: row.get("avg_bpm")?,
        avg_sys: row.get("avg_sys")?,
        avg_dia: row.get("avg_dia")?,
        n_hr: row.get("n_hr")?,
        n_bp: row.get("n_bp")?,
        sos_count: row.get("sos_count")?,
    })
}

impl Database {
    /// Newest week first.
    pub async fn weekly_report(&self) -> Result<Vec<WeeklyVitalsRow>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(WEEKLY_REPORT_SQL)?;
            let mut rows = stmt.query([])?;
            let mut report = Vec::new();
            while let Some(row) = rows.next()? {
                report.push(row_to_weekly(row)?);
            }
            Ok(report)
        })
        .await
    }
}
