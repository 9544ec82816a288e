use crate::models::*;
use chrono::{NaiveDate, Utc};
use rollcall_core::error::{Error, Result};
use sqlx::{Pool, Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use uuid::Uuid;

/// The single authorized reader/writer of attendance truth. Never retries
/// internally; transient failures bubble up to the sync coordinator.
#[derive(Clone)]
pub struct AttendanceService {
    pool: Pool<Postgres>,
}

impl AttendanceService {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Idempotent upsert of one attendance fact. A second call with the
    /// same triple replaces status/actor/timestamp in place; it never
    /// creates a second row.
    pub async fn mark(&self, mark: &MarkAttendance, actor: Uuid) -> Result<AttendanceRecord> {
        let day = normalize_day(mark.date);
        let record = sqlx::query_as::<_, AttendanceRecord>(
            r#"
            INSERT INTO attendance (student_id, class_id, date, status, updated_by, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (student_id, class_id, date) DO UPDATE SET
                status = excluded.status,
                updated_by = excluded.updated_by,
                updated_at = excluded.updated_at
            RETURNING id, student_id, class_id, date, status, updated_by, updated_at
            "#,
        )
        .bind(mark.student_id)
        .bind(mark.class_id)
        .bind(day)
        .bind(mark.status)
        .bind(actor)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(map_storage_err)?;

        tracing::debug!(
            student = %record.student_id,
            class = %record.class_id,
            date = %record.date,
            status = record.status.as_str(),
            "attendance marked"
        );
        Ok(record)
    }

    /// Applies `mark` once per entry. Entries are independent: a failed
    /// entry is reported in its outcome and the batch continues.
    pub async fn mark_bulk(
        &self,
        class_id: Uuid,
        date: chrono::DateTime<Utc>,
        actor: Uuid,
        entries: &[BulkEntry],
    ) -> Vec<BulkOutcome> {
        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            let mark = MarkAttendance {
                student_id: entry.student_id,
                class_id,
                date,
                status: entry.status,
            };
            match self.mark(&mark, actor).await {
                Ok(record) => outcomes.push(BulkOutcome {
                    student_id: entry.student_id,
                    ok: true,
                    record: Some(record),
                    error: None,
                }),
                Err(err) => {
                    tracing::warn!(student = %entry.student_id, %err, "bulk mark entry failed");
                    outcomes.push(BulkOutcome {
                        student_id: entry.student_id,
                        ok: false,
                        record: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }
        outcomes
    }

    /// Point read of one day's sheet for a class.
    pub async fn day_sheet(
        &self,
        class_id: Uuid,
        day: NaiveDate,
    ) -> Result<HashMap<Uuid, StudentDayEntry>> {
        let records = sqlx::query_as::<_, AttendanceRecord>(
            "SELECT id, student_id, class_id, date, status, updated_by, updated_at \
             FROM attendance WHERE class_id = $1 AND date = $2",
        )
        .bind(class_id)
        .bind(day)
        .fetch_all(&self.pool)
        .await
        .map_err(map_storage_err)?;

        Ok(records
            .into_iter()
            .map(|record| {
                (
                    record.student_id,
                    StudentDayEntry {
                        status: record.status,
                        updated_by: record.updated_by,
                        updated_at: record.updated_at,
                    },
                )
            })
            .collect())
    }

    /// History rows, date ascending, enriched with roster names. The
    /// filter must scope by student and/or class.
    pub async fn history(&self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>> {
        if filter.student_id.is_none() && filter.class_id.is_none() {
            return Err(Error::Validation(
                "history filter needs a student or a class".into(),
            ));
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT a.student_id, a.class_id, a.date, a.status, a.updated_at, \
                    s.name AS student_name, s.roll_number AS student_roll_number, \
                    c.name AS class_name, actor.name AS updated_by_name \
             FROM attendance a \
             JOIN users s ON s.id = a.student_id \
             JOIN classes c ON c.id = a.class_id \
             JOIN users actor ON actor.id = a.updated_by \
             WHERE TRUE",
        );
        if let Some(student_id) = filter.student_id {
            builder.push(" AND a.student_id = ");
            builder.push_bind(student_id);
        }
        if let Some(class_id) = filter.class_id {
            builder.push(" AND a.class_id = ");
            builder.push_bind(class_id);
        }
        if let Some(from) = filter.from {
            builder.push(" AND a.date >= ");
            builder.push_bind(from);
        }
        if let Some(to) = filter.to {
            builder.push(" AND a.date <= ");
            builder.push_bind(to);
        }
        builder.push(" ORDER BY a.date ASC");

        builder
            .build_query_as::<HistoryEntry>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_storage_err)
    }

    /// Aggregate over a student's full history, across all classes.
    pub async fn student_stats(&self, student_id: Uuid) -> Result<AttendanceStats> {
        let name = self.user_name(student_id).await?;
        let statuses = self.statuses(Some(student_id), None).await?;
        Ok(AttendanceStats::from_statuses(name, &statuses))
    }

    /// One stats row per enrolled student, zero-history students included.
    pub async fn class_stats(&self, class_id: Uuid) -> Result<Vec<AttendanceStats>> {
        let exists = sqlx::query("SELECT 1 FROM classes WHERE id = $1")
            .bind(class_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_storage_err)?;
        if exists.is_none() {
            return Err(Error::NotFound(format!("class {class_id}")));
        }

        let roster = sqlx::query(
            "SELECT u.id, u.name FROM users u \
             JOIN class_members m ON m.student_id = u.id \
             WHERE m.class_id = $1 ORDER BY u.name",
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_storage_err)?;

        let mut stats = Vec::with_capacity(roster.len());
        for row in roster {
            let student_id: Uuid = row.try_get("id").map_err(map_storage_err)?;
            let name: String = row.try_get("name").map_err(map_storage_err)?;
            let statuses = self.statuses(Some(student_id), Some(class_id)).await?;
            stats.push(AttendanceStats::from_statuses(name, &statuses));
        }
        Ok(stats)
    }

    async fn user_name(&self, user_id: Uuid) -> Result<String> {
        let row = sqlx::query("SELECT name FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_storage_err)?;
        match row {
            Some(row) => row.try_get("name").map_err(map_storage_err),
            None => Err(Error::NotFound(format!("student {user_id}"))),
        }
    }

    async fn statuses(
        &self,
        student_id: Option<Uuid>,
        class_id: Option<Uuid>,
    ) -> Result<Vec<AttendanceStatus>> {
        let mut builder =
            QueryBuilder::<Postgres>::new("SELECT status FROM attendance WHERE TRUE");
        if let Some(student_id) = student_id {
            builder.push(" AND student_id = ");
            builder.push_bind(student_id);
        }
        if let Some(class_id) = class_id {
            builder.push(" AND class_id = ");
            builder.push_bind(class_id);
        }

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_storage_err)?;
        rows.iter()
            .map(|row| row.try_get("status").map_err(map_storage_err))
            .collect()
    }
}

/// Foreign-key violations mean the caller referenced a student, class or
/// actor that does not exist; connection-level failures are transient and
/// eligible for the coordinator's retry path.
fn map_storage_err(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23503") => {
            Error::NotFound("unknown student, class, or actor".into())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => Error::Transient(err.to_string()),
        _ => Error::Storage(err),
    }
}
