use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "attendance_status", rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
        }
    }
}

/// One student's status for one class on one calendar day. The
/// (student_id, class_id, date) triple is unique in the store; repeated
/// marks replace the row in place.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub class_id: Uuid,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub updated_by: Uuid,
    pub updated_at: DateTime<Utc>,
}

/// Inbound mutation. `date` may carry any timezone offset; it is collapsed
/// to a UTC calendar day before touching the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkAttendance {
    pub student_id: Uuid,
    pub class_id: Uuid,
    pub date: DateTime<Utc>,
    pub status: AttendanceStatus,
}

/// Collapses a timestamp to its UTC calendar day. Two representations of
/// the same instant always resolve to the same day, so repeated marks never
/// collide on representation drift.
pub fn normalize_day(ts: DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentDayEntry {
    pub status: AttendanceStatus,
    pub updated_by: Uuid,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkEntry {
    pub student_id: Uuid,
    pub status: AttendanceStatus,
}

/// Per-record outcome of a bulk mark. Entries are independent; one failure
/// never rolls back or aborts the rest, and every failure is surfaced here
/// rather than swallowed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub student_id: Uuid,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<AttendanceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub student_id: Option<Uuid>,
    pub class_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// History row enriched with roster display names at read time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HistoryEntry {
    pub student_id: Uuid,
    pub class_id: Uuid,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub updated_at: DateTime<Utc>,
    pub student_name: String,
    pub student_roll_number: Option<String>,
    pub class_name: String,
    pub updated_by_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceStats {
    pub name: String,
    pub total_days: u64,
    pub present: u64,
    pub absent: u64,
    pub late: u64,
    pub attendance_percentage: f64,
}

impl AttendanceStats {
    /// Aggregates a scope's full history. Zero history yields a 0%
    /// percentage, not a division error: a freshly created class or
    /// student has no records yet.
    pub fn from_statuses(name: impl Into<String>, statuses: &[AttendanceStatus]) -> Self {
        let total_days = statuses.len() as u64;
        let present = statuses
            .iter()
            .filter(|s| **s == AttendanceStatus::Present)
            .count() as u64;
        let absent = statuses
            .iter()
            .filter(|s| **s == AttendanceStatus::Absent)
            .count() as u64;
        let late = statuses
            .iter()
            .filter(|s| **s == AttendanceStatus::Late)
            .count() as u64;

        let attendance_percentage = if total_days > 0 {
            (present + late) as f64 / total_days as f64 * 100.0
        } else {
            0.0
        };

        Self {
            name: name.into(),
            total_days,
            present,
            absent,
            late,
            attendance_percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_instant_normalizes_to_same_day() {
        let offset: DateTime<Utc> = "2024-03-05T23:59:00+05:30".parse().unwrap();
        let utc: DateTime<Utc> = "2024-03-05T00:00:00Z".parse().unwrap();
        assert_eq!(normalize_day(offset), normalize_day(utc));
        assert_eq!(
            normalize_day(offset),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
    }

    #[test]
    fn offset_that_crosses_midnight_lands_on_utc_day() {
        // 01:00 on the 6th at +05:30 is still the 5th in UTC.
        let ts: DateTime<Utc> = "2024-03-06T01:00:00+05:30".parse().unwrap();
        assert_eq!(
            normalize_day(ts),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
    }

    #[test]
    fn stats_with_no_history_are_zero_percent() {
        let stats = AttendanceStats::from_statuses("new student", &[]);
        assert_eq!(stats.total_days, 0);
        assert_eq!(stats.attendance_percentage, 0.0);
    }

    #[test]
    fn late_counts_toward_percentage() {
        let stats = AttendanceStats::from_statuses(
            "s",
            &[
                AttendanceStatus::Present,
                AttendanceStatus::Late,
                AttendanceStatus::Absent,
                AttendanceStatus::Absent,
            ],
        );
        assert_eq!(stats.total_days, 4);
        assert_eq!(stats.present, 1);
        assert_eq!(stats.late, 1);
        assert_eq!(stats.absent, 2);
        assert_eq!(stats.attendance_percentage, 50.0);
    }

    #[test]
    fn single_present_record_is_one_hundred_percent() {
        let stats = AttendanceStats::from_statuses("s", &[AttendanceStatus::Present]);
        assert_eq!(stats.total_days, 1);
        assert_eq!(stats.attendance_percentage, 100.0);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&AttendanceStatus::Late).unwrap(),
            "\"late\""
        );
        let parsed: AttendanceStatus = serde_json::from_str("\"present\"").unwrap();
        assert_eq!(parsed, AttendanceStatus::Present);
    }
}
