//! Attendance domain service. The sole writer of attendance truth: every
//! mutation converges on one idempotent upsert keyed by
//! (student, class, day).

pub mod models;
pub mod service;

pub use models::{
    normalize_day, AttendanceRecord, AttendanceStats, AttendanceStatus, BulkEntry, BulkOutcome,
    HistoryEntry, HistoryFilter, MarkAttendance, StudentDayEntry,
};
pub use service::AttendanceService;
