use chrono::{DateTime, Utc};
use rollcall_attendance::{AttendanceRecord, AttendanceStatus, BulkEntry, BulkOutcome};
use rollcall_sync::SyncQueueItem;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages a connected client may send. Inbound marks converge on the
/// same attendance contract whether they arrive live or replayed from an
/// offline queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinClass {
        class_id: Uuid,
    },
    LeaveClass {
        class_id: Uuid,
    },
    MarkAttendance {
        student_id: Uuid,
        class_id: Uuid,
        date: DateTime<Utc>,
        status: AttendanceStatus,
    },
    MarkBulk {
        class_id: Uuid,
        date: DateTime<Utc>,
        entries: Vec<BulkEntry>,
    },
    SyncRequest {
        last_sync: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Joined {
        class_id: Uuid,
    },
    Left {
        class_id: Uuid,
    },
    /// Fan-out of an applied mutation. `updated_by` and `updated_at` on
    /// the record are server-assigned; the server clock is authoritative
    /// for ordering.
    AttendanceUpdate {
        record: AttendanceRecord,
    },
    MarkAck {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    BulkAck {
        outcomes: Vec<BulkOutcome>,
    },
    SyncResponse {
        last_sync: DateTime<Utc>,
        records: Vec<SyncQueueItem>,
    },
    Error {
        message: String,
    },
}

/// Payload on the gateway-wide broadcast channel. Each session filters by
/// its own room membership at dispatch.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub class_id: Uuid,
    pub message: ServerMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_attendance_parses_from_wire_shape() {
        let raw = r#"{
            "type": "mark_attendance",
            "student_id": "7f8c5a46-32de-4ef3-8d73-d4df3de014a1",
            "class_id": "0d2a4f8e-9b1c-4f6a-a87d-2a5c6f64d111",
            "date": "2024-03-05T23:59:00+05:30",
            "status": "late"
        }"#;
        let parsed: ClientMessage = serde_json::from_str(raw).unwrap();
        match parsed {
            ClientMessage::MarkAttendance { status, date, .. } => {
                assert_eq!(status, AttendanceStatus::Late);
                // Offset input converts to UTC on parse.
                assert_eq!(date.to_rfc3339(), "2024-03-05T18:29:00+00:00");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn sync_request_allows_missing_watermark() {
        let parsed: ClientMessage =
            serde_json::from_str(r#"{ "type": "sync_request", "last_sync": null }"#).unwrap();
        assert!(matches!(
            parsed,
            ClientMessage::SyncRequest { last_sync: None }
        ));
    }

    #[test]
    fn ack_omits_empty_message() {
        let ack = ServerMessage::MarkAck {
            success: true,
            message: None,
        };
        let body = serde_json::to_string(&ack).unwrap();
        assert_eq!(body, r#"{"type":"mark_ack","success":true}"#);
    }
}
