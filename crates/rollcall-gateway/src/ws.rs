use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use rollcall_attendance::{BulkEntry, MarkAttendance};
use rollcall_core::{auth, metrics};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

use crate::messages::{ClientMessage, RoomEvent, ServerMessage};
use crate::rooms::RoomSet;
use crate::AppState;

#[derive(Deserialize)]
pub struct WsParams {
    token: Option<String>,
}

/// The credential is verified during the upgrade handshake. A connection
/// that cannot present a valid token never becomes a socket, so no
/// partially-authenticated session is observable anywhere downstream.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = params.token else {
        metrics::inc_auth_failure();
        return StatusCode::UNAUTHORIZED.into_response();
    };

    match auth::verify_token(&token, &state.jwt) {
        Ok(user_id) => {
            metrics::inc_auth_success();
            ws.on_upgrade(move |socket| handle_socket(state, user_id, socket))
                .into_response()
        }
        Err(err) => {
            metrics::inc_auth_failure();
            tracing::debug!(%err, "websocket handshake rejected");
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

async fn handle_socket(state: AppState, user_id: Uuid, socket: WebSocket) {
    metrics::inc_ws_connections();
    tracing::info!(user = %user_id, "session connected");

    let (mut sender, mut receiver) = socket.split();
    let mut broadcast_rx = state.realtime_tx.subscribe();
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    let mut rooms = RoomSet::new();

    // A reconnect is the one signal that pending mutations can be
    // delivered again: replay the queue exactly once per session instead
    // of polling. Clients may still issue explicit sync requests.
    replay_pending(&state, &mut sender, user_id).await;

    loop {
        tokio::select! {
            maybe_msg = receiver.next() => {
                let Some(msg) = maybe_msg else { break };
                match msg {
                    Ok(Message::Text(text)) => {
                        handle_text_message(&state, &mut sender, &mut rooms, user_id, text.to_string()).await;
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Ok(Message::Binary(_)) => {
                        let _ = send_msg(&mut sender, &ServerMessage::Error {
                            message: "unsupported: binary message".into(),
                        }).await;
                    }
                    Err(_) => break,
                }
            }
            recv = broadcast_rx.recv() => {
                match recv {
                    // Fan-out only to sessions joined to the event's room.
                    Ok(event) if rooms.contains(event.class_id) => {
                        if send_msg(&mut sender, &event.message).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(user = %user_id, skipped, "session lagged behind broadcast");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            // Long-lived sessions must close themselves on shutdown or the
            // server's graceful drain never completes.
            _ = shutdown_rx.recv() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    // Room membership dies with the connection; in-flight writes that
    // already reached the store stay committed.
    metrics::dec_ws_connections();
    tracing::info!(user = %user_id, "session disconnected");
}

async fn handle_text_message(
    state: &AppState,
    sender: &mut SplitSink<WebSocket, Message>,
    rooms: &mut RoomSet,
    user_id: Uuid,
    text: String,
) {
    let message: ClientMessage = match serde_json::from_str(&text) {
        Ok(message) => message,
        Err(err) => {
            let _ = send_msg(
                sender,
                &ServerMessage::Error {
                    message: format!("invalid message: {err}"),
                },
            )
            .await;
            return;
        }
    };

    match message {
        ClientMessage::JoinClass { class_id } => {
            rooms.join(class_id);
            let _ = send_msg(sender, &ServerMessage::Joined { class_id }).await;
        }
        ClientMessage::LeaveClass { class_id } => {
            rooms.leave(class_id);
            let _ = send_msg(sender, &ServerMessage::Left { class_id }).await;
        }
        ClientMessage::MarkAttendance {
            student_id,
            class_id,
            date,
            status,
        } => {
            let mark = MarkAttendance {
                student_id,
                class_id,
                date,
                status,
            };
            let ack = handle_mark(state, user_id, &mark).await;
            let _ = send_msg(sender, &ack).await;
        }
        ClientMessage::MarkBulk {
            class_id,
            date,
            entries,
        } => {
            let ack = handle_mark_bulk(state, user_id, class_id, date, &entries).await;
            let _ = send_msg(sender, &ack).await;
        }
        ClientMessage::SyncRequest { last_sync } => {
            handle_sync_request(state, sender, user_id, last_sync).await;
        }
    }
}

/// Applies one mark: upsert, snapshot write-through, room broadcast, then
/// an ack to the origin only. A transient upsert failure queues the
/// mutation for deferred sync instead of dropping it.
async fn handle_mark(state: &AppState, user_id: Uuid, mark: &MarkAttendance) -> ServerMessage {
    match state.attendance.mark(mark, user_id).await {
        Ok(record) => {
            metrics::inc_marks_applied(record.status.as_str());
            refresh_snapshot(state, record.class_id, record.date).await;

            let _ = state.realtime_tx.send(RoomEvent {
                class_id: record.class_id,
                message: ServerMessage::AttendanceUpdate { record },
            });
            metrics::inc_broadcasts();

            ServerMessage::MarkAck {
                success: true,
                message: None,
            }
        }
        Err(err) if err.is_retryable() => {
            metrics::inc_mark_failures("transient");
            let payload = json!({
                "student_id": mark.student_id,
                "class_id": mark.class_id,
                "date": mark.date,
                "status": mark.status,
            });
            let message = match state
                .sync
                .queue_for_sync(user_id, "mark_attendance", payload)
                .await
            {
                Ok(()) => format!("queued for retry: {err}"),
                Err(queue_err) => {
                    tracing::error!(%queue_err, "failed to queue mutation for sync");
                    format!("failed and could not be queued: {err}")
                }
            };
            ServerMessage::MarkAck {
                success: false,
                message: Some(message),
            }
        }
        Err(err) => {
            metrics::inc_mark_failures("rejected");
            ServerMessage::MarkAck {
                success: false,
                message: Some(err.to_string()),
            }
        }
    }
}

async fn handle_mark_bulk(
    state: &AppState,
    user_id: Uuid,
    class_id: Uuid,
    date: chrono::DateTime<Utc>,
    entries: &[BulkEntry],
) -> ServerMessage {
    let outcomes = state
        .attendance
        .mark_bulk(class_id, date, user_id, entries)
        .await;

    for outcome in outcomes.iter().filter(|outcome| outcome.ok) {
        if let Some(record) = &outcome.record {
            let _ = state.realtime_tx.send(RoomEvent {
                class_id,
                message: ServerMessage::AttendanceUpdate {
                    record: record.clone(),
                },
            });
            metrics::inc_broadcasts();
        }
    }
    if outcomes.iter().any(|outcome| outcome.ok) {
        refresh_snapshot(state, class_id, rollcall_attendance::normalize_day(date)).await;
    }

    ServerMessage::BulkAck { outcomes }
}

async fn replay_pending(
    state: &AppState,
    sender: &mut SplitSink<WebSocket, Message>,
    user_id: Uuid,
) {
    match state.sync.compute_delta(user_id).await {
        Ok(delta) if !delta.records.is_empty() => {
            handle_sync_request(state, sender, user_id, delta.last_sync).await;
        }
        Ok(_) => {}
        Err(err) => {
            tracing::warn!(user = %user_id, %err, "pending-queue check failed on connect");
        }
    }
}

/// Replays the user's queue: re-applies queued marks against the store
/// (the upsert dedupes redeliveries), returns the delta to the client,
/// then clears the queue and advances the watermark. Delivery and
/// watermark advance are coupled here because only this transport can
/// confirm the client received the delta; nothing is cleared if the send
/// fails. Marks that still fail transiently are re-enqueued with backoff
/// after the clear, or abandoned loudly once the ceiling is hit.
async fn handle_sync_request(
    state: &AppState,
    sender: &mut SplitSink<WebSocket, Message>,
    user_id: Uuid,
    client_last_sync: Option<chrono::DateTime<Utc>>,
) {
    tracing::debug!(user = %user_id, ?client_last_sync, "sync requested");

    let delta = match state.sync.compute_delta(user_id).await {
        Ok(delta) => delta,
        Err(err) => {
            let _ = send_msg(
                sender,
                &ServerMessage::Error {
                    message: format!("sync failed: {err}"),
                },
            )
            .await;
            return;
        }
    };

    let mut retry_later = Vec::new();
    let mut touched_days = HashSet::new();
    for item in &delta.records {
        if item.event != "mark_attendance" {
            continue;
        }
        let mark: MarkAttendance = match serde_json::from_value(item.payload.clone()) {
            Ok(mark) => mark,
            Err(err) => {
                tracing::warn!(user = %user_id, %err, "unreadable queued mutation");
                continue;
            }
        };
        match state.attendance.mark(&mark, user_id).await {
            Ok(record) => {
                metrics::inc_marks_applied(record.status.as_str());
                touched_days.insert((record.class_id, record.date));
                let _ = state.realtime_tx.send(RoomEvent {
                    class_id: record.class_id,
                    message: ServerMessage::AttendanceUpdate { record },
                });
                metrics::inc_broadcasts();
            }
            Err(err) if err.is_retryable() => {
                tracing::warn!(user = %user_id, %err, "queued mark still failing");
                retry_later.push(item.clone());
            }
            Err(err) => {
                metrics::inc_mark_failures("rejected");
                let _ = send_msg(
                    sender,
                    &ServerMessage::Error {
                        message: format!("queued mark rejected: {err}"),
                    },
                )
                .await;
            }
        }
    }
    for (class_id, day) in touched_days {
        refresh_snapshot(state, class_id, day).await;
    }

    let replayed = delta.records.len() as u64;
    let response = ServerMessage::SyncResponse {
        last_sync: Utc::now(),
        records: delta.records,
    };
    if send_msg(sender, &response).await.is_err() {
        // Queue stays intact; the next sync redelivers everything.
        return;
    }

    metrics::inc_sync_replayed(replayed);
    if let Err(err) = state.sync.mark_sync_complete(user_id).await {
        // The client has the data; the un-advanced watermark only means a
        // redundant redelivery, which the upsert downstream deduplicates.
        tracing::warn!(user = %user_id, %err, "failed to complete sync");
    }

    // Re-enqueue after the clear so the retries survive it. A crash in
    // this window loses the server-side retry entries, but not the data:
    // the client already holds every record from the sync_response above
    // and re-submits on its next sync.
    for item in retry_later {
        if let Err(err) = state.sync.schedule_retry(user_id, item).await {
            let _ = send_msg(
                sender,
                &ServerMessage::Error {
                    message: err.to_string(),
                },
            )
            .await;
        }
    }
}

/// Write-through of the day sheet. Cache failure is degraded service, not
/// a failed mark: the durable store already has the truth.
async fn refresh_snapshot(state: &AppState, class_id: Uuid, day: chrono::NaiveDate) {
    let sheet = match state.attendance.day_sheet(class_id, day).await {
        Ok(sheet) => sheet,
        Err(err) => {
            tracing::warn!(%class_id, %day, %err, "snapshot refresh read failed");
            return;
        }
    };
    let value = match serde_json::to_value(&sheet) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(%err, "snapshot serialization failed");
            return;
        }
    };
    if let Err(err) = state.cache.put_snapshot(day, class_id, &value).await {
        metrics::inc_cache_errors();
        tracing::warn!(%class_id, %day, %err, "snapshot write-through failed");
    }
}

async fn send_msg(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).unwrap_or_else(|_| {
        r#"{"type":"error","message":"internal serialization failure"}"#.to_string()
    });
    sender.send(Message::Text(text.into())).await
}
