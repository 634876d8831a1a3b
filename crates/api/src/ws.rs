//! WebSocket log streaming.
//!
//! One socket per job subscription: the client receives every persisted
//! entry in sequence order, then live entries as they are published. A
//! client disconnecting only ends its own subscription; job execution is
//! unaffected.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use netfleet_core::types::DbId;
use netfleet_events::LogFanout;

use crate::error::AppResult;
use crate::routes::jobs::find_job;
use crate::state::AppState;
use crate::tenant::Tenant;

/// GET /api/v1/jobs/{id}/logs/stream
///
/// Upgrade to a WebSocket carrying the job's log entries as JSON text
/// frames.
pub async fn job_log_stream(
    ws: WebSocketUpgrade,
    Tenant(tenant_id): Tenant,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    // Tenant scope check before the upgrade; the socket itself carries no
    // further authorization.
    find_job(&state, tenant_id, job_id).await?;

    let fanout = Arc::clone(&state.fanout);
    Ok(ws.on_upgrade(move |socket| stream_logs(socket, fanout, job_id)))
}

async fn stream_logs(mut socket: WebSocket, fanout: Arc<LogFanout>, job_id: DbId) {
    let mut subscription = match fanout.subscribe(job_id).await {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::warn!(job_id, error = %e, "Log subscription failed");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    loop {
        tokio::select! {
            entry = subscription.next() => match entry {
                Some(entry) => {
                    let frame = match serde_json::to_string(&entry) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!(job_id, error = %e, "Log entry serialization failed");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        // Client went away; execution is unaffected.
                        break;
                    }
                }
                None => {
                    // Job finished and its channel was retired.
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(_)) => break,
                // Pings are answered by axum; ignore client chatter.
                Some(Ok(_)) => {}
            }
        }
    }
}
