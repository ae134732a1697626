//! LISTEN/NOTIFY change notifications from the event store.

use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::Value;
use sqlx::postgres::{PgListener, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::messaging::topics;

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// A decoded change notification
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    ProcessingStateChanged { event_id: Uuid, processing_state: i32 },
    NewEventInsert { event_id: Uuid, processing_state: i32 },
    NewHistoryInsert { event_id: Uuid },
}

#[derive(Deserialize)]
struct EventPayload {
    event_id: Uuid,
    processing_state: i32,
}

#[derive(Deserialize)]
struct HistoryPayload {
    event_id: Uuid,
}

impl Notification {
    /// Decodes a channel and its payload. Unknown channels, undecodable JSON
    /// and payloads missing a required key are rejected.
    pub fn decode(channel: &str, payload: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| format!("malformed payload {:?}: {}", payload, e))?;

        match channel {
            topics::PROCESSING_STATE_CHANGED | topics::NEW_EVENT_INSERT => {
                let p: EventPayload = serde_json::from_value(value)
                    .map_err(|e| format!("no payload or malformed {:?}: {}", payload, e))?;
                Ok(if channel == topics::PROCESSING_STATE_CHANGED {
                    Notification::ProcessingStateChanged {
                        event_id: p.event_id,
                        processing_state: p.processing_state,
                    }
                } else {
                    Notification::NewEventInsert {
                        event_id: p.event_id,
                        processing_state: p.processing_state,
                    }
                })
            }
            topics::NEW_HISTORY_INSERT => {
                let p: HistoryPayload = serde_json::from_value(value)
                    .map_err(|e| format!("no payload or malformed {:?}: {}", payload, e))?;
                Ok(Notification::NewHistoryInsert { event_id: p.event_id })
            }
            other => Err(format!("unexpected channel {}", other)),
        }
    }
}

/// Receives every decoded notification
pub type NotificationCallback = Arc<dyn Fn(Notification) + Send + Sync>;

/// Spawns the listener loop on a dedicated connection. The loop reconnects
/// with a doubling delay and stops when `cancel` fires.
pub fn spawn_listener(pool: PgPool, cancel: CancellationToken, callback: NotificationCallback) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut listener_option: Option<PgListener> = None;
        let mut reconnect_delay = Duration::from_secs(1);

        loop {
            let listener = match listener_option {
                Some(ref mut l) => l,
                None => match connect(&pool).await {
                    Ok(l) => {
                        reconnect_delay = Duration::from_secs(1);
                        listener_option.insert(l)
                    }
                    Err(e) => {
                        error!("Database notification listener error: {}", e);
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = sleep(reconnect_delay) => {}
                        }
                        reconnect_delay = (reconnect_delay * 2).min(MAX_RECONNECT_DELAY);
                        continue;
                    }
                },
            };

            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = listener.recv() => received,
            };

            match received {
                Ok(notification) => {
                    info!("DB Notification: {}", notification.channel());
                    match Notification::decode(notification.channel(), notification.payload()) {
                        Ok(decoded) => callback(decoded),
                        Err(e) => warn!("Dropping notification: {}", e),
                    }
                }
                Err(e) => {
                    error!("Error receiving notification: {}. Reconnecting", e);
                    listener_option = None;
                }
            }
        }

        if let Some(mut listener) = listener_option {
            if let Err(e) = listener.unlisten_all().await {
                debug!("Failed to unlisten on close: {}", e);
            }
        }
        info!("Database notification listener stopped");
    })
}

async fn connect(pool: &PgPool) -> Result<PgListener, sqlx::Error> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener
        .listen_all([
            topics::PROCESSING_STATE_CHANGED,
            topics::NEW_EVENT_INSERT,
            topics::NEW_HISTORY_INSERT,
        ])
        .await?;
    info!("Listening for database notifications");
    Ok(listener)
}
