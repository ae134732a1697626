use crate::error::Error;
use anyhow::Result;
use futures::future::BoxFuture;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use zeromq::{Socket, SocketRecv, SubSocket};

/// Callback invoked with the payload of an upstream message
pub type FeedCallback = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<()>> + Send + Sync>;

type Listeners = Arc<RwLock<HashMap<String, Vec<FeedCallback>>>>;

/// Splits a received frame into topic and JSON payload. A single part is
/// `topic,payload`; a multipart message is `[topic, payload]`.
pub fn decode_frame(parts: &[Vec<u8>]) -> Result<(String, Value)> {
    let (topic, payload) = match parts {
        [] => return Err(Error::InvalidPayload("empty frame".to_string()).into()),
        [single] => {
            let text = std::str::from_utf8(single)
                .map_err(|e| Error::InvalidPayload(format!("frame is not utf-8: {}", e)))?;
            let (topic, payload) = text
                .split_once(',')
                .ok_or_else(|| Error::InvalidPayload(format!("no topic separator in {:?}", text)))?;
            (topic.to_string(), payload.to_string())
        }
        [topic, payload, ..] => (
            String::from_utf8(topic.clone())
                .map_err(|e| Error::InvalidPayload(format!("topic is not utf-8: {}", e)))?,
            String::from_utf8(payload.clone())
                .map_err(|e| Error::InvalidPayload(format!("payload is not utf-8: {}", e)))?,
        ),
    };

    let payload: Value = serde_json::from_str(&payload)
        .map_err(|e| Error::InvalidPayload(format!("bad JSON on {}: {}", topic, e)))?;
    Ok((topic, payload))
}

/// Subscription to the upstream lifecycle publisher
pub struct UpstreamFeed {
    endpoint: String,
    listeners: Listeners,
    task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl UpstreamFeed {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            listeners: Arc::new(RwLock::new(HashMap::new())),
            task: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to an upstream topic
    pub async fn on(&self, topic: &str, callback: FeedCallback) {
        self.listeners
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(callback);
    }

    /// Starts the receive loop. Connecting happens inside the loop task, so
    /// an unreachable publisher never holds up the caller.
    pub async fn listen(&self) {
        let endpoint = self.endpoint.clone();
        let listeners = self.listeners.clone();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let mut socket = SubSocket::new();
            let subscribed = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Upstream feed stopped before connecting to {}", endpoint);
                    return;
                }
                subscribed = subscribe_all(&mut socket, &endpoint) => subscribed,
            };
            if let Err(e) = subscribed {
                error!("Upstream feed unavailable: {}", e);
                return;
            }
            info!("Subscribed to upstream feed at {}", endpoint);

            loop {
                let received = tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = socket.recv() => received,
                };

                match received {
                    Ok(message) => {
                        let parts: Vec<Vec<u8>> = message.into_vec().into_iter().map(|b| b.to_vec()).collect();
                        match decode_frame(&parts) {
                            Ok((topic, payload)) => dispatch(&listeners, &topic, payload).await,
                            Err(e) => warn!("Dropping upstream frame: {}", e),
                        }
                    }
                    Err(e) => {
                        error!("Upstream feed receive failed: {}", e);
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                        }
                    }
                }
            }

            socket.close().await;
            info!("Upstream feed stopped");
        });

        *self.task.lock().await = Some(handle);
    }

    /// Stop the receive loop
    pub async fn close(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                error!("Upstream feed task failed: {}", e);
            }
        }
    }
}

/// Connects and subscribes to every topic. zeromq keeps retrying a refused
/// connect, so this only returns once the publisher is reachable.
async fn subscribe_all(socket: &mut SubSocket, endpoint: &str) -> Result<()> {
    socket
        .connect(endpoint)
        .await
        .map_err(|e| Error::Feed(format!("Failed to connect to {}: {}", endpoint, e)))?;
    socket
        .subscribe("")
        .await
        .map_err(|e| Error::Feed(format!("Failed to subscribe: {}", e)))?;
    Ok(())
}

/// Runs each subscriber of `topic` on its own task
async fn dispatch(listeners: &Listeners, topic: &str, payload: Value) {
    debug!("Upstream {}", topic);
    let callbacks = match listeners.read().await.get(topic) {
        Some(callbacks) => callbacks.clone(),
        None => return,
    };

    for callback in callbacks {
        let fut = callback(payload.clone());
        let topic = topic.to_string();
        tokio::spawn(async move {
            if let Err(e) = fut.await {
                error!("Handling upstream {} failed: {}", topic, e);
            }
        });
    }
}
