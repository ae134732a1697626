use crate::error::Error;
use crate::messaging::topics;
use anyhow::Result;
use futures::future::BoxFuture;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Identifies one connected dashboard
pub type SessionId = Uuid;

/// Callback invoked for an inbound client message
pub type MessageCallback = Arc<dyn Fn(Value, SessionId) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Callback invoked after a session is gone
pub type DisconnectCallback = Arc<dyn Fn(SessionId) -> BoxFuture<'static, ()> + Send + Sync>;

/// A frame in either direction: `{"event": <name>, "data": <payload>}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastIcon {
    Success,
    Warning,
    Error,
    Info,
    Question,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toast {
    pub icon: ToastIcon,
    pub title: String,
}

struct ClientSession {
    sender: mpsc::UnboundedSender<ClientMessage>,
    address: Option<IpAddr>,
}

/// Connected dashboard sessions with broadcast and unicast delivery
pub struct ClientTransport {
    sessions: RwLock<HashMap<SessionId, ClientSession>>,
    listeners: RwLock<HashMap<String, Vec<MessageCallback>>>,
    disconnect_listeners: RwLock<Vec<DisconnectCallback>>,
}

impl ClientTransport {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            listeners: RwLock::new(HashMap::new()),
            disconnect_listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a session. Messages for it arrive on the returned receiver.
    pub async fn connect(&self, address: Option<IpAddr>) -> (SessionId, mpsc::UnboundedReceiver<ClientMessage>) {
        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::unbounded_channel();

        self.sessions
            .write()
            .await
            .insert(id, ClientSession { sender, address });

        info!("Client {} connected from {:?}", id, address);
        (id, receiver)
    }

    /// Forget a session and notify disconnect listeners
    pub async fn disconnect(&self, session: SessionId) {
        if self.sessions.write().await.remove(&session).is_none() {
            return;
        }
        info!("Client {} disconnected", session);

        let callbacks = self.disconnect_listeners.read().await.clone();
        for callback in callbacks {
            callback(session).await;
        }
    }

    pub async fn session_address(&self, session: SessionId) -> Option<IpAddr> {
        self.sessions
            .read()
            .await
            .get(&session)
            .and_then(|s| s.address)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Deliver to `target` when given, otherwise to every session. A target
    /// that is not connected is skipped silently.
    pub async fn publish<T>(&self, topic: &str, payload: &T, target: Option<SessionId>) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let data = serde_json::to_value(payload)
            .map_err(|e| Error::Serialization(format!("Failed to serialize {}: {}", topic, e)))?;
        let message = ClientMessage {
            event: topic.to_string(),
            data,
        };

        let sessions = self.sessions.read().await;
        match target {
            Some(id) => {
                debug!("Outbound {} to {}", topic, id);
                if let Some(session) = sessions.get(&id) {
                    if session.sender.send(message).is_err() {
                        debug!("Client {} went away before {} was delivered", id, topic);
                    }
                }
            }
            None => {
                debug!("Outbound {} to {} clients", topic, sessions.len());
                for (id, session) in sessions.iter() {
                    if session.sender.send(message.clone()).is_err() {
                        debug!("Client {} went away before {} was delivered", id, topic);
                    }
                }
            }
        }

        Ok(())
    }

    /// Publish a toast notification
    pub async fn toast(&self, icon: ToastIcon, title: &str, target: Option<SessionId>) {
        let toast = Toast {
            icon,
            title: title.to_string(),
        };
        if let Err(e) = self.publish(topics::TOAST, &toast, target).await {
            error!("Failed to send toast: {}", e);
        }
    }

    /// Subscribe to an inbound message name
    pub async fn on(&self, topic: &str, callback: MessageCallback) {
        self.listeners
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(callback);
    }

    pub async fn on_disconnect(&self, callback: DisconnectCallback) {
        self.disconnect_listeners.write().await.push(callback);
    }

    /// Hand an inbound message to its subscribers, each on its own task.
    /// Subscriber errors are logged.
    pub async fn dispatch(&self, session: SessionId, topic: &str, data: Value) {
        debug!("Inbound {} from {}", topic, session);

        let callbacks = match self.listeners.read().await.get(topic) {
            Some(callbacks) => callbacks.clone(),
            None => {
                debug!("No handler for {} from {}", topic, session);
                return;
            }
        };

        for callback in callbacks {
            let topic = topic.to_string();
            let fut = callback(data.clone(), session);
            tokio::spawn(async move {
                if let Err(e) = fut.await {
                    error!("Handling {} from {} failed: {}", topic, session, e);
                }
            });
        }
    }

    /// Drop every session and subscription
    pub async fn close(&self) {
        self.sessions.write().await.clear();
        self.listeners.write().await.clear();
        self.disconnect_listeners.write().await.clear();
        info!("Client transport closed");
    }
}

impl Default for ClientTransport {
    fn default() -> Self {
        Self::new()
    }
}
