//! Message handlers. The router registers each handler's topics at startup
//! and closes the handlers in table order at shutdown.

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;
use crate::messaging::client::SessionId;

pub mod chain;
pub mod client_log;
pub mod database;
pub mod heartbeat;
pub mod status;

pub use chain::ChainRelayHandler;
pub use client_log::ClientLogSink;
pub use database::EventQueryHandler;
pub use heartbeat::HeartbeatHandler;
pub use status::StatusPollingHandler;

#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Inbound client message names this handler answers
    fn client_topics(&self) -> &'static [&'static str] {
        &[]
    }

    /// Upstream feed topics this handler consumes
    fn feed_topics(&self) -> &'static [&'static str] {
        &[]
    }

    fn wants_disconnects(&self) -> bool {
        false
    }

    /// Start background work once registered
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn on_client_message(&self, topic: &str, _data: Value, session: SessionId) -> Result<()> {
        Err(Error::Internal(format!("{} does not handle {} from {}", self.name(), topic, session)).into())
    }

    async fn on_feed_message(&self, topic: &str, _data: Value) -> Result<()> {
        Err(Error::Internal(format!("{} does not handle upstream {}", self.name(), topic)).into())
    }

    async fn on_client_disconnect(&self, _session: SessionId) {}

    /// Stop background work and release resources
    async fn close(&self) -> Result<()>;
}

/// Decodes an inbound payload into its expected shape
pub fn parse_payload<T: DeserializeOwned>(topic: &str, data: Value) -> Result<T> {
    serde_json::from_value(data)
        .map_err(|e| Error::InvalidPayload(format!("{}: {}", topic, e)).into())
}

/// Decodes an inbound payload that carries a bare id string
pub fn parse_id(topic: &str, data: &Value) -> Result<Uuid> {
    data.as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| Error::InvalidPayload(format!("{} expects an id, got {}", topic, data)).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id("delete-event", &json!(id.to_string())).unwrap(), id);
        assert!(parse_id("delete-event", &json!(42)).is_err());
        assert!(parse_id("delete-event", &json!("not-a-uuid")).is_err());
    }
}
