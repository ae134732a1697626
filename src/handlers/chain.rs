use anyhow::Result;
use async_trait::async_trait;
use log::info;
use serde_json::Value;
use std::sync::Arc;

use super::Handler;
use crate::messaging::client::ClientTransport;
use crate::messaging::topics;

/// Relays event lifecycle messages from the upstream feed to every dashboard
pub struct ChainRelayHandler {
    transport: Arc<ClientTransport>,
}

impl ChainRelayHandler {
    pub fn new(transport: Arc<ClientTransport>) -> Self {
        info!("Chain Handler Initialized");
        Self { transport }
    }
}

#[async_trait]
impl Handler for ChainRelayHandler {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn feed_topics(&self) -> &'static [&'static str] {
        &[topics::FEED_NEW_EVENT_START, topics::FEED_NEW_EVENT_FINISH]
    }

    async fn on_feed_message(&self, topic: &str, data: Value) -> Result<()> {
        let outbound = match topic {
            topics::FEED_NEW_EVENT_START => topics::NEW_EVENT_START,
            topics::FEED_NEW_EVENT_FINISH => topics::NEW_EVENT_FINISH,
            other => {
                log::warn!("Chain handler ignoring {}", other);
                return Ok(());
            }
        };
        self.transport.publish(outbound, &data, None).await
    }

    async fn close(&self) -> Result<()> {
        info!("Chain Handler Closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_relays_lifecycle_topics_to_all_clients() {
        let transport = Arc::new(ClientTransport::new());
        let (_a, mut rx_a) = transport.connect(None).await;
        let (_b, mut rx_b) = transport.connect(None).await;
        let handler = ChainRelayHandler::new(transport.clone());

        handler
            .on_feed_message(topics::FEED_NEW_EVENT_FINISH, json!({"event_id": "e1"}))
            .await
            .unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            let message = rx.recv().await.unwrap();
            assert_eq!(message.event, topics::NEW_EVENT_FINISH);
            assert_eq!(message.data["event_id"], "e1");
        }
    }
}
