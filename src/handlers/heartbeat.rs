use anyhow::Result;
use async_trait::async_trait;
use log::{error, info};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use super::Handler;
use crate::messaging::client::ClientTransport;
use crate::messaging::topics;

#[derive(Debug, Clone, Serialize)]
pub struct Heartbeat {
    pub version: String,
}

/// Broadcasts the server version right away and then on every interval
pub struct HeartbeatHandler {
    transport: Arc<ClientTransport>,
    period: Duration,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatHandler {
    pub fn new(transport: Arc<ClientTransport>, period: Duration) -> Self {
        Self {
            transport,
            period,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Handler for HeartbeatHandler {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    async fn start(&self) -> Result<()> {
        let transport = self.transport.clone();
        let cancel = self.cancel.clone();
        let period = self.period;
        let heartbeat = Heartbeat {
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        let handle = tokio::spawn(async move {
            // the first tick completes immediately
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = transport.publish(topics::HEARTBEAT, &heartbeat, None).await {
                            error!("Failed to publish heartbeat: {}", e);
                        }
                    }
                }
            }
        });

        *self.task.lock().await = Some(handle);
        info!("Heartbeat Handler Initialized");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.cancel.cancel();
        if let Some(handle) = self.task.lock().await.take() {
            handle.await?;
        }
        info!("Heartbeat Handler Closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_heartbeat_sent_on_start_and_each_period() {
        let transport = Arc::new(ClientTransport::new());
        let (_id, mut rx) = transport.connect(None).await;
        let handler = HeartbeatHandler::new(transport.clone(), Duration::from_millis(300));

        handler.start().await.unwrap();
        let first = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("heartbeat on start")
            .unwrap();
        assert_eq!(first.event, topics::HEARTBEAT);
        assert_eq!(first.data["version"], env!("CARGO_PKG_VERSION"));

        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(second.is_ok());

        handler.close().await.unwrap();
    }
}
