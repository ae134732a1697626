use anyhow::Result;
use futures::future::BoxFuture;
use log::{error, info};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::client::{ClientTransport, SessionId};
use super::feed::UpstreamFeed;
use crate::config::Config;
use crate::db::DatabaseService;
use crate::handlers::{
    ChainRelayHandler, ClientLogSink, EventQueryHandler, Handler, HeartbeatHandler, StatusPollingHandler,
};
use crate::status::ZmqStatusConnector;

/// Composition root: owns the upstream feed, the client transport and the
/// handler table, and runs their lifecycle
pub struct Router {
    transport: Arc<ClientTransport>,
    feed: UpstreamFeed,
    handlers: Vec<Arc<dyn Handler>>,
}

impl Router {
    pub fn new(config: &Config, transport: Arc<ClientTransport>, db: Arc<DatabaseService>) -> Self {
        let handlers: Vec<Arc<dyn Handler>> = vec![
            Arc::new(ChainRelayHandler::new(transport.clone())),
            Arc::new(EventQueryHandler::new(transport.clone(), db)),
            Arc::new(HeartbeatHandler::new(
                transport.clone(),
                Duration::from_secs(config.heartbeat.interval_secs),
            )),
            Arc::new(ClientLogSink::new(transport.clone(), config.client_log.directory.clone())),
            Arc::new(StatusPollingHandler::new(
                transport.clone(),
                &config.status,
                Arc::new(ZmqStatusConnector::default()),
            )),
        ];

        let feed = UpstreamFeed::new(&config.feed.sub_connection);
        Self::with_handlers(transport, feed, handlers)
    }

    pub fn with_handlers(transport: Arc<ClientTransport>, feed: UpstreamFeed, handlers: Vec<Arc<dyn Handler>>) -> Self {
        Self {
            transport,
            feed,
            handlers,
        }
    }

    pub fn transport(&self) -> Arc<ClientTransport> {
        self.transport.clone()
    }

    /// Registers every handler's topics, starts the handlers, then starts
    /// the upstream feed, which connects in the background.
    pub async fn start(&self) -> Result<()> {
        for handler in &self.handlers {
            self.register(handler.clone()).await;
        }

        for handler in &self.handlers {
            handler.start().await?;
        }

        self.feed.listen().await;

        info!("Router started with {} handlers", self.handlers.len());
        Ok(())
    }

    async fn register(&self, handler: Arc<dyn Handler>) {
        for &topic in handler.client_topics() {
            let handler = handler.clone();
            self.transport
                .on(
                    topic,
                    Arc::new(move |data: Value, session: SessionId| -> BoxFuture<'static, Result<()>> {
                        let handler = handler.clone();
                        Box::pin(async move { handler.on_client_message(topic, data, session).await })
                    }),
                )
                .await;
        }

        for &topic in handler.feed_topics() {
            let handler = handler.clone();
            self.feed
                .on(
                    topic,
                    Arc::new(move |data: Value| -> BoxFuture<'static, Result<()>> {
                        let handler = handler.clone();
                        Box::pin(async move { handler.on_feed_message(topic, data).await })
                    }),
                )
                .await;
        }

        if handler.wants_disconnects() {
            self.transport
                .on_disconnect(Arc::new(move |session: SessionId| -> BoxFuture<'static, ()> {
                    let handler = handler.clone();
                    Box::pin(async move { handler.on_client_disconnect(session).await })
                }))
                .await;
        }
    }

    /// Closes the handlers in table order, then the feed and the transport
    pub async fn close(&self) {
        info!("Router closing");
        for handler in &self.handlers {
            if let Err(e) = handler.close().await {
                error!("Closing {} handler failed: {}", handler.name(), e);
            }
        }
        self.feed.close().await;
        self.transport.close().await;
        info!("Router closed");
    }
}
