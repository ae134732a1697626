use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use prost::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::Handler;
use crate::config::StatusConfig;
use crate::messaging::client::ClientTransport;
use crate::messaging::topics;
use crate::status::proto::{StatusInformation, StatusRequest};
use crate::status::{process_status_reply, MicroserviceStatus, StatusConnection, StatusConnector, StatusError};

/// One polled service and the connection the poll cycle owns for it
struct ServiceSlot {
    name: String,
    address: String,
    connection: Option<Box<dyn StatusConnection>>,
}

impl ServiceSlot {
    fn new(name: &str, address: &str) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            connection: None,
        }
    }

    /// Opens a new connection, bounded by `timeout` when one is set. A failed
    /// connect leaves the slot empty until the next poll.
    async fn connect(&mut self, connector: &dyn StatusConnector, timeout: Option<Duration>) {
        let connected = match timeout {
            Some(limit) => tokio::time::timeout(limit, connector.connect(&self.address))
                .await
                .unwrap_or(Err(StatusError::Timeout(limit))),
            None => connector.connect(&self.address).await,
        };
        match connected {
            Ok(connection) => {
                debug!("Connected to status server {} at {}", self.name, self.address);
                self.connection = Some(connection);
            }
            Err(e) => error!("Status server {} at {}: {}", self.name, self.address, e),
        }
    }

    async fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
    }
}

async fn request_status(
    connection: &mut dyn StatusConnection,
    timeout: Option<Duration>,
) -> Result<StatusInformation, StatusError> {
    let request = StatusRequest::latest().encode_to_vec();
    let reply = match timeout {
        Some(limit) => tokio::time::timeout(limit, connection.request(request))
            .await
            .map_err(|_| StatusError::Timeout(limit))??,
        None => connection.request(request).await?,
    };
    StatusInformation::decode(reply.as_slice()).map_err(|e| StatusError::Decode(e.to_string()))
}

/// One poll of one service. An empty slot is connected first. A failed
/// poll discards the connection so the next poll starts on a new one.
async fn poll_service(
    slot: &mut ServiceSlot,
    connector: &dyn StatusConnector,
    timeout: Option<Duration>,
    max_log_lines: usize,
) -> MicroserviceStatus {
    if slot.connection.is_none() {
        slot.connect(connector, timeout).await;
    }

    let outcome = match slot.connection.as_mut() {
        Some(connection) => request_status(connection.as_mut(), timeout).await,
        None => Err(StatusError::Connect(slot.address.clone(), "not connected".to_string())),
    };

    match outcome {
        Ok(reply) => process_status_reply(&slot.name, &reply, max_log_lines),
        Err(e) => {
            warn!("Status server {} unavailable: {}", slot.name, e);
            slot.close().await;
            MicroserviceStatus::unavailable(&slot.name)
        }
    }
}

/// Everything a per-service poll task needs
#[derive(Clone)]
struct PollSettings {
    connector: Arc<dyn StatusConnector>,
    cancel: CancellationToken,
    period: Duration,
    timeout: Option<Duration>,
    max_log_lines: usize,
}

/// Polls one service every period and writes each result into its entry
/// of the shared snapshot. A service that never answers only stalls its
/// own entry.
fn spawn_service_poller(
    index: usize,
    mut slot: ServiceSlot,
    settings: PollSettings,
    statuses: Arc<watch::Sender<Vec<MicroserviceStatus>>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(settings.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = settings.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let status = tokio::select! {
                _ = settings.cancel.cancelled() => break,
                status = poll_service(&mut slot, settings.connector.as_ref(), settings.timeout, settings.max_log_lines) => status,
            };
            statuses.send_modify(|current| {
                if let Some(entry) = current.get_mut(index) {
                    *entry = status;
                }
            });
        }

        slot.close().await;
        debug!("Stopped polling status server {}", slot.name);
    })
}

/// Polls the configured status servers and broadcasts their aggregated
/// status to dashboards on a staggered second schedule. Every service is
/// polled by its own task.
pub struct StatusPollingHandler {
    transport: Arc<ClientTransport>,
    connector: Arc<dyn StatusConnector>,
    servers: Vec<(String, String)>,
    period: Duration,
    publish_delay: Duration,
    timeout: Option<Duration>,
    max_log_lines: usize,
    snapshot: watch::Receiver<Vec<MicroserviceStatus>>,
    publisher: Mutex<Option<watch::Sender<Vec<MicroserviceStatus>>>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StatusPollingHandler {
    pub fn new(transport: Arc<ClientTransport>, config: &StatusConfig, connector: Arc<dyn StatusConnector>) -> Self {
        let servers: Vec<(String, String)> = config
            .servers
            .iter()
            .map(|(name, address)| (name.clone(), address.clone()))
            .collect();
        let initial = servers
            .iter()
            .map(|(name, _)| MicroserviceStatus::unknown(name))
            .collect();
        let (publisher, snapshot) = watch::channel(initial);

        Self {
            transport,
            connector,
            servers,
            period: config.update_interval(),
            publish_delay: config.publish_delay(),
            timeout: config.timeout(),
            max_log_lines: config.max_log_lines,
            snapshot,
            publisher: Mutex::new(Some(publisher)),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Copy of the latest status of every service
    pub fn snapshot(&self) -> Vec<MicroserviceStatus> {
        self.snapshot.borrow().clone()
    }

    fn spawn_pollers(&self, publisher: watch::Sender<Vec<MicroserviceStatus>>) -> Vec<JoinHandle<()>> {
        let statuses = Arc::new(publisher);
        let settings = PollSettings {
            connector: self.connector.clone(),
            cancel: self.cancel.clone(),
            period: self.period,
            timeout: self.timeout,
            max_log_lines: self.max_log_lines,
        };

        self.servers
            .iter()
            .enumerate()
            .map(|(index, (name, address))| {
                spawn_service_poller(index, ServiceSlot::new(name, address), settings.clone(), statuses.clone())
            })
            .collect()
    }

    fn spawn_publisher(&self) -> JoinHandle<()> {
        let transport = self.transport.clone();
        let snapshot = self.snapshot.clone();
        let cancel = self.cancel.clone();
        let period = self.period;
        let delay = self.publish_delay;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(delay) => {}
            }

            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let statuses = snapshot.borrow().clone();
                        if let Err(e) = transport.publish(topics::UPDATE_STATUS, &statuses, None).await {
                            error!("Failed to publish status: {}", e);
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Handler for StatusPollingHandler {
    fn name(&self) -> &'static str {
        "status"
    }

    async fn start(&self) -> Result<()> {
        let publisher = match self.publisher.lock().await.take() {
            Some(publisher) => publisher,
            None => {
                warn!("Status Handler already started");
                return Ok(());
            }
        };

        let mut tasks = self.spawn_pollers(publisher);
        tasks.push(self.spawn_publisher());
        self.tasks.lock().await.extend(tasks);
        info!("Status Handler Initialized with {} servers", self.servers.len());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!("Status task failed: {}", e);
            }
        }
        info!("Status Handler Closed");
        Ok(())
    }
}
