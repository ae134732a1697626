use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::Handler;
use crate::error::Error;
use crate::messaging::client::{ClientTransport, SessionId};
use crate::messaging::topics;

/// Appends dashboard log lines to one file per client, named after the
/// client's IP address or, without one, its session id
pub struct ClientLogSink {
    transport: Arc<ClientTransport>,
    directory: PathBuf,
    sinks: Mutex<HashMap<SessionId, File>>,
}

impl ClientLogSink {
    pub fn new(transport: Arc<ClientTransport>, directory: PathBuf) -> Self {
        info!("Log Handler Initialized");
        Self {
            transport,
            directory,
            sinks: Mutex::new(HashMap::new()),
        }
    }

    async fn open_sink(&self, session: SessionId) -> Result<File> {
        let name = match self.transport.session_address(session).await {
            Some(ip) => ip.to_string(),
            None => session.to_string(),
        };
        let path = self.directory.join(format!("{}.log", name));

        fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| Error::Io(format!("Failed to create {:?}: {}", self.directory, e)))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| Error::Io(format!("Failed to open {:?}: {}", path, e)))?;

        debug!("Client {} logging to {:?}", session, path);
        Ok(file)
    }
}

#[async_trait]
impl Handler for ClientLogSink {
    fn name(&self) -> &'static str {
        "client-log"
    }

    fn client_topics(&self) -> &'static [&'static str] {
        &[topics::SAVE_VIEWER_LOG]
    }

    fn wants_disconnects(&self) -> bool {
        true
    }

    async fn on_client_message(&self, _topic: &str, data: Value, session: SessionId) -> Result<()> {
        let message = match data {
            Value::String(text) => text,
            other => other.to_string(),
        };

        let mut sinks = self.sinks.lock().await;
        if !sinks.contains_key(&session) {
            let file = self.open_sink(session).await?;
            sinks.insert(session, file);
        }
        if let Some(file) = sinks.get_mut(&session) {
            file.write_all(format!("{} {}\n", session, message).as_bytes())
                .await
                .map_err(|e| Error::Io(format!("Failed to write client log: {}", e)))?;
            file.flush().await?;
        }
        Ok(())
    }

    async fn on_client_disconnect(&self, session: SessionId) {
        self.sinks.lock().await.remove(&session);
    }

    async fn close(&self) -> Result<()> {
        self.sinks.lock().await.clear();
        info!("Log Handler Closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::{IpAddr, Ipv4Addr};

    #[tokio::test]
    async fn test_lines_go_to_ip_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ClientTransport::new());
        let ip = IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3));
        let (session, _rx) = transport.connect(Some(ip)).await;
        let sink = ClientLogSink::new(transport.clone(), dir.path().join("viewer"));

        sink.on_client_message(topics::SAVE_VIEWER_LOG, json!("camera moved"), session)
            .await
            .unwrap();
        sink.on_client_message(topics::SAVE_VIEWER_LOG, json!("filter changed"), session)
            .await
            .unwrap();

        let text = std::fs::read_to_string(dir.path().join("viewer").join("10.1.2.3.log")).unwrap();
        assert_eq!(text, format!("{s} camera moved\n{s} filter changed\n", s = session));
    }

    #[tokio::test]
    async fn test_falls_back_to_session_id_and_drops_sink_on_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ClientTransport::new());
        let (session, _rx) = transport.connect(None).await;
        let sink = ClientLogSink::new(transport.clone(), dir.path().to_path_buf());

        sink.on_client_message(topics::SAVE_VIEWER_LOG, json!("hello"), session)
            .await
            .unwrap();
        assert!(dir.path().join(format!("{}.log", session)).exists());

        sink.on_client_disconnect(session).await;
        assert!(sink.sinks.lock().await.is_empty());
    }
}
