use async_trait::async_trait;
use log::debug;
use thiserror::Error;
use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

/// Failures of one status round trip. Every variant leads to the
/// connection being replaced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatusError {
    #[error("connect to {0} failed: {1}")]
    Connect(String, String),

    #[error("request failed: {0}")]
    Send(String),

    #[error("reply failed: {0}")]
    Receive(String),

    #[error("no reply within {0:?}")]
    Timeout(std::time::Duration),

    #[error("undecodable reply: {0}")]
    Decode(String),
}

/// A request/reply channel to one service. A request must be answered
/// before the next one is sent.
#[async_trait]
pub trait StatusConnection: Send {
    async fn request(&mut self, payload: Vec<u8>) -> Result<Vec<u8>, StatusError>;

    async fn close(self: Box<Self>);
}

/// Opens fresh connections to service addresses
#[async_trait]
pub trait StatusConnector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Box<dyn StatusConnection>, StatusError>;
}

/// ZeroMQ REQ socket connection
pub struct ZmqStatusConnection {
    address: String,
    socket: ReqSocket,
}

#[async_trait]
impl StatusConnection for ZmqStatusConnection {
    async fn request(&mut self, payload: Vec<u8>) -> Result<Vec<u8>, StatusError> {
        self.socket
            .send(ZmqMessage::from(payload))
            .await
            .map_err(|e| StatusError::Send(e.to_string()))?;

        let reply = self
            .socket
            .recv()
            .await
            .map_err(|e| StatusError::Receive(e.to_string()))?;

        reply
            .into_vec()
            .into_iter()
            .next()
            .map(|frame| frame.to_vec())
            .ok_or_else(|| StatusError::Receive("empty reply".to_string()))
    }

    async fn close(self: Box<Self>) {
        let errors = self.socket.close().await;
        if !errors.is_empty() {
            debug!("Closing status socket to {} reported {} errors", self.address, errors.len());
        }
    }
}

#[derive(Default)]
pub struct ZmqStatusConnector;

#[async_trait]
impl StatusConnector for ZmqStatusConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn StatusConnection>, StatusError> {
        let mut socket = ReqSocket::new();
        socket
            .connect(address)
            .await
            .map_err(|e| StatusError::Connect(address.to_string(), e.to_string()))?;

        Ok(Box::new(ZmqStatusConnection {
            address: address.to_string(),
            socket,
        }))
    }
}
