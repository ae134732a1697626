use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use log::{debug, error, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use super::rest::AppState;
use crate::messaging::client::{ClientMessage, ClientTransport};

// Handle WebSocket connection upgrade
pub async fn handle_ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state.transport))
}

/// Bridges one dashboard socket to the client transport until either side
/// goes away
async fn handle_socket(socket: WebSocket, addr: SocketAddr, transport: Arc<ClientTransport>) {
    let (session, mut outbound) = transport.connect(Some(addr.ip())).await;
    let (mut sender, mut receiver) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode {} for {}: {}", message.event, session, e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(text)).await {
                debug!("Socket for {} closed while sending: {}", session, e);
                break;
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => transport.dispatch(session, &message.event, message.data).await,
                Err(e) => warn!("Ignoring malformed frame from {}: {}", session, e),
            },
            Ok(Message::Binary(_)) => {
                debug!("Ignoring binary frame from {}", session);
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!("WebSocket error for {}: {}", session, e);
                break;
            }
        }
    }

    transport.disconnect(session).await;
    writer.abort();
}
