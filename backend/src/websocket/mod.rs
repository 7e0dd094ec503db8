//! WebSocket server for real-time booking updates

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use uuid::Uuid;

use crate::booking::BookingEvent;

const CHANNEL_CAPACITY: usize = 100;

/// WebSocket server state
#[derive(Clone)]
pub struct WsState {
    /// Broadcast channel for booking events
    pub tx: broadcast::Sender<BookingEvent>,
    /// Connected clients registry
    pub clients: Arc<RwLock<HashMap<Uuid, ClientInfo>>>,
}

/// Client connection information
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    /// Empty means every listing
    pub subscribed_listings: Vec<Uuid>,
}

impl ClientInfo {
    fn wants(&self, event: &BookingEvent) -> bool {
        self.subscribed_listings.is_empty() || self.subscribed_listings.contains(&event.listing_id())
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClientMessage {
    Subscribe { listing_ids: Vec<Uuid> },
    Unsubscribe { listing_ids: Vec<Uuid> },
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ServerMessage {
    Event { event: BookingEvent },
    Subscribed { listing_ids: Vec<Uuid> },
    Unsubscribed { listing_ids: Vec<Uuid> },
    Pong,
    Error { message: String },
}

impl Default for WsState {
    fn default() -> Self {
        Self::new()
    }
}

impl WsState {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fan an event out to connected clients. Having no listeners is fine.
    pub async fn broadcast_event(&self, event: BookingEvent) {
        if self.tx.receiver_count() == 0 {
            return;
        }
        if let Err(e) = self.tx.send(event) {
            tracing::error!(error = %e, "Failed to broadcast booking event");
        }
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    async fn register_client(&self, client_id: Uuid) {
        self.clients
            .write()
            .await
            .insert(client_id, ClientInfo::default());
        tracing::info!(client_id = %client_id, "WebSocket client connected");
    }

    async fn unregister_client(&self, client_id: Uuid) {
        self.clients.write().await.remove(&client_id);
        tracing::info!(client_id = %client_id, "WebSocket client disconnected");
    }

    async fn subscribe(&self, client_id: Uuid, listing_ids: &[Uuid]) {
        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get_mut(&client_id) {
            for id in listing_ids {
                if !client.subscribed_listings.contains(id) {
                    client.subscribed_listings.push(*id);
                }
            }
        }
    }

    async fn unsubscribe(&self, client_id: Uuid, listing_ids: &[Uuid]) {
        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get_mut(&client_id) {
            client
                .subscribed_listings
                .retain(|id| !listing_ids.contains(id));
        }
    }

    async fn wants(&self, client_id: Uuid, event: &BookingEvent) -> bool {
        self.clients
            .read()
            .await
            .get(&client_id)
            .map(|c| c.wants(event))
            .unwrap_or(false)
    }
}

/// Upgrades the HTTP connection to a WebSocket
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let client_id = Uuid::new_v4();
    state.register_client(client_id).await;

    let (mut sender, mut receiver) = socket.split();

    // Replies from the receive task go out through the send task
    let (internal_tx, mut internal_rx) = mpsc::channel::<ServerMessage>(32);

    let mut rx = state.tx.subscribe();
    let send_state = state.clone();

    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                received = rx.recv() => match received {
                    Ok(event) => {
                        if !send_state.wants(client_id, &event).await {
                            continue;
                        }
                        ServerMessage::Event { event }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(client_id = %client_id, skipped, "WebSocket client lagging");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(msg) = internal_rx.recv() => msg,
                else => break,
            };

            let Ok(text) = serde_json::to_string(&msg) else {
                continue;
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let reply = match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Subscribe { listing_ids }) => {
                    recv_state.subscribe(client_id, &listing_ids).await;
                    tracing::debug!(client_id = %client_id, count = listing_ids.len(), "Subscribed");
                    ServerMessage::Subscribed { listing_ids }
                }
                Ok(ClientMessage::Unsubscribe { listing_ids }) => {
                    recv_state.unsubscribe(client_id, &listing_ids).await;
                    tracing::debug!(client_id = %client_id, count = listing_ids.len(), "Unsubscribed");
                    ServerMessage::Unsubscribed { listing_ids }
                }
                Ok(ClientMessage::Ping) => ServerMessage::Pong,
                Err(e) => ServerMessage::Error {
                    message: format!("Unrecognised message: {}", e),
                },
            };

            if internal_tx.send(reply).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    state.unregister_client(client_id).await;
}
