//! WebSocket handlers for the live boards
//!
//! Each socket becomes one board subscriber, registered through the
//! [`Monitor`]. Payloads reach the socket through a bounded queue; a text
//! frame with an integer retargets the subscriber.

use std::sync::Arc;

use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tracing::{debug, info, warn};

use crate::api::state::ApiState;
use crate::broadcast::{ChannelId, QueueSubscriber, Subscriber, SubscriberId};
use crate::monitor::Monitor;

/// Payloads buffered per socket before new ones are dropped
const SUBSCRIBER_QUEUE: usize = 32;

/// Which live board a socket follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Board {
    Status,
    Resources,
}

impl Board {
    fn name(self) -> &'static str {
        match self {
            Board::Status => "services",
            Board::Resources => "servers",
        }
    }

    async fn subscribe(self, monitor: &Monitor, subscriber: Arc<dyn Subscriber>, channel: ChannelId) -> SubscriberId {
        match self {
            Board::Status => monitor.subscribe_services(subscriber, channel).await,
            Board::Resources => monitor.subscribe_servers(subscriber, channel).await,
        }
    }

    async fn retarget(self, monitor: &Monitor, id: SubscriberId, channel: ChannelId) -> bool {
        match self {
            Board::Status => monitor.change_channel(id, channel).await,
            Board::Resources => monitor.change_server_channel(id, channel).await,
        }
    }

    async fn unsubscribe(self, monitor: &Monitor, id: SubscriberId) {
        match self {
            Board::Status => monitor.unsubscribe_services(id).await,
            Board::Resources => monitor.unsubscribe_servers(id).await,
        }
    }
}

/// WS /ws/services
pub async fn services_global_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    let monitor = state.monitor.clone();
    ws.on_upgrade(move |socket| handle_board_socket(socket, monitor, Board::Status, ChannelId::GLOBAL))
}

/// WS /ws/services/:channel
pub async fn services_handler(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    Path(channel): Path<i64>,
) -> Response {
    let monitor = state.monitor.clone();
    ws.on_upgrade(move |socket| handle_board_socket(socket, monitor, Board::Status, ChannelId(channel)))
}

/// WS /ws/servers
pub async fn servers_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    let monitor = state.monitor.clone();
    ws.on_upgrade(move |socket| handle_board_socket(socket, monitor, Board::Resources, ChannelId::GLOBAL))
}

/// Subscribe the socket to `board` until either side closes
pub async fn handle_board_socket(socket: WebSocket, monitor: Arc<Monitor>, board: Board, channel: ChannelId) {
    let (subscriber, mut payloads) = QueueSubscriber::channel(SUBSCRIBER_QUEUE);
    let id = board.subscribe(&monitor, Arc::new(subscriber), channel).await;
    info!(hub = board.name(), "WebSocket subscriber {id} connected on channel {channel}");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = payloads.recv().await {
            let text = match serde_json::to_string(&payload) {
                Ok(text) => text,
                Err(e) => {
                    warn!("failed to encode board payload: {e}");
                    continue;
                }
            };

            if sender.send(Message::Text(text)).await.is_err() {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    let recv_monitor = monitor.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match text.parse::<ChannelId>() {
                    Ok(channel) => {
                        board.retarget(&recv_monitor, id, channel).await;
                    }
                    Err(_) => debug!("ignoring frame that is not a channel: {text:?}"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    board.unsubscribe(&monitor, id).await;
    info!(hub = board.name(), "WebSocket subscriber {id} disconnected");
}
