use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::protocol::{ClientEvent, ServerEvent};
use crate::room::Participant;

use super::state::AppState;

/// GET /ws: upgrade to the realtime coordination socket
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Writer task: serialize outbound events onto the socket. Dispatch
    // pushes into the channel and never waits on this connection.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    warn!("failed to serialize outbound event: {}", err);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // The first meaningful message must be a join; anything else before
    // admission is ignored.
    let participant = match await_join(&mut ws_rx, &state, &tx).await {
        Some(participant) => participant,
        None => {
            // Let the writer flush the rejection before the socket drops
            drop(tx);
            let _ = writer.await;
            return;
        }
    };

    // Bring the joiner up to date on state the room does not own
    let active = state.uploads.is_active().await;
    state
        .room
        .send_to(&participant.id, ServerEvent::UploadStatus { active })
        .await;
    match state.assets.scan().await {
        Ok(records) => {
            let assets = records.into_iter().map(|r| r.filename).collect();
            state
                .room
                .send_to(&participant.id, ServerEvent::AssetList { assets })
                .await;
        }
        Err(err) => warn!("failed to list assets for joiner: {}", err),
    }

    // Main dispatch loop: events from this connection, in arrival order
    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => state.room.handle_event(&participant.id, event).await,
                Err(err) => warn!("unparseable event from {}: {}", participant.id, err),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // Ping/pong/binary are transport noise here
            Err(err) => {
                warn!("socket error for {}: {}", participant.id, err);
                break;
            }
        }
    }

    state.room.disconnect(&participant.id).await;
    info!("connection closed: {}", participant.display_name);

    drop(tx);
    let _ = writer.await;
}

/// Wait for the join event and run admission. Returns `None` when the
/// connection closes first or admission is rejected; a rejected joiner
/// gets told why before the socket goes away.
async fn await_join(
    ws_rx: &mut futures::stream::SplitStream<WebSocket>,
    state: &AppState,
    tx: &mpsc::UnboundedSender<ServerEvent>,
) -> Option<Participant> {
    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(ClientEvent::Join { display_name }) => {
                    match state.room.admit(&display_name, tx.clone()).await {
                        Ok(participant) => return Some(participant),
                        Err(err) => {
                            info!("admission rejected for {}: {}", display_name, err);
                            let _ = tx.send(ServerEvent::AdmissionRejected {
                                reason: err.to_string(),
                            });
                            return None;
                        }
                    }
                }
                Ok(other) => {
                    warn!("event before join, ignored: {:?}", other);
                }
                Err(err) => warn!("unparseable pre-join message: {}", err),
            },
            Ok(Message::Close(_)) => return None,
            Ok(_) => {}
            Err(_) => return None,
        }
    }
    None
}
