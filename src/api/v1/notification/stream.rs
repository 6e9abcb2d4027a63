use crate::api::identity_headers;
use crate::helper_model::Actor;
use crate::methods::notifier;
use futures::{SinkExt, StreamExt};
use warp::Filter;
use warp::ws::{Message, WebSocket};

pub fn main() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("stream")
        .and(warp::path::end())
        .and(warp::ws())
        .and(identity_headers())
        .map(|ws: warp::ws::Ws, user_id: i32, role: String| {
            let actor = Actor::from_headers(user_id, &role);
            ws.on_upgrade(move |socket| live_session(socket, actor))
        })
}

/// One live session per user. Registering replaces any previous session
/// for the same user; an invalid identity gets the socket closed right
/// after the handshake.
async fn live_session(socket: WebSocket, actor: Option<Actor>) {
    let (mut to_client, mut from_client) = socket.split();

    let owner_id = match actor.as_ref().and_then(Actor::user_id) {
        Some(id) => id,
        None => {
            let _ = to_client
                .send(Message::text(
                    serde_json::json!({
                        "title": "Unauthorized",
                        "message": "Missing or malformed identity headers.",
                    })
                    .to_string(),
                ))
                .await;
            let _ = to_client.close().await;
            return;
        }
    };

    let (connection_id, mut inbox) = notifier::register(owner_id);
    loop {
        tokio::select! {
            queued = inbox.recv() => match queued {
                Some(payload) => {
                    if to_client.send(Message::text(payload)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = from_client.next() => match incoming {
                Some(Ok(frame)) => {
                    if frame.is_close() {
                        break;
                    }
                    // client frames other than close are ignored
                }
                _ => break,
            },
        }
    }
    notifier::unregister(owner_id, connection_id);
}
