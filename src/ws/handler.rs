//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::{Command, CommandSender, Outbox};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{self, ClientMsg, ParticipantId, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let id = state.ids.next();
    info!(participant_id = id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        participant_id: id,
        room_id: state.config.room_id.clone(),
        server_time: unix_millis(),
    };

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(participant_id = id, error = %e, "Failed to send welcome");
        return;
    }

    let outbound = state.outbox.register(id);

    run_session(id, ws_sink, ws_stream, outbound, &state.commands, &state.outbox).await;

    // Disconnect is a command like any other
    state.commands.submit(Command::Leave { id });
    state.outbox.unregister(id);

    info!(participant_id = id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    id: ParticipantId,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut outbound: mpsc::UnboundedReceiver<ServerMsg>,
    commands: &CommandSender,
    outbox: &Outbox,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    // Writer task: outbox -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(participant_id = id, error = %e, "WebSocket send failed");
                break;
            }
        }
        debug!(participant_id = id, "Outbound channel closed");
    });

    // Reader loop: WebSocket -> command queue
    while let Some(result) = ws_stream.next().await {
        let decoded = match result {
            Ok(Message::Text(text)) => protocol::decode(&text),
            Ok(Message::Binary(bytes)) => protocol::decode_bytes(&bytes),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => {
                info!(participant_id = id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(participant_id = id, error = %e, "WebSocket error");
                break;
            }
        };

        if !rate_limiter.check_input() {
            warn!(participant_id = id, "Rate limited input message");
            continue;
        }

        match decoded {
            Ok(msg) => {
                if !route_client_msg(id, msg, commands, outbox) {
                    debug!(participant_id = id, "Command queue closed");
                    break;
                }
            }
            Err(e) => {
                warn!(participant_id = id, error = %e, "Failed to parse client message");
            }
        }
    }

    writer_handle.abort();
}

/// Answer pings locally and queue everything else.
/// Returns false once the command queue is gone.
fn route_client_msg(
    id: ParticipantId,
    msg: ClientMsg,
    commands: &CommandSender,
    outbox: &Outbox,
) -> bool {
    if let ClientMsg::Ping { t } = msg {
        outbox.send_to(id, ServerMsg::Pong { t });
        return true;
    }
    match Command::from_client(id, msg) {
        Some(command) => commands.submit(command),
        None => true,
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = protocol::encode(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::channel;
    use crate::ws::protocol::AimTrend;

    #[test]
    fn pings_are_answered_without_the_queue() {
        let (commands, mut rx) = channel();
        let outbox = Outbox::new();
        let mut inbox = outbox.register(3);

        assert!(route_client_msg(3, ClientMsg::Ping { t: 99 }, &commands, &outbox));
        assert_eq!(inbox.try_recv().unwrap(), ServerMsg::Pong { t: 99 });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn game_messages_become_commands_for_the_sender() {
        let (commands, mut rx) = channel();
        let outbox = Outbox::new();

        let aim = ClientMsg::Aim {
            trend: AimTrend::Increasing,
        };
        assert!(route_client_msg(3, aim, &commands, &outbox));
        assert_eq!(
            rx.try_recv().unwrap(),
            Command::Aim {
                id: 3,
                trend: AimTrend::Increasing
            }
        );

        drop(rx);
        assert!(!route_client_msg(3, ClientMsg::Leave, &commands, &outbox));
    }
}
