use super::ingest::RECENT_MESSAGES_LIMIT;
use super::server::HubState;
use crate::events::{EventFilter, SlingshotEvent};
use crate::protocol::{ClientMessage, MessageAck, MessageList, ServerMessage, ShotAck};
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::time::SystemTime;
use tracing::{debug, info, trace, warn};

/// Translate a bus event into the frame every client receives
fn broadcast_frame(event: SlingshotEvent) -> Option<ServerMessage> {
    match event {
        SlingshotEvent::ShotDisplayed(shot) => Some(ServerMessage::DisplayShot(shot)),
        SlingshotEvent::MessageReceived(message) => Some(ServerMessage::ReceiveMessage(message)),
        _ => None,
    }
}

/// Process one text frame and produce the reply for the originator, if any
pub(crate) async fn handle_text(state: &HubState, text: &str) -> Option<ServerMessage> {
    let message = match ClientMessage::parse(text) {
        Ok(Some(message)) => message,
        Ok(None) => {
            debug!("Ignoring unknown event");
            return None;
        }
        Err(e) => {
            debug!("Rejecting malformed frame: {}", e);
            state.hub.stats_handle().record_rejection();
            return Some(ServerMessage::error("Invalid payload"));
        }
    };

    trace!("Handling {} event", message.event_name());

    let reply = match message {
        ClientMessage::ShotFired(submission) => match state.hub.handle_shot(submission).await {
            Ok(ack) => ServerMessage::ShotSuccess(ShotAck {
                message_id: ack.message_id,
            }),
            Err(e) => ServerMessage::error(e.user_message()),
        },
        ClientMessage::SendMessage(submission) => {
            match state.hub.handle_message(submission).await {
                Ok(ack) => ServerMessage::MessageSent(MessageAck {
                    success: true,
                    message_id: ack.message_id,
                }),
                Err(e) => ServerMessage::error(e.user_message()),
            }
        }
        ClientMessage::GetMessages => match state.hub.recent_messages(RECENT_MESSAGES_LIMIT).await {
            Ok(messages) => ServerMessage::AllMessages(MessageList { messages }),
            Err(e) => {
                warn!("Fetching recent messages failed: {}", e);
                ServerMessage::error("Failed to fetch messages")
            }
        },
    };

    Some(reply)
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: &ServerMessage,
) -> Result<(), axum::Error> {
    match frame.to_text() {
        Ok(text) => sink.send(Message::Text(text)).await,
        Err(e) => {
            warn!("Dropping unencodable frame: {}", e);
            Ok(())
        }
    }
}

/// Drive one websocket client until it disconnects or the hub shuts down
pub(crate) async fn serve_connection(socket: WebSocket, state: HubState) {
    let connection_id = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
    let stats = state.hub.stats_handle();
    stats.connection_opened();
    info!("Client {} connected", connection_id);

    let event_bus = state.hub.event_bus().clone();
    let mut broadcasts =
        event_bus.subscribe_filtered(EventFilter::Broadcasts, format!("ws-{}", connection_id));
    let _ = event_bus.publish(SlingshotEvent::ClientConnected {
        connection_id: connection_id.clone(),
        timestamp: SystemTime::now(),
    });

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                debug!("Closing client {} for shutdown", connection_id);
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_text(&state, &text).await {
                            if let Err(e) = send_frame(&mut sink, &reply).await {
                                debug!("Reply to {} failed: {}", connection_id, e);
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Websocket error on {}: {}", connection_id, e);
                        break;
                    }
                }
            }

            event = broadcasts.recv() => {
                match event {
                    Ok(event) => {
                        if let Some(frame) = broadcast_frame(event) {
                            if let Err(e) = send_frame(&mut sink, &frame).await {
                                debug!("Broadcast to {} failed: {}", connection_id, e);
                                break;
                            }
                        }
                    }
                    Err(_) => break,
                }
            }
        }
    }

    stats.connection_closed();
    let _ = event_bus.publish(SlingshotEvent::ClientDisconnected {
        connection_id: connection_id.clone(),
        timestamp: SystemTime::now(),
    });
    info!("Client {} disconnected", connection_id);
}
