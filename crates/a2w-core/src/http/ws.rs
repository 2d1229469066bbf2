//! WebSocket push channels: `/ws/status`, `/ws/needs`, `/ws/errors`, `/ws/events`.
//!
//! Each connection holds its own broadcast receiver and a `sub-` id that tags
//! its log lines. A reader that falls
//! behind loses the oldest envelopes and the loss is reported once per gap
//! as a `health_warning` event. Inbound frames are ignored apart from close.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::app::{AgentRuntime, Channel};
use crate::domain::{Envelope, SubscriberId};

pub async fn status(ws: WebSocketUpgrade, State(runtime): State<AgentRuntime>) -> Response {
    upgrade(ws, runtime, Channel::Status)
}

pub async fn needs(ws: WebSocketUpgrade, State(runtime): State<AgentRuntime>) -> Response {
    upgrade(ws, runtime, Channel::Needs)
}

pub async fn errors(ws: WebSocketUpgrade, State(runtime): State<AgentRuntime>) -> Response {
    upgrade(ws, runtime, Channel::Errors)
}

pub async fn events(ws: WebSocketUpgrade, State(runtime): State<AgentRuntime>) -> Response {
    upgrade(ws, runtime, Channel::Events)
}

fn upgrade(ws: WebSocketUpgrade, runtime: AgentRuntime, channel: Channel) -> Response {
    // subscribe before the handshake completes so nothing emitted in between is lost
    let rx = runtime.subscribe(channel);
    ws.on_upgrade(move |socket| handle_socket(socket, runtime, channel, rx))
}

async fn handle_socket(
    socket: WebSocket,
    runtime: AgentRuntime,
    channel: Channel,
    rx: broadcast::Receiver<Envelope>,
) {
    let subscriber = runtime.next_subscriber_id();
    info!(channel = channel.as_str(), %subscriber, "subscriber connected");
    let (sender, receiver) = socket.split();

    let mut send_task = tokio::spawn(forward(sender, rx, runtime, channel, subscriber.clone()));
    let mut recv_task = tokio::spawn(drain(receiver, channel, subscriber.clone()));

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!(channel = channel.as_str(), %subscriber, "subscriber disconnected");
}

async fn forward(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: broadcast::Receiver<Envelope>,
    runtime: AgentRuntime,
    channel: Channel,
    subscriber: SubscriberId,
) {
    loop {
        match rx.recv().await {
            Ok(envelope) => {
                let json = match envelope.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(
                            channel = channel.as_str(),
                            %subscriber,
                            error = %e,
                            "dropping unencodable envelope"
                        );
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(json.into())).await {
                    debug!(channel = channel.as_str(), %subscriber, error = %e, "send failed");
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(channel = channel.as_str(), %subscriber, skipped, "subscriber lagged");
                runtime.broadcaster().health_warning(
                    lag_component(channel, &subscriber),
                    format!("subscriber fell behind; {skipped} messages dropped"),
                );
            }
            Err(RecvError::Closed) => break,
        }
    }
    let _ = sender.send(Message::Close(None)).await;
}

async fn drain(mut receiver: SplitStream<WebSocket>, channel: Channel, subscriber: SubscriberId) {
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(channel = channel.as_str(), %subscriber, error = %e, "socket error");
                break;
            }
        }
    }
}

/// `health_warning` component naming the lagging connection.
fn lag_component(channel: Channel, subscriber: &SubscriberId) -> String {
    format!("ws/{}/{}", channel.as_str(), subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RuntimeBuilder, RuntimeConfig};

    #[test]
    fn lag_component_names_channel_and_connection() {
        let runtime = RuntimeBuilder::new(RuntimeConfig::default()).build().unwrap();
        let first = runtime.next_subscriber_id();
        let second = runtime.next_subscriber_id();
        assert_ne!(first, second);
        assert!(first.as_str().starts_with("sub-"));

        let component = lag_component(Channel::Errors, &first);
        assert_eq!(component, format!("ws/errors/{first}"));
    }
}
