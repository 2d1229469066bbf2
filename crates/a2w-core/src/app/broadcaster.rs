//! Status Broadcaster - fans emitted envelopes out to subscribers.
//!
//! One `tokio::sync::broadcast` channel per WebSocket channel. Each subscriber
//! gets its own bounded buffer; when it falls behind, the oldest messages are
//! dropped for that subscriber only (`RecvError::Lagged`). `emit` never
//! waits, so a slow reader cannot hold up an FSM transition.
//!
//! Every envelope is also sent on an internal channel drained by the log
//! sink into the `ReportStore`.

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::{AgentEvent, AgentId, AgentRecord, Envelope, Message, MessageType};
use crate::ports::{Clock, ReportStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Status,
    Needs,
    Errors,
    Events,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Status, Channel::Needs, Channel::Errors, Channel::Events];

    /// Channel a message type is pushed on; `payload` messages are replies only.
    pub fn for_message(message_type: MessageType) -> Option<Channel> {
        match message_type {
            MessageType::StatusUpdate => Some(Channel::Status),
            MessageType::NeedData => Some(Channel::Needs),
            MessageType::Error => Some(Channel::Errors),
            MessageType::Event => Some(Channel::Events),
            MessageType::Payload => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Status => "status",
            Channel::Needs => "needs",
            Channel::Errors => "errors",
            Channel::Events => "events",
        }
    }
}

pub struct StatusBroadcaster {
    agent: Arc<AgentRecord>,
    clock: Arc<dyn Clock>,
    status: broadcast::Sender<Envelope>,
    needs: broadcast::Sender<Envelope>,
    errors: broadcast::Sender<Envelope>,
    events: broadcast::Sender<Envelope>,
    all: broadcast::Sender<Envelope>,
}

impl StatusBroadcaster {
    /// `capacity` is the per-subscriber buffer size.
    pub fn new(agent: Arc<AgentRecord>, clock: Arc<dyn Clock>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            agent,
            clock,
            status: broadcast::channel(capacity).0,
            needs: broadcast::channel(capacity).0,
            errors: broadcast::channel(capacity).0,
            events: broadcast::channel(capacity).0,
            all: broadcast::channel(capacity.saturating_mul(4)).0,
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        self.agent.agent_id()
    }

    fn sender(&self, channel: Channel) -> &broadcast::Sender<Envelope> {
        match channel {
            Channel::Status => &self.status,
            Channel::Needs => &self.needs,
            Channel::Errors => &self.errors,
            Channel::Events => &self.events,
        }
    }

    pub fn subscribe(&self, channel: Channel) -> broadcast::Receiver<Envelope> {
        self.sender(channel).subscribe()
    }

    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.sender(channel).receiver_count()
    }

    /// Wraps `message` in an envelope and pushes it on its channel.
    pub fn emit(&self, message: Message) -> Envelope {
        let envelope = Envelope::encode(self.agent.agent_id(), message);
        if let Some(channel) = Channel::for_message(envelope.message_type()) {
            // send only fails when nobody is subscribed
            let delivered = self.sender(channel).send(envelope.clone()).unwrap_or(0);
            debug!(channel = channel.as_str(), delivered, "broadcast");
        }
        let _ = self.all.send(envelope.clone());
        envelope
    }

    pub fn emit_event(&self, event: AgentEvent) -> Envelope {
        self.emit(Message::Event(event))
    }

    pub fn health_warning(&self, component: impl Into<String>, message: impl Into<String>) {
        self.emit_event(AgentEvent::HealthWarning {
            component: component.into(),
            message: message.into(),
            timestamp: self.clock.now(),
        });
    }

    /// Drains every emitted envelope into `store` until the broadcaster is dropped.
    pub fn spawn_log_sink(&self, store: Arc<dyn ReportStore>) -> JoinHandle<()> {
        let mut rx = self.all.subscribe();
        let clock = Arc::clone(&self.clock);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if let Err(e) = store.append_log(envelope, clock.now()).await {
                            warn!(error = %e, "failed to append log entry");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "log sink lagged; entries dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
