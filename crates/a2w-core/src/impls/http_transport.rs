//! HttpDelegationTransport - delegates by calling the peer's `POST /a2w/v1/start`.
//!
//! The forwarded Task Context is sent inside a `payload` envelope signed with
//! this agent's id. The peer's answer envelope is mapped back to a
//! [`DelegationOutcome`]:
//!
//! - `payload` → `Accepted` (the peer registered the task)
//! - `error` with `E013_MISSING_DATA` → `NeedsInput`
//! - `error` with `E001_INTERNAL` → `Failed`
//! - any other `error`, or another message type → `Rejected`

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::envelope::decode;
use crate::domain::{
    A2wError, AgentId, DelegationOutcome, DelegationRequest, Envelope, ErrorCode, Message,
};
use crate::ports::DelegationTransport;

pub struct HttpDelegationTransport {
    client: reqwest::Client,
    peers: HashMap<AgentId, String>,
}

impl HttpDelegationTransport {
    pub fn new(peers: HashMap<AgentId, String>, timeout: Duration) -> Result<Self, A2wError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(timeout)
            .build()
            .map_err(|e| A2wError::Internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, peers })
    }

    fn start_url(&self, peer: &AgentId) -> Result<String, A2wError> {
        let base = self.peers.get(peer).ok_or_else(|| {
            A2wError::ExternalDependency(format!("no address configured for peer {peer}"))
        })?;
        Ok(format!("{}/a2w/v1/start", base.trim_end_matches('/')))
    }
}

/// Maps the delegate's answer envelope to an outcome.
pub fn outcome_from_envelope(envelope: Envelope) -> DelegationOutcome {
    match envelope.message {
        Message::Error(error) => match error.code {
            ErrorCode::MissingData => {
                let required: BTreeSet<String> =
                    serde_json::from_value(error.details["required"].clone()).unwrap_or_default();
                DelegationOutcome::NeedsInput {
                    required,
                    description: error.message,
                }
            }
            ErrorCode::Internal => DelegationOutcome::Failed {
                reason: error.message,
            },
            _ => DelegationOutcome::Rejected {
                reason: format!("{}: {}", error.code, error.message),
            },
        },
        Message::Payload(result) => DelegationOutcome::Accepted {
            result: Some(result),
        },
        other => DelegationOutcome::Rejected {
            reason: format!("unexpected {} answer", other.message_type().as_str()),
        },
    }
}

#[async_trait]
impl DelegationTransport for HttpDelegationTransport {
    async fn dispatch(&self, request: &DelegationRequest) -> Result<DelegationOutcome, A2wError> {
        let url = self.start_url(&request.delegate_to)?;
        let body = serde_json::to_value(&request.task)
            .map_err(|e| A2wError::Internal(format!("encode task context: {e}")))?;
        let envelope = Envelope::encode(&request.from_agent, Message::Payload(body));

        debug!(
            delegation_id = %request.delegation_id,
            delegate_to = %request.delegate_to,
            %url,
            "dispatching delegation"
        );
        let response = self
            .client
            .post(&url)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| A2wError::ExternalDependency(format!("POST {url}: {e}")))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| A2wError::ExternalDependency(format!("read response from {url}: {e}")))?;

        let answer = decode(&bytes).map_err(|e| {
            warn!(%url, %status, error = %e, "delegate answered without an A2W envelope");
            A2wError::ExternalDependency(format!("{url} answered {status} without an envelope"))
        })?;
        Ok(outcome_from_envelope(answer))
    }
}
