//! DelegationTransport port - hands a delegation request to the peer agent.

use async_trait::async_trait;

use crate::domain::{A2wError, DelegationOutcome, DelegationRequest};

#[async_trait]
pub trait DelegationTransport: Send + Sync {
    /// Sends `request` to `request.delegate_to` and reports its answer.
    ///
    /// `Err` means the peer could not be reached or answered with something
    /// that is not an A2W envelope.
    async fn dispatch(&self, request: &DelegationRequest) -> Result<DelegationOutcome, A2wError>;
}
