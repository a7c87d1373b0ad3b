//! Chain collaborator seam
//!
//! Workflows never talk to a node directly. They submit calls through a
//! contract binding, confirm the resulting [`PendingTx`] through an
//! [`OracleChain`], and receive callbacks from the chain's event stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::ChainError;
use crate::event::CallbackEvent;
use crate::primitives::TxHash;
use crate::token::CorrelationToken;

/// A submitted, not yet confirmed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingTx {
    pub hash: TxHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Failed,
}

/// Confirmation of a mined transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub hash: TxHash,
    pub block_number: u64,
    pub status: TxStatus,

    /// Request id opened by the transaction, if it asked the oracle for work
    pub request_id: Option<CorrelationToken>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == TxStatus::Success
    }
}

/// Chain access needed by the workflow layer
#[async_trait]
pub trait OracleChain: Send + Sync {
    /// Wait for a submitted transaction to be mined
    async fn confirm(&self, tx: &PendingTx) -> Result<Receipt, ChainError>;

    /// New receiver for every callback event emitted from now on
    fn subscribe_events(&self) -> broadcast::Receiver<CallbackEvent>;

    /// Confirm the transaction and return the request id it opened
    async fn await_request_id(&self, tx: &PendingTx) -> Result<CorrelationToken, ChainError> {
        let receipt = self.confirm(tx).await?;
        receipt
            .request_id
            .ok_or(ChainError::NoRequestIssued(receipt.hash))
    }
}
