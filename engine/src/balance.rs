//! Zero-balance gate consulted before a restored account overwrites local
//! wallet state.

use std::sync::Arc;

use crate::collab::ChainClient;
use crate::error::RecoveryError;

/// Read-through balance check for a candidate recovered address.
pub struct BalanceGate {
    chain: Arc<dyn ChainClient>,
}

impl BalanceGate {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self { chain }
    }

    /// Whether the candidate address holds any funds. Query failures
    /// propagate; a failed lookup is never reported as a zero balance, which
    /// would falsely warn a user who in fact has funds.
    pub async fn check(&self, address: &str) -> Result<bool, RecoveryError> {
        let balance = self.chain.balance(address).await?;
        tracing::debug!(%address, balance = %balance, "chain balance checked");
        Ok(balance > 0)
    }
}
