//! Forked-Chain Node Interface
//!
//! Everything the simulator needs from a forked node, expressed as one
//! capability trait. Any node that can do these things (anvil, hardhat,
//! a test double) is interchangeable.

mod anvil;
#[cfg(test)]
pub mod mock;

pub use anvil::AnvilNode;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::{sol, Panic, Revert, SolError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::retry::{AttemptTimeout, RetryPolicy};

// ============================================
// SOLIDITY INTERFACES
// ============================================

sol! {
    /// Minimal ERC20 surface used for funding and verification
    #[derive(Debug)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function totalSupply() external view returns (uint256);
        function decimals() external view returns (uint8);
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
    }
}

// ============================================
// ERRORS
// ============================================

#[derive(Debug, Clone, Error)]
pub enum NodeError {
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("execution reverted: {reason}")]
    Reverted { reason: String, data: Option<Bytes> },

    #[error("node not ready after {0:?}")]
    Unavailable(Duration),
}

impl AttemptTimeout for NodeError {
    fn attempt_timed_out(operation: &str, after: Duration) -> Self {
        NodeError::Timeout {
            operation: operation.to_string(),
            after,
        }
    }
}

impl NodeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, NodeError::Timeout { .. })
    }
}

/// Default transient-error classifier.
///
/// Timeouts, dropped connections, rate limits and "block not found" are worth
/// another attempt; reverts and everything else are not.
pub fn is_transient(err: &NodeError) -> bool {
    match err {
        NodeError::Timeout { .. } => true,
        NodeError::Transport(_) => true,
        NodeError::Rpc { code, message } => {
            let msg = message.to_ascii_lowercase();
            *code == 429
                || msg.contains("rate limit")
                || msg.contains("too many requests")
                || msg.contains("timeout")
                || msg.contains("timed out")
                || msg.contains("connection reset")
                || msg.contains("block not found")
                || msg.contains("header not found")
        }
        NodeError::Reverted { .. } | NodeError::Unavailable(_) => false,
    }
}

/// Fork resets retry on anything except a block the upstream cannot serve
pub fn is_retryable_reset(err: &NodeError) -> bool {
    match err {
        NodeError::Rpc { message, .. } => {
            let msg = message.to_ascii_lowercase();
            !(msg.contains("invalid block") || msg.contains("not found"))
        }
        NodeError::Reverted { .. } | NodeError::Unavailable(_) => false,
        _ => true,
    }
}

/// Policy for ordinary reads and idempotent writes
pub fn read_policy() -> RetryPolicy<NodeError> {
    RetryPolicy::new(3, is_transient)
        .with_delays(Duration::from_millis(250), Duration::from_secs(2))
        .with_attempt_timeout(Duration::from_secs(30))
}

/// Policy for fork resets: slow, patient, long per-attempt timeout
pub fn fork_reset_policy() -> RetryPolicy<NodeError> {
    RetryPolicy::new(5, is_retryable_reset)
        .with_delays(Duration::from_secs(2), Duration::from_secs(30))
        .with_attempt_timeout(Duration::from_secs(300))
}

/// Human-readable revert reason from raw revert data
///
/// Handles `Error(string)` and `Panic(uint256)`; anything else is shown as hex.
pub fn decode_revert(data: &[u8]) -> String {
    if data.is_empty() {
        return "reverted without reason".to_string();
    }
    if let Ok(revert) = Revert::abi_decode(data) {
        return revert.reason;
    }
    if let Ok(panic) = Panic::abi_decode(data) {
        return format!("panic code 0x{:x}", panic.code);
    }
    format!("custom error 0x{}", hex::encode(data))
}

// ============================================
// RECEIPTS
// ============================================

/// The receipt fields the simulator cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub success: bool,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub block_number: u64,
}

impl TxReceipt {
    /// Native cost actually paid for the transaction
    pub fn gas_paid_wei(&self) -> U256 {
        U256::from(self.gas_used) * U256::from(self.effective_gas_price)
    }
}

// ============================================
// NODE CAPABILITIES
// ============================================

#[async_trait]
pub trait ForkNode: Send + Sync {
    async fn storage_at(&self, address: Address, slot: U256) -> Result<B256, NodeError>;

    async fn set_storage_at(&self, address: Address, slot: U256, value: B256)
        -> Result<(), NodeError>;

    async fn balance(&self, address: Address) -> Result<U256, NodeError>;

    async fn set_balance(&self, address: Address, amount: U256) -> Result<(), NodeError>;

    /// Coarse node-level ERC20 balance override.
    ///
    /// `AnvilNode` sends `tenderly_setErc20Balance`, which only Tenderly forks
    /// serve; on plain anvil this always errors.
    async fn set_erc20_balance(
        &self,
        token: Address,
        holder: Address,
        amount: U256,
    ) -> Result<(), NodeError>;

    /// Privileged mint/deal primitive
    async fn deal_erc20(&self, token: Address, holder: Address, amount: U256)
        -> Result<(), NodeError>;

    async fn impersonate(&self, address: Address) -> Result<(), NodeError>;

    async fn stop_impersonating(&self, address: Address) -> Result<(), NodeError>;

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256, NodeError>;

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceipt, NodeError>;

    async fn block_number(&self) -> Result<u64, NodeError>;

    /// Read-only call, at `block` if given, else at the head
    async fn call(&self, tx: TransactionRequest, block: Option<u64>) -> Result<Bytes, NodeError>;

    async fn code_at(&self, address: Address) -> Result<Bytes, NodeError>;

    async fn snapshot(&self) -> Result<U256, NodeError>;

    /// Roll back to `id`; false if the node did not know the snapshot
    async fn revert_to(&self, id: U256) -> Result<bool, NodeError>;

    /// Re-fork from upstream at `block`
    async fn reset(&self, block: u64) -> Result<(), NodeError>;
}

pub type SharedNode = Arc<dyn ForkNode>;
