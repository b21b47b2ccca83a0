//! Anvil-compatible fork node over JSON-RPC
//!
//! Standard reads go through alloy's typed `Provider` methods and the cheat
//! methods through its `AnvilApi` extension. Only the Tenderly balance
//! override has no typed binding and is sent as a raw request.

use alloy_eips::BlockId;
use alloy_network::Ethereum;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_provider::ext::AnvilApi as _;
use alloy_provider::{
    PendingTransactionBuilder, PendingTransactionError, Provider, RootProvider, WatchTxError,
};
use alloy_rpc_types::anvil::Forking;
use alloy_rpc_types::TransactionRequest;
use alloy_transport::TransportError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::time::Duration;
use tracing::{debug, info};

use super::{decode_revert, ForkNode, NodeError, TxReceipt};

/// Longest we watch for a receipt before calling the transaction stuck
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(300);

/// A forked node (anvil or anything speaking its cheat methods)
pub struct AnvilNode {
    provider: RootProvider<Ethereum>,
    /// Upstream archive RPC the fork is re-created from on reset
    upstream_rpc_url: String,
}

impl AnvilNode {
    pub fn connect(rpc_url: &str, upstream_rpc_url: &str) -> Result<Self, NodeError> {
        let url = rpc_url
            .parse()
            .map_err(|e| NodeError::Transport(format!("invalid fork RPC url {}: {}", rpc_url, e)))?;

        info!("Connecting to fork node at {}", rpc_url);

        Ok(Self {
            provider: RootProvider::new_http(url),
            upstream_rpc_url: upstream_rpc_url.to_string(),
        })
    }
}

/// Turn an alloy transport error into our taxonomy, keeping revert data
fn map_transport_error(method: &str, err: TransportError) -> NodeError {
    if let Some(payload) = err.as_error_resp() {
        if let Some(data) = payload.as_revert_data() {
            return NodeError::Reverted {
                reason: decode_revert(&data),
                data: Some(data),
            };
        }

        let message = payload.message.to_string();
        if message.to_ascii_lowercase().contains("revert") {
            return NodeError::Reverted {
                reason: message,
                data: None,
            };
        }

        return NodeError::Rpc {
            code: payload.code,
            message,
        };
    }

    NodeError::Transport(format!("{}: {}", method, err))
}

fn map_pending_error(err: PendingTransactionError) -> NodeError {
    match err {
        PendingTransactionError::TransportError(e) => {
            map_transport_error("eth_getTransactionReceipt", e)
        }
        PendingTransactionError::TxWatcher(WatchTxError::Timeout) => NodeError::Timeout {
            operation: "eth_getTransactionReceipt".into(),
            after: RECEIPT_TIMEOUT,
        },
        other => NodeError::Transport(format!("eth_getTransactionReceipt: {}", other)),
    }
}

#[async_trait]
impl ForkNode for AnvilNode {
    async fn storage_at(&self, address: Address, slot: U256) -> Result<B256, NodeError> {
        let value = self
            .provider
            .get_storage_at(address, slot)
            .await
            .map_err(|e| map_transport_error("eth_getStorageAt", e))?;
        Ok(B256::from(value))
    }

    async fn set_storage_at(
        &self,
        address: Address,
        slot: U256,
        value: B256,
    ) -> Result<(), NodeError> {
        self.provider
            .anvil_set_storage_at(address, slot, value)
            .await
            .map_err(|e| map_transport_error("anvil_setStorageAt", e))?;
        Ok(())
    }

    async fn balance(&self, address: Address) -> Result<U256, NodeError> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| map_transport_error("eth_getBalance", e))
    }

    async fn set_balance(&self, address: Address, amount: U256) -> Result<(), NodeError> {
        self.provider
            .anvil_set_balance(address, amount)
            .await
            .map_err(|e| map_transport_error("anvil_setBalance", e))
    }

    /// Tenderly virtual testnets serve this; plain anvil answers
    /// "method not found" and the injector moves on.
    async fn set_erc20_balance(
        &self,
        token: Address,
        holder: Address,
        amount: U256,
    ) -> Result<(), NodeError> {
        let params = json!([token, [holder], amount]);
        debug!("tenderly_setErc20Balance {}", params);
        self.provider
            .raw_request::<Value, Value>(Cow::Borrowed("tenderly_setErc20Balance"), params)
            .await
            .map_err(|e| map_transport_error("tenderly_setErc20Balance", e))?;
        Ok(())
    }

    async fn deal_erc20(
        &self,
        token: Address,
        holder: Address,
        amount: U256,
    ) -> Result<(), NodeError> {
        self.provider
            .anvil_deal_erc20(holder, token, amount)
            .await
            .map_err(|e| map_transport_error("anvil_dealERC20", e))
    }

    async fn impersonate(&self, address: Address) -> Result<(), NodeError> {
        self.provider
            .anvil_impersonate_account(address)
            .await
            .map_err(|e| map_transport_error("anvil_impersonateAccount", e))
    }

    async fn stop_impersonating(&self, address: Address) -> Result<(), NodeError> {
        self.provider
            .anvil_stop_impersonating_account(address)
            .await
            .map_err(|e| map_transport_error("anvil_stopImpersonatingAccount", e))
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256, NodeError> {
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| map_transport_error("eth_sendTransaction", e))?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceipt, NodeError> {
        let receipt = PendingTransactionBuilder::new(self.provider.clone(), tx_hash)
            .with_timeout(Some(RECEIPT_TIMEOUT))
            .get_receipt()
            .await
            .map_err(map_pending_error)?;

        Ok(TxReceipt {
            tx_hash,
            success: receipt.status(),
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
            block_number: receipt.block_number.unwrap_or_default(),
        })
    }

    async fn block_number(&self) -> Result<u64, NodeError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| map_transport_error("eth_blockNumber", e))
    }

    async fn call(&self, tx: TransactionRequest, block: Option<u64>) -> Result<Bytes, NodeError> {
        let call = self.provider.call(tx);
        let call = match block {
            Some(number) => call.block(BlockId::number(number)),
            None => call,
        };
        call.await.map_err(|e| map_transport_error("eth_call", e))
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, NodeError> {
        self.provider
            .get_code_at(address)
            .await
            .map_err(|e| map_transport_error("eth_getCode", e))
    }

    async fn snapshot(&self) -> Result<U256, NodeError> {
        self.provider
            .anvil_snapshot()
            .await
            .map_err(|e| map_transport_error("evm_snapshot", e))
    }

    async fn revert_to(&self, id: U256) -> Result<bool, NodeError> {
        self.provider
            .anvil_revert(id)
            .await
            .map_err(|e| map_transport_error("evm_revert", e))
    }

    async fn reset(&self, block: u64) -> Result<(), NodeError> {
        let forking = Forking {
            json_rpc_url: Some(self.upstream_rpc_url.clone()),
            block_number: Some(block),
        };
        self.provider
            .anvil_reset(Some(forking))
            .await
            .map_err(|e| map_transport_error("anvil_reset", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_rejects_bad_url() {
        assert!(AnvilNode::connect("not a url", "http://localhost:8545").is_err());
    }

    #[tokio::test]
    async fn test_live_fork_block_number() {
        // This test requires FORK_RPC_URL to point at a running fork
        let Ok(rpc_url) = std::env::var("FORK_RPC_URL") else {
            return;
        };

        let node = AnvilNode::connect(&rpc_url, &rpc_url).unwrap();
        assert!(node.block_number().await.is_ok());
    }

    #[tokio::test]
    async fn test_live_snapshot_restores_storage() {
        let Ok(rpc_url) = std::env::var("FORK_RPC_URL") else {
            return;
        };

        let node = AnvilNode::connect(&rpc_url, &rpc_url).unwrap();
        let target = Address::repeat_byte(0x5e);
        let slot = U256::from(7);

        let id = node.snapshot().await.unwrap();
        node.set_storage_at(target, slot, B256::repeat_byte(0x11))
            .await
            .unwrap();
        assert_eq!(node.storage_at(target, slot).await.unwrap(), B256::repeat_byte(0x11));

        assert!(node.revert_to(id).await.unwrap());
        assert_eq!(node.storage_at(target, slot).await.unwrap(), B256::ZERO);
    }

    #[test]
    fn test_receipt_watch_timeout_is_a_timeout() {
        let err = map_pending_error(PendingTransactionError::TxWatcher(WatchTxError::Timeout));
        assert!(matches!(err, NodeError::Timeout { after, .. } if after == RECEIPT_TIMEOUT));
        assert!(err.is_timeout());
    }
}
