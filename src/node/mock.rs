//! In-memory fork node for tests
//!
//! Emulates just enough of an EVM fork to exercise the simulator: raw
//! storage, native balances, ERC20 `balanceOf` over configurable storage
//! layouts, snapshots, resets and scripted swap routers.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::{Revert, SolCall, SolError, SolValue};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{ForkNode, NodeError, TxReceipt, IERC20};
use crate::injector::slots::{mapping_key, KeyLayout};

/// Where a mock token keeps (or pretends to keep) balances
#[derive(Debug, Clone, Copy)]
pub enum MockLayout {
    /// `balances[holder]` at `mapping_key(holder, slot, key)`
    Mapping { slot: U256, key: KeyLayout },

    /// Like `Mapping`, but balances above the raw total-supply slot read as zero
    SupplyBounded {
        slot: U256,
        supply_slot: U256,
    },

    /// `balanceOf` ignores storage entirely
    Opaque,
}

/// Behaviour of the node-level balance-set primitive for a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegedSet {
    /// Method not supported by the node
    Unsupported,
    /// Writes the real balance mapping
    Works,
    /// Writes a slot-0 mapping entry the token never reads
    WritesWrongSlot,
}

#[derive(Debug, Clone)]
pub struct MockToken {
    pub layout: MockLayout,
    pub decimals: u8,
    pub privileged_set: PrivilegedSet,
    pub dealable: bool,
}

impl MockToken {
    pub fn mapping(slot: u64) -> Self {
        Self {
            layout: MockLayout::Mapping {
                slot: U256::from(slot),
                key: KeyLayout::HolderFirst,
            },
            decimals: 18,
            privileged_set: PrivilegedSet::Unsupported,
            dealable: false,
        }
    }

    pub fn with_layout(mut self, layout: MockLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = decimals;
        self
    }

    pub fn with_privileged_set(mut self, behaviour: PrivilegedSet) -> Self {
        self.privileged_set = behaviour;
        self
    }

    pub fn dealable(mut self) -> Self {
        self.dealable = true;
        self
    }

    fn balance_key(&self, holder: Address) -> Option<U256> {
        match self.layout {
            MockLayout::Mapping { slot, key } => Some(mapping_key(holder, slot, key)),
            MockLayout::SupplyBounded { slot, .. } => {
                Some(mapping_key(holder, slot, KeyLayout::HolderFirst))
            }
            MockLayout::Opaque => None,
        }
    }
}

/// A router that pays out a fixed amount, or reverts
#[derive(Debug, Clone)]
pub struct MockRouter {
    pub token_out: Address,
    pub amount_out: U256,
    pub gas_used: u64,
    pub revert_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ChainState {
    storage: HashMap<(Address, U256), B256>,
    balances: HashMap<Address, U256>,
}

#[derive(Default)]
struct Inner {
    state: ChainState,
    pristine: Option<ChainState>,
    snapshots: Vec<(U256, ChainState)>,
    next_snapshot: u64,
    head: u64,
    tokens: HashMap<Address, MockToken>,
    routers: HashMap<Address, MockRouter>,
    code: HashSet<Address>,
    impersonated: HashSet<Address>,
    receipts: HashMap<B256, TxReceipt>,
    router_txs: HashSet<B256>,
    sent: Vec<TransactionRequest>,
    storage_writes: usize,
    resets: Vec<u64>,
    receipt_timeouts: u32,
    reset_failures: Vec<NodeError>,
    send_failures: Vec<NodeError>,
    failing_write: Option<usize>,
    forget_snapshots: bool,
    effective_gas_price: u128,
}

pub struct MockNode {
    inner: Mutex<Inner>,
}

impl Default for MockNode {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNode {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                head: 1,
                effective_gas_price: 1_000_000_000,
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    // ========== Setup ==========

    pub fn add_token(&self, address: Address, token: MockToken) {
        let mut inner = self.lock();
        inner.code.insert(address);
        inner.tokens.insert(address, token);
    }

    pub fn add_router(&self, address: Address, router: MockRouter) {
        let mut inner = self.lock();
        inner.code.insert(address);
        inner.routers.insert(address, router);
    }

    pub fn put_storage(&self, address: Address, slot: U256, value: B256) {
        self.lock().store(address, slot, value);
    }

    /// Next `count` swap receipt waits time out (the swap still lands)
    pub fn time_out_receipts(&self, count: u32) {
        self.lock().receipt_timeouts = count;
    }

    /// Queue errors returned by the next resets, in order
    pub fn fail_resets(&self, errors: Vec<NodeError>) {
        self.lock().reset_failures = errors;
    }

    /// Queue errors returned by the next swap submissions (router targets only)
    pub fn fail_swap_sends(&self, errors: Vec<NodeError>) {
        self.lock().send_failures = errors;
    }

    /// The `nth` storage write from now is rejected (1 = the next one)
    pub fn reject_storage_write(&self, nth: usize) {
        let mut inner = self.lock();
        inner.failing_write = Some(inner.storage_writes + nth);
    }

    /// `revert_to` answers false, as a node that dropped its snapshots would
    pub fn forget_snapshots(&self) {
        self.lock().forget_snapshots = true;
    }

    pub fn is_impersonating(&self, address: Address) -> bool {
        self.lock().impersonated.contains(&address)
    }

    // ========== Inspection ==========

    pub fn storage_writes(&self) -> usize {
        self.lock().storage_writes
    }

    pub fn storage_dump(&self) -> HashMap<(Address, U256), B256> {
        self.lock().state.storage.clone()
    }

    pub fn resets(&self) -> Vec<u64> {
        self.lock().resets.clone()
    }

    pub fn sent_transactions(&self) -> Vec<TransactionRequest> {
        self.lock().sent.clone()
    }

    pub fn token_balance(&self, token: Address, holder: Address) -> U256 {
        let inner = self.lock();
        inner.erc20_balance(token, holder)
    }

    /// Whether `owner` sent any transaction to `token` (approvals)
    pub fn sent_to(&self, token: Address, owner: Address) -> bool {
        self.lock()
            .sent
            .iter()
            .any(|tx| tx.from == Some(owner) && target_of(tx) == Some(token))
    }
}

impl Inner {
    fn read(&self, address: Address, slot: U256) -> U256 {
        self.state
            .storage
            .get(&(address, slot))
            .map(|v| U256::from_be_bytes(v.0))
            .unwrap_or_default()
    }

    fn write(&mut self, address: Address, slot: U256, value: U256) {
        self.store(address, slot, B256::from(value));
    }

    /// Zero words are dropped so untouched and restored storage compare equal
    fn store(&mut self, address: Address, slot: U256, value: B256) {
        if value == B256::ZERO {
            self.state.storage.remove(&(address, slot));
        } else {
            self.state.storage.insert((address, slot), value);
        }
    }

    fn erc20_balance(&self, token: Address, holder: Address) -> U256 {
        let Some(config) = self.tokens.get(&token) else {
            return U256::ZERO;
        };
        match config.layout {
            MockLayout::Mapping { .. } => config
                .balance_key(holder)
                .map(|key| self.read(token, key))
                .unwrap_or_default(),
            MockLayout::SupplyBounded { supply_slot, .. } => {
                let raw = config
                    .balance_key(holder)
                    .map(|key| self.read(token, key))
                    .unwrap_or_default();
                if raw > self.read(token, supply_slot) {
                    U256::ZERO
                } else {
                    raw
                }
            }
            MockLayout::Opaque => U256::ZERO,
        }
    }

    fn credit(&mut self, token: Address, holder: Address, amount: U256) {
        if token == Address::ZERO {
            let balance = self.state.balances.entry(holder).or_default();
            *balance += amount;
            return;
        }
        let key = self.tokens.get(&token).and_then(|t| t.balance_key(holder));
        if let Some(key) = key {
            let current = self.read(token, key);
            self.write(token, key, current + amount);
        }
    }

    fn total_supply(&self, token: Address) -> U256 {
        let slot = self.tokens.get(&token).and_then(|t| match t.layout {
            MockLayout::SupplyBounded { supply_slot, .. } => Some(supply_slot),
            _ => None,
        });
        slot.map(|s| self.read(token, s)).unwrap_or_default()
    }

    fn mine(&mut self, tx_hash: B256, from: Address, success: bool, gas_used: u64) -> TxReceipt {
        let fee = U256::from(gas_used) * U256::from(self.effective_gas_price);
        let balance = self.state.balances.entry(from).or_default();
        *balance = balance.saturating_sub(fee);

        self.head += 1;
        let receipt = TxReceipt {
            tx_hash,
            success,
            gas_used,
            effective_gas_price: self.effective_gas_price,
            block_number: self.head,
        };
        self.receipts.insert(tx_hash, receipt.clone());
        receipt
    }
}

fn target_of(tx: &TransactionRequest) -> Option<Address> {
    tx.to.and_then(|kind| kind.to().copied())
}

fn input_of(tx: &TransactionRequest) -> Bytes {
    tx.input.input().cloned().unwrap_or_default()
}

fn unsupported(method: &str) -> NodeError {
    NodeError::Rpc {
        code: -32601,
        message: format!("the method {} does not exist/is not available", method),
    }
}

#[async_trait]
impl ForkNode for MockNode {
    async fn storage_at(&self, address: Address, slot: U256) -> Result<B256, NodeError> {
        Ok(B256::from(self.lock().read(address, slot)))
    }

    async fn set_storage_at(
        &self,
        address: Address,
        slot: U256,
        value: B256,
    ) -> Result<(), NodeError> {
        let mut inner = self.lock();
        inner.storage_writes += 1;
        if inner.failing_write == Some(inner.storage_writes) {
            return Err(NodeError::Rpc {
                code: -32000,
                message: "storage write rejected".into(),
            });
        }
        inner.store(address, slot, value);
        Ok(())
    }

    async fn balance(&self, address: Address) -> Result<U256, NodeError> {
        Ok(self
            .lock()
            .state
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn set_balance(&self, address: Address, amount: U256) -> Result<(), NodeError> {
        self.lock().state.balances.insert(address, amount);
        Ok(())
    }

    async fn set_erc20_balance(
        &self,
        token: Address,
        holder: Address,
        amount: U256,
    ) -> Result<(), NodeError> {
        let mut inner = self.lock();
        let Some(config) = inner.tokens.get(&token).cloned() else {
            return Err(unsupported("tenderly_setErc20Balance"));
        };
        match config.privileged_set {
            PrivilegedSet::Unsupported => Err(unsupported("tenderly_setErc20Balance")),
            PrivilegedSet::Works => {
                if let Some(key) = config.balance_key(holder) {
                    inner.write(token, key, amount);
                }
                Ok(())
            }
            PrivilegedSet::WritesWrongSlot => {
                let key = mapping_key(holder, U256::ZERO, KeyLayout::HolderFirst);
                inner.write(token, key, amount);
                Ok(())
            }
        }
    }

    async fn deal_erc20(
        &self,
        token: Address,
        holder: Address,
        amount: U256,
    ) -> Result<(), NodeError> {
        let mut inner = self.lock();
        if !inner.impersonated.contains(&holder) {
            return Err(NodeError::Rpc {
                code: -32000,
                message: "holder is not impersonated".into(),
            });
        }
        let config = inner.tokens.get(&token).cloned();
        match config {
            Some(config) if config.dealable => {
                if let Some(key) = config.balance_key(holder) {
                    inner.write(token, key, amount);
                }
                Ok(())
            }
            _ => Err(unsupported("anvil_dealERC20")),
        }
    }

    async fn impersonate(&self, address: Address) -> Result<(), NodeError> {
        self.lock().impersonated.insert(address);
        Ok(())
    }

    async fn stop_impersonating(&self, address: Address) -> Result<(), NodeError> {
        self.lock().impersonated.remove(&address);
        Ok(())
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256, NodeError> {
        let mut inner = self.lock();
        let from = tx.from.unwrap_or_default();
        if !inner.impersonated.contains(&from) {
            return Err(NodeError::Rpc {
                code: -32000,
                message: format!("no signer available for {}", from),
            });
        }

        let target = target_of(&tx).unwrap_or_default();
        if inner.routers.contains_key(&target) && !inner.send_failures.is_empty() {
            return Err(inner.send_failures.remove(0));
        }

        let input = input_of(&tx);
        inner.sent.push(tx.clone());
        let tx_hash = keccak256((inner.sent.len() as u64, target, input.clone()).abi_encode());

        if inner.tokens.contains_key(&target) {
            // Approvals and other token calls just succeed
            inner.mine(tx_hash, from, true, 46_000);
        } else if let Some(router) = inner.routers.get(&target).cloned() {
            inner.router_txs.insert(tx_hash);
            if router.revert_reason.is_some() {
                inner.mine(tx_hash, from, false, router.gas_used);
            } else {
                inner.credit(router.token_out, from, router.amount_out);
                inner.mine(tx_hash, from, true, router.gas_used);
            }
        } else {
            inner.mine(tx_hash, from, true, 21_000);
        }

        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceipt, NodeError> {
        let mut inner = self.lock();
        if inner.receipt_timeouts > 0 && inner.router_txs.contains(&tx_hash) {
            inner.receipt_timeouts -= 1;
            return Err(NodeError::Timeout {
                operation: "eth_getTransactionReceipt".into(),
                after: std::time::Duration::from_secs(300),
            });
        }
        inner.receipts.get(&tx_hash).cloned().ok_or(NodeError::Rpc {
            code: -32000,
            message: "transaction not found".into(),
        })
    }

    async fn block_number(&self) -> Result<u64, NodeError> {
        Ok(self.lock().head)
    }

    async fn call(&self, tx: TransactionRequest, _block: Option<u64>) -> Result<Bytes, NodeError> {
        let inner = self.lock();
        let target = target_of(&tx).unwrap_or_default();
        let input = input_of(&tx);

        if let Some(token) = inner.tokens.get(&target) {
            if let Ok(call) = IERC20::balanceOfCall::abi_decode(&input) {
                return Ok(inner.erc20_balance(target, call.account).abi_encode().into());
            }
            if IERC20::totalSupplyCall::abi_decode(&input).is_ok() {
                return Ok(inner.total_supply(target).abi_encode().into());
            }
            if IERC20::decimalsCall::abi_decode(&input).is_ok() {
                return Ok(U256::from(token.decimals).abi_encode().into());
            }
            return Err(NodeError::Reverted {
                reason: "unknown selector".into(),
                data: None,
            });
        }

        if let Some(router) = inner.routers.get(&target) {
            if let Some(reason) = &router.revert_reason {
                let data = Revert {
                    reason: reason.clone(),
                }
                .abi_encode();
                return Err(NodeError::Reverted {
                    reason: reason.clone(),
                    data: Some(data.into()),
                });
            }
        }

        Ok(Bytes::new())
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, NodeError> {
        if self.lock().code.contains(&address) {
            Ok(Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]))
        } else {
            Ok(Bytes::new())
        }
    }

    async fn snapshot(&self) -> Result<U256, NodeError> {
        let mut inner = self.lock();
        inner.next_snapshot += 1;
        let id = U256::from(inner.next_snapshot);
        let state = inner.state.clone();
        inner.snapshots.push((id, state));
        Ok(id)
    }

    async fn revert_to(&self, id: U256) -> Result<bool, NodeError> {
        let mut inner = self.lock();
        if inner.forget_snapshots {
            return Ok(false);
        }
        let Some(pos) = inner.snapshots.iter().position(|(sid, _)| *sid == id) else {
            return Ok(false);
        };
        let (_, state) = inner.snapshots[pos].clone();
        inner.snapshots.truncate(pos);
        inner.state = state;
        Ok(true)
    }

    async fn reset(&self, block: u64) -> Result<(), NodeError> {
        let mut inner = self.lock();
        if !inner.reset_failures.is_empty() {
            return Err(inner.reset_failures.remove(0));
        }
        if inner.pristine.is_none() {
            inner.pristine = Some(inner.state.clone());
        }
        inner.state = inner.pristine.clone().unwrap_or_default();
        inner.snapshots.clear();
        inner.impersonated.clear();
        inner.head = block;
        inner.resets.push(block);
        Ok(())
    }
}
