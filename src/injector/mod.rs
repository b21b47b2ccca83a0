//! Balance Injector - Force ERC20 Balances Into a Forked Chain
//!
//! Tokens don't publish their storage layout, so the injector tries an ordered
//! chain of strategies until `balanceOf(holder)` reports the amount:
//!
//! 1. Direct slot search over common mapping slots
//! 2. Node-level ERC20 balance override
//! 3. Impersonate + privileged deal
//! 4. ERC-7201 namespaced storage
//! 5. Exhaustive sentinel scan of slots 0..=255
//! 6. Total-supply co-adjustment
//! 7. Reversed key order (proxies only)
//!
//! Every failed attempt puts storage back exactly as it found it. Slots that
//! work are remembered for the rest of the run.

pub mod cache;
pub mod slots;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::node::{read_policy, NodeError, SharedNode, IERC20};
use crate::retry::{RetryExecutor, RetryPolicyError};
use cache::BalanceSlotCache;
use slots::{
    erc7201_root, implementation_from_word, BalanceSlot, ProxyRecord, DEFAULT_SUPPLY_SLOTS,
    DIRECT_CANDIDATES, OZ_ERC20_NAMESPACE, PROXY_SLOTS, SCAN_LIMIT, SENTINEL, SUPPLY_SCAN_LIMIT,
};

/// The only hard failure: we changed storage and could not put it back
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("failed to restore storage of {token} after a miss: {source}")]
    RestoreFailed {
        token: Address,
        #[source]
        source: NodeError,
    },
}

// ============================================
// STRATEGY CHAIN
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    DirectSlot,
    PrivilegedSet,
    ImpersonateDeal,
    Namespaced,
    SentinelScan,
    SupplyAdjust,
    ReversedKey,
}

impl Strategy {
    /// Tried in this order, first success wins
    pub const CHAIN: [Strategy; 7] = [
        Strategy::DirectSlot,
        Strategy::PrivilegedSet,
        Strategy::ImpersonateDeal,
        Strategy::Namespaced,
        Strategy::SentinelScan,
        Strategy::SupplyAdjust,
        Strategy::ReversedKey,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::DirectSlot => "direct-slot",
            Strategy::PrivilegedSet => "privileged-set",
            Strategy::ImpersonateDeal => "impersonate-deal",
            Strategy::Namespaced => "erc7201",
            Strategy::SentinelScan => "sentinel-scan",
            Strategy::SupplyAdjust => "supply-adjust",
            Strategy::ReversedKey => "reversed-key",
        }
    }
}

/// How a written slot is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verify {
    /// A confirmed slot only has to fund the holder
    AtLeast,
    /// During a search the balance must be exactly what was written
    Exact,
}

impl Verify {
    fn accepts(self, balance: U256, amount: U256) -> bool {
        match self {
            Verify::AtLeast => balance >= amount,
            Verify::Exact => balance == amount,
        }
    }
}

// ============================================
// INJECTOR
// ============================================

pub struct BalanceInjector {
    node: SharedNode,
    retry: RetryExecutor<NodeError>,
    cache: BalanceSlotCache,
    settle_delay: Duration,
}

impl BalanceInjector {
    pub fn new(node: SharedNode, settle_delay: Duration) -> Result<Self, RetryPolicyError> {
        Ok(Self {
            node,
            retry: RetryExecutor::new(read_policy())?,
            cache: BalanceSlotCache::new(),
            settle_delay,
        })
    }

    pub fn cache(&self) -> &BalanceSlotCache {
        &self.cache
    }

    /// Set the holder's native balance
    pub async fn fund_native(&self, holder: Address, amount: U256) -> Result<(), NodeError> {
        self.retry
            .run("anvil_setBalance", || self.node.set_balance(holder, amount))
            .await?;
        self.settle().await;
        Ok(())
    }

    /// Make `balanceOf(holder) >= amount` on `token`.
    ///
    /// `Ok(false)` means every strategy missed; storage is as it was. A holder
    /// that already has `amount` is left alone unless a slot is cached.
    pub async fn inject(
        &self,
        token: Address,
        holder: Address,
        amount: U256,
    ) -> Result<bool, InjectError> {
        if let Some(slot) = self.cache.get(&token) {
            if self.try_mapping(token, holder, amount, slot, Verify::AtLeast).await? {
                debug!("Cached slot {} still works for {:?}", slot.index, token);
                return Ok(true);
            }
            warn!(
                "Cached slot {} for {:?} no longer verifies, running full search",
                slot.index, token
            );
        }

        // Searching needs a balance the write will visibly change
        match self.balance_of(token, holder).await {
            Ok(current) if current >= amount => {
                debug!("{:?} already holds {} of {:?}", holder, current, token);
                return Ok(true);
            }
            Ok(_) => {}
            Err(e) => warn!("balanceOf on {:?} failed before injecting: {}", token, e),
        }

        let proxy = self.detect_proxy(token).await;

        for strategy in Strategy::CHAIN {
            if strategy == Strategy::ReversedKey && proxy.is_none() {
                continue;
            }

            debug!("Trying {} on {:?}", strategy.name(), token);
            if self.run_strategy(strategy, token, holder, amount).await? {
                info!(
                    "💉 Injected {} of {:?} via {}",
                    amount,
                    token,
                    strategy.name()
                );
                return Ok(true);
            }
        }

        warn!("All balance strategies exhausted for {:?}", token);
        Ok(false)
    }

    async fn run_strategy(
        &self,
        strategy: Strategy,
        token: Address,
        holder: Address,
        amount: U256,
    ) -> Result<bool, InjectError> {
        match strategy {
            Strategy::DirectSlot => {
                self.try_candidates(token, holder, amount, BalanceSlot::standard)
                    .await
            }
            Strategy::PrivilegedSet | Strategy::ImpersonateDeal => {
                self.try_in_snapshot(strategy, token, holder, amount).await
            }
            Strategy::Namespaced => {
                let slot = BalanceSlot::standard(erc7201_root(OZ_ERC20_NAMESPACE));
                let found = self
                    .try_mapping(token, holder, amount, slot, Verify::Exact)
                    .await?;
                if found {
                    self.cache.confirm(token, slot);
                }
                Ok(found)
            }
            Strategy::SentinelScan => self.sentinel_scan(token, holder, amount).await,
            Strategy::SupplyAdjust => self.supply_adjust(token, holder, amount).await,
            Strategy::ReversedKey => {
                self.try_candidates(token, holder, amount, BalanceSlot::reversed)
                    .await
            }
        }
    }

    // ========== Strategies ==========

    async fn try_candidates(
        &self,
        token: Address,
        holder: Address,
        amount: U256,
        make_slot: fn(U256) -> BalanceSlot,
    ) -> Result<bool, InjectError> {
        for index in DIRECT_CANDIDATES {
            let slot = make_slot(U256::from(index));
            if self
                .try_mapping(token, holder, amount, slot, Verify::Exact)
                .await?
            {
                self.cache.confirm(token, slot);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Node primitives that may touch arbitrary storage, bracketed by a snapshot
    async fn try_in_snapshot(
        &self,
        strategy: Strategy,
        token: Address,
        holder: Address,
        amount: U256,
    ) -> Result<bool, InjectError> {
        let snapshot = match self.retry.run("evm_snapshot", || self.node.snapshot()).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Snapshot failed, skipping {}: {}", strategy.name(), e);
                return Ok(false);
            }
        };

        let applied = match strategy {
            Strategy::PrivilegedSet => self.node.set_erc20_balance(token, holder, amount).await,
            _ => self.deal_as(token, holder, amount).await,
        };

        let verified = match applied {
            Ok(()) => {
                self.settle().await;
                self.balance_of(token, holder)
                    .await
                    .map(|balance| balance >= amount)
                    .unwrap_or(false)
            }
            Err(e) => {
                debug!("{} unavailable for {:?}: {}", strategy.name(), token, e);
                false
            }
        };

        if verified {
            return Ok(true);
        }

        match self.node.revert_to(snapshot).await {
            Ok(true) => Ok(false),
            Ok(false) => Err(InjectError::RestoreFailed {
                token,
                source: NodeError::Rpc {
                    code: 0,
                    message: format!("snapshot {} unknown to node", snapshot),
                },
            }),
            Err(source) => Err(InjectError::RestoreFailed { token, source }),
        }
    }

    async fn deal_as(&self, token: Address, holder: Address, amount: U256) -> Result<(), NodeError> {
        self.node.impersonate(holder).await?;
        let dealt = self.node.deal_erc20(token, holder, amount).await;
        let stopped = self.node.stop_impersonating(holder).await;
        dealt.and(stopped)
    }

    /// Write a sentinel to every low slot; exact `balanceOf` equality marks the mapping
    async fn sentinel_scan(
        &self,
        token: Address,
        holder: Address,
        amount: U256,
    ) -> Result<bool, InjectError> {
        for index in 0..=SCAN_LIMIT {
            let slot = BalanceSlot::standard(U256::from(index));
            let key = slot.key_for(holder);

            let Ok(original) = self.read_slot(token, key).await else {
                continue;
            };
            let written = self.write_slot(token, key, B256::from(SENTINEL)).await;
            let hit = match written {
                Ok(()) => matches!(self.balance_of(token, holder).await, Ok(b) if b == SENTINEL),
                Err(_) => false,
            };
            self.restore(token, key, original).await?;

            if hit {
                debug!("Sentinel matched slot {} on {:?}", index, token);
                if self
                    .try_mapping(token, holder, amount, slot, Verify::Exact)
                    .await?
                {
                    self.cache.confirm(token, slot);
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Inflate a total-supply slot alongside the balance, for tokens that
    /// sanity-check balances against supply
    async fn supply_adjust(
        &self,
        token: Address,
        holder: Address,
        amount: U256,
    ) -> Result<bool, InjectError> {
        let supply_slots = self.supply_candidates(token).await;

        for supply_index in supply_slots {
            let supply_key = U256::from(supply_index);
            let Ok(supply_original) = self.read_slot(token, supply_key).await else {
                continue;
            };
            let inflated = U256::from_be_bytes(supply_original.0).saturating_add(amount);

            for balance_index in 0..=SUPPLY_SCAN_LIMIT {
                if balance_index == supply_index {
                    continue;
                }
                let balance_key = BalanceSlot::standard(U256::from(balance_index)).key_for(holder);
                let Ok(balance_original) = self.read_slot(token, balance_key).await else {
                    continue;
                };

                let written = match self.write_slot(token, supply_key, B256::from(inflated)).await {
                    Ok(()) => self.write_slot(token, balance_key, B256::from(amount)).await,
                    Err(e) => Err(e),
                };
                let verified = match written {
                    Ok(()) => matches!(self.balance_of(token, holder).await, Ok(b) if b == amount),
                    Err(_) => false,
                };

                if verified {
                    debug!(
                        "Supply slot {} + balance slot {} worked for {:?}",
                        supply_index, balance_index, token
                    );
                    return Ok(true);
                }

                self.restore(token, balance_key, balance_original).await?;
                self.restore(token, supply_key, supply_original).await?;
            }
        }
        Ok(false)
    }

    async fn supply_candidates(&self, token: Address) -> Vec<u64> {
        let supply = match self.total_supply(token).await {
            Ok(supply) if !supply.is_zero() => supply,
            _ => return DEFAULT_SUPPLY_SLOTS.to_vec(),
        };

        let mut matches = Vec::new();
        for index in 0..=SUPPLY_SCAN_LIMIT {
            if let Ok(raw) = self.read_slot(token, U256::from(index)).await {
                if U256::from_be_bytes(raw.0) == supply {
                    matches.push(index);
                }
            }
        }

        if matches.is_empty() {
            DEFAULT_SUPPLY_SLOTS.to_vec()
        } else {
            matches
        }
    }

    // ========== Proxy detection ==========

    async fn detect_proxy(&self, token: Address) -> Option<ProxyRecord> {
        for (kind, slot) in PROXY_SLOTS {
            let word = match self.read_slot(token, U256::from_be_bytes(slot.0)).await {
                Ok(word) => word,
                Err(e) => {
                    warn!("Proxy lookup ({}) failed on {:?}: {}", kind, token, e);
                    continue;
                }
            };
            if let Some(implementation) = implementation_from_word(word) {
                debug!("{:?} is a {} proxy for {:?}", token, kind, implementation);
                return Some(ProxyRecord {
                    proxy: token,
                    implementation,
                    kind,
                });
            }
        }
        None
    }

    // ========== Storage primitives ==========

    /// Write `amount` at `slot`'s key and verify; restores on a miss
    async fn try_mapping(
        &self,
        token: Address,
        holder: Address,
        amount: U256,
        slot: BalanceSlot,
        verify: Verify,
    ) -> Result<bool, InjectError> {
        let key = slot.key_for(holder);
        let original = match self.read_slot(token, key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Reading slot {} of {:?} failed: {}", slot.index, token, e);
                return Ok(false);
            }
        };

        let verified = match self.write_slot(token, key, B256::from(amount)).await {
            Ok(()) => match self.balance_of(token, holder).await {
                Ok(balance) => verify.accepts(balance, amount),
                Err(_) => false,
            },
            Err(e) => {
                warn!("Writing slot {} of {:?} failed: {}", slot.index, token, e);
                false
            }
        };

        if !verified {
            self.restore(token, key, original).await?;
        }
        Ok(verified)
    }

    async fn restore(&self, token: Address, key: U256, original: B256) -> Result<(), InjectError> {
        self.write_slot(token, key, original)
            .await
            .map_err(|source| InjectError::RestoreFailed { token, source })
    }

    async fn read_slot(&self, token: Address, key: U256) -> Result<B256, NodeError> {
        self.retry
            .run("eth_getStorageAt", || self.node.storage_at(token, key))
            .await
    }

    async fn write_slot(&self, token: Address, key: U256, value: B256) -> Result<(), NodeError> {
        self.retry
            .run("anvil_setStorageAt", || {
                self.node.set_storage_at(token, key, value)
            })
            .await?;
        self.settle().await;
        Ok(())
    }

    pub async fn balance_of(&self, token: Address, holder: Address) -> Result<U256, NodeError> {
        let calldata = IERC20::balanceOfCall { account: holder }.abi_encode();
        let output = self.call_view(token, calldata).await?;
        IERC20::balanceOfCall::abi_decode_returns(&output)
            .map_err(|e| NodeError::Transport(format!("bad balanceOf output: {}", e)))
    }

    async fn total_supply(&self, token: Address) -> Result<U256, NodeError> {
        let calldata = IERC20::totalSupplyCall {}.abi_encode();
        let output = self.call_view(token, calldata).await?;
        IERC20::totalSupplyCall::abi_decode_returns(&output)
            .map_err(|e| NodeError::Transport(format!("bad totalSupply output: {}", e)))
    }

    async fn call_view(&self, to: Address, calldata: Vec<u8>) -> Result<Bytes, NodeError> {
        self.retry
            .run("eth_call", || {
                let tx = TransactionRequest::default()
                    .to(to)
                    .input(calldata.clone().into());
                self.node.call(tx, None)
            })
            .await
    }

    async fn settle(&self) {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::mock::{MockLayout, MockNode, MockToken, PrivilegedSet};
    use crate::node::ForkNode;
    use slots::KeyLayout;
    use std::sync::Arc;

    const TOKEN: Address = Address::repeat_byte(0x70);
    const HOLDER: Address = Address::repeat_byte(0x42);

    fn amount() -> U256 {
        U256::from(5_000_000_000u64)
    }

    fn setup(token: MockToken) -> (Arc<MockNode>, BalanceInjector) {
        let mock = Arc::new(MockNode::new());
        mock.add_token(TOKEN, token);
        let node: SharedNode = mock.clone();
        (mock, BalanceInjector::new(node, Duration::ZERO).unwrap())
    }

    fn balance_key(slot: u64) -> U256 {
        BalanceSlot::standard(U256::from(slot)).key_for(HOLDER)
    }

    #[tokio::test]
    async fn test_direct_slot_and_cache_hit_is_one_write() {
        let (mock, injector) = setup(MockToken::mapping(9));

        assert!(injector.inject(TOKEN, HOLDER, amount()).await.unwrap());
        assert!(mock.token_balance(TOKEN, HOLDER) >= amount());
        assert_eq!(
            injector.cache().get(&TOKEN),
            Some(BalanceSlot::standard(U256::from(9)))
        );

        let before = mock.storage_writes();
        assert!(injector.inject(TOKEN, HOLDER, amount() * U256::from(2)).await.unwrap());
        assert_eq!(mock.storage_writes() - before, 1);
    }

    #[tokio::test]
    async fn test_existing_balance_never_caches_wrong_slot() {
        let (mock, injector) = setup(MockToken::mapping(9));
        mock.put_storage(TOKEN, balance_key(9), B256::from(U256::from(1_000u64)));

        // Already funded: nothing written, nothing learned
        assert!(injector.inject(TOKEN, HOLDER, U256::from(10u64)).await.unwrap());
        assert_eq!(mock.storage_writes(), 0);
        assert!(injector.cache().is_empty());

        assert!(injector.inject(TOKEN, HOLDER, amount()).await.unwrap());
        assert_eq!(mock.token_balance(TOKEN, HOLDER), amount());
        assert_eq!(
            injector.cache().get(&TOKEN),
            Some(BalanceSlot::standard(U256::from(9)))
        );
        // Only the real balance entry is left in storage
        assert_eq!(mock.storage_dump().len(), 1);

        let before = mock.storage_writes();
        assert!(injector.inject(TOKEN, HOLDER, amount() * U256::from(3)).await.unwrap());
        assert_eq!(mock.storage_writes() - before, 1);
    }

    #[tokio::test]
    async fn test_stale_cached_slot_falls_back_to_search() {
        let (mock, injector) = setup(MockToken::mapping(9));
        let stale = BalanceSlot::standard(U256::from(3));
        injector.cache().confirm(TOKEN, stale);

        assert!(injector.inject(TOKEN, HOLDER, amount()).await.unwrap());

        assert_eq!(mock.token_balance(TOKEN, HOLDER), amount());
        assert!(!mock.storage_dump().contains_key(&(TOKEN, balance_key(3))));
        // First confirmed entry stays for the run
        assert_eq!(injector.cache().get(&TOKEN), Some(stale));
    }

    #[tokio::test]
    async fn test_impersonate_deal_on_its_own() {
        let (mock, injector) = setup(MockToken::mapping(300).dealable());

        assert!(injector.inject(TOKEN, HOLDER, amount()).await.unwrap());

        assert_eq!(mock.token_balance(TOKEN, HOLDER), amount());
        assert!(!mock.is_impersonating(HOLDER));
        assert!(injector.cache().is_empty());
        assert_eq!(mock.storage_dump().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_restore_write_is_an_error() {
        let (mock, injector) = setup(MockToken::mapping(0).with_layout(MockLayout::Opaque));
        // Trial write of slot 0 lands, its restore is rejected
        mock.reject_storage_write(2);

        let err = injector.inject(TOKEN, HOLDER, amount()).await.unwrap_err();

        let InjectError::RestoreFailed { token, source } = err;
        assert_eq!(token, TOKEN);
        assert!(source.to_string().contains("storage write rejected"));
    }

    #[tokio::test]
    async fn test_unknown_snapshot_is_an_error() {
        let (mock, injector) = setup(MockToken::mapping(0).with_layout(MockLayout::Opaque));
        mock.forget_snapshots();

        let err = injector.inject(TOKEN, HOLDER, amount()).await.unwrap_err();

        assert!(err.to_string().contains("unknown to node"));
    }

    #[tokio::test]
    async fn test_exhausted_leaves_storage_untouched() {
        let (mock, injector) = setup(MockToken::mapping(0).with_layout(MockLayout::Opaque));
        mock.put_storage(TOKEN, U256::from(3), B256::repeat_byte(0xab));
        let before = mock.storage_dump();

        let injected = injector.inject(TOKEN, HOLDER, amount()).await.unwrap();

        assert!(!injected);
        assert_eq!(mock.storage_dump(), before);
        assert!(injector.cache().is_empty());
    }

    #[tokio::test]
    async fn test_privileged_set_used_when_slot_unknown() {
        let token = MockToken::mapping(300).with_privileged_set(PrivilegedSet::Works);
        let (mock, injector) = setup(token);

        assert!(injector.inject(TOKEN, HOLDER, amount()).await.unwrap());
        assert_eq!(mock.token_balance(TOKEN, HOLDER), amount());
        // Slot 300 is never tried directly, so nothing to cache
        assert!(injector.cache().is_empty());
    }

    #[tokio::test]
    async fn test_privileged_set_writing_wrong_slot_is_rolled_back() {
        let token = MockToken::mapping(300)
            .with_privileged_set(PrivilegedSet::WritesWrongSlot)
            .dealable();
        let (mock, injector) = setup(token);

        assert!(injector.inject(TOKEN, HOLDER, amount()).await.unwrap());

        // The junk write from the override was reverted before the deal ran
        let junk = mapping_key_slot0(HOLDER);
        assert!(!mock.storage_dump().contains_key(&(TOKEN, junk)));
        assert_eq!(mock.token_balance(TOKEN, HOLDER), amount());
    }

    fn mapping_key_slot0(holder: Address) -> U256 {
        slots::mapping_key(holder, U256::ZERO, KeyLayout::HolderFirst)
    }

    #[tokio::test]
    async fn test_namespaced_storage() {
        let root = erc7201_root(OZ_ERC20_NAMESPACE);
        let token = MockToken::mapping(0).with_layout(MockLayout::Mapping {
            slot: root,
            key: KeyLayout::HolderFirst,
        });
        let (mock, injector) = setup(token);

        assert!(injector.inject(TOKEN, HOLDER, amount()).await.unwrap());
        assert_eq!(mock.token_balance(TOKEN, HOLDER), amount());
        assert_eq!(injector.cache().get(&TOKEN), Some(BalanceSlot::standard(root)));
    }

    #[tokio::test]
    async fn test_sentinel_scan_finds_uncommon_slot() {
        let (mock, injector) = setup(MockToken::mapping(77));
        let before_keys = mock.storage_dump().len();

        assert!(injector.inject(TOKEN, HOLDER, amount()).await.unwrap());
        assert_eq!(mock.token_balance(TOKEN, HOLDER), amount());
        assert_eq!(
            injector.cache().get(&TOKEN),
            Some(BalanceSlot::standard(U256::from(77)))
        );

        // Every tried slot other than 77 is back to zero
        let nonzero = mock
            .storage_dump()
            .into_iter()
            .filter(|(_, v)| *v != B256::ZERO)
            .count();
        assert_eq!(nonzero, before_keys + 1);
    }

    #[tokio::test]
    async fn test_supply_bounded_token() {
        let token = MockToken::mapping(0).with_layout(MockLayout::SupplyBounded {
            slot: U256::from(4),
            supply_slot: U256::from(2),
        });
        let (mock, injector) = setup(token);
        mock.put_storage(TOKEN, U256::from(2), B256::from(U256::from(1_000u64)));

        assert!(injector.inject(TOKEN, HOLDER, amount()).await.unwrap());
        assert_eq!(mock.token_balance(TOKEN, HOLDER), amount());

        // Not cacheable: needs two writes
        assert!(injector.cache().is_empty());
        let supply = mock.storage_dump()[&(TOKEN, U256::from(2))];
        assert_eq!(U256::from_be_bytes(supply.0), amount() + U256::from(1_000u64));
    }

    #[tokio::test]
    async fn test_reversed_key_only_for_proxies() {
        let reversed = MockToken::mapping(0).with_layout(MockLayout::Mapping {
            slot: U256::from(5),
            key: KeyLayout::SlotFirst,
        });

        // Without a proxy pointer the heuristic is skipped
        let (_, plain) = setup(reversed.clone());
        assert!(!plain.inject(TOKEN, HOLDER, amount()).await.unwrap());

        let (mock, injector) = setup(reversed);
        let implementation = Address::repeat_byte(0x99);
        mock.put_storage(
            TOKEN,
            U256::from_be_bytes(slots::EIP1967_IMPLEMENTATION_SLOT.0),
            implementation.into_word(),
        );

        assert!(injector.inject(TOKEN, HOLDER, amount()).await.unwrap());
        assert_eq!(mock.token_balance(TOKEN, HOLDER), amount());
        assert_eq!(
            injector.cache().get(&TOKEN),
            Some(BalanceSlot::reversed(U256::from(5)))
        );
    }

    #[tokio::test]
    async fn test_detect_proxy_kinds() {
        let (mock, injector) = setup(MockToken::mapping(0));
        assert!(injector.detect_proxy(TOKEN).await.is_none());

        let implementation = Address::repeat_byte(0x31);
        mock.put_storage(
            TOKEN,
            U256::from_be_bytes(slots::OZ_LEGACY_IMPLEMENTATION_SLOT.0),
            implementation.into_word(),
        );
        let record = injector.detect_proxy(TOKEN).await.unwrap();
        assert_eq!(record.implementation, implementation);
        assert_eq!(record.kind, "oz-legacy");
    }

    #[tokio::test]
    async fn test_fund_native() {
        let (mock, injector) = setup(MockToken::mapping(0));
        let ten_eth = U256::from(10u64) * U256::from(10u64).pow(U256::from(18));

        tokio_test::assert_ok!(injector.fund_native(HOLDER, ten_eth).await);
        assert_eq!(mock.balance(HOLDER).await.unwrap(), ten_eth);
    }
}
