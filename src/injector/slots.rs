//! Storage slot math for ERC20 balance mappings
//!
//! Solidity stores `mapping(address => uint256) balances` at slot `p` under
//! `keccak256(pad32(holder) ++ pad32(p))`. Everything here is derived from
//! that rule plus a few well-known constants.

use alloy_primitives::{b256, keccak256, Address, B256, U256};
use serde::{Deserialize, Serialize};

// ============================================
// KEY DERIVATION
// ============================================

/// Order of the two words hashed into a mapping key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyLayout {
    /// Standard Solidity: `keccak256(holder ++ slot)`
    HolderFirst,
    /// Seen behind some proxies and non-Solidity tokens: `keccak256(slot ++ holder)`
    SlotFirst,
}

/// A confirmed (or candidate) location of a holder's balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSlot {
    /// Mapping base slot (or namespace root)
    pub index: U256,
    pub layout: KeyLayout,
}

impl BalanceSlot {
    pub fn standard(index: U256) -> Self {
        Self {
            index,
            layout: KeyLayout::HolderFirst,
        }
    }

    pub fn reversed(index: U256) -> Self {
        Self {
            index,
            layout: KeyLayout::SlotFirst,
        }
    }

    /// Storage key of `holder`'s entry
    pub fn key_for(&self, holder: Address) -> U256 {
        mapping_key(holder, self.index, self.layout)
    }
}

/// Storage key of `holder` in a mapping rooted at `slot`
pub fn mapping_key(holder: Address, slot: U256, layout: KeyLayout) -> U256 {
    let mut encoded = [0u8; 64];
    let holder_word = holder.into_word();
    let slot_word = slot.to_be_bytes::<32>();

    match layout {
        KeyLayout::HolderFirst => {
            encoded[..32].copy_from_slice(holder_word.as_slice());
            encoded[32..].copy_from_slice(&slot_word);
        }
        KeyLayout::SlotFirst => {
            encoded[..32].copy_from_slice(&slot_word);
            encoded[32..].copy_from_slice(holder_word.as_slice());
        }
    }

    U256::from_be_bytes(keccak256(encoded).0)
}

// ============================================
// CANDIDATE SLOTS
// ============================================

/// Balance mapping slots seen in the wild, most common first
pub const DIRECT_CANDIDATES: [u64; 32] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, // OZ, solmate, vyper
    51, 52, // OZ upgradeable (gap-shifted)
    100, 101, 102, 103, 104, 105, // large inheritance chains
    150, 200, 255,
];

/// Upper bound (inclusive) of the exhaustive sentinel scan
pub const SCAN_LIMIT: u64 = 255;

/// Upper bound (inclusive) of slots considered in the supply co-adjustment
pub const SUPPLY_SCAN_LIMIT: u64 = 20;

/// Fallback total-supply slots when none matches `totalSupply()`
pub const DEFAULT_SUPPLY_SLOTS: [u64; 6] = [2, 3, 4, 0, 1, 5];

/// Value no real balance should ever equal
pub const SENTINEL: U256 = U256::from_limbs([0x0de1_5e17_1e1b_a1a4, 0xb47c, 0, 0]);

// ============================================
// ERC-7201 NAMESPACED STORAGE
// ============================================

/// Namespace id used by OpenZeppelin's upgradeable ERC20 (v5)
pub const OZ_ERC20_NAMESPACE: &str = "openzeppelin.storage.ERC20";

/// `keccak256(keccak256(id) - 1) & ~0xff`
pub fn erc7201_root(namespace: &str) -> U256 {
    let inner = U256::from_be_bytes(keccak256(namespace.as_bytes()).0) - U256::from(1u8);
    let outer = U256::from_be_bytes(keccak256(inner.to_be_bytes::<32>()).0);
    outer & !U256::from(0xffu8)
}

// ============================================
// PROXY IMPLEMENTATION POINTERS
// ============================================

/// `keccak256("eip1967.proxy.implementation") - 1`
pub const EIP1967_IMPLEMENTATION_SLOT: B256 =
    b256!("360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

/// `keccak256("PROXIABLE")`
pub const EIP1822_PROXIABLE_SLOT: B256 =
    b256!("c5f16f0fcc639fa48a6947836d9850f504798523bf8c9a3a87d5876cf622bcf7");

/// `keccak256("org.zeppelinos.proxy.implementation")`
pub const OZ_LEGACY_IMPLEMENTATION_SLOT: B256 =
    b256!("7050c9e0f4ca769c69bd3a8ef740bc37934f8e2c036e5a723fd8ee048ed3f8c3");

/// Tried in this order
pub const PROXY_SLOTS: [(&str, B256); 3] = [
    ("eip1967", EIP1967_IMPLEMENTATION_SLOT),
    ("eip1822", EIP1822_PROXIABLE_SLOT),
    ("oz-legacy", OZ_LEGACY_IMPLEMENTATION_SLOT),
];

/// A token found to delegate to an implementation contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyRecord {
    pub proxy: Address,
    pub implementation: Address,
    pub kind: &'static str,
}

/// Implementation address held in a pointer slot, if the slot is populated
pub fn implementation_from_word(word: B256) -> Option<Address> {
    let address = Address::from_word(word);
    (address != Address::ZERO).then_some(address)
}
