//! Per-run cache of confirmed balance slots

use alloy_primitives::Address;
use std::cell::RefCell;
use std::collections::HashMap;

use super::slots::BalanceSlot;

/// token -> confirmed balance mapping location
///
/// Write-once per token and never invalidated within a run. Lives inside the
/// injector; borrows are never held across an await.
#[derive(Debug, Default)]
pub struct BalanceSlotCache {
    slots: RefCell<HashMap<Address, BalanceSlot>>,
}

impl BalanceSlotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, token: &Address) -> Option<BalanceSlot> {
        self.slots.borrow().get(token).copied()
    }

    /// Record `slot` for `token`; an existing entry wins
    pub fn confirm(&self, token: Address, slot: BalanceSlot) -> bool {
        let mut slots = self.slots.borrow_mut();
        if slots.contains_key(&token) {
            return false;
        }
        slots.insert(token, slot);
        true
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }
}
