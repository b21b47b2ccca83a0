//! Simulation request/result types

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Calldata a quote provider wants us to send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapTransaction {
    pub to: Address,
    pub data: Bytes,
    #[serde(default)]
    pub value: U256,
}

/// One swap to verify on the fork
#[derive(Debug, Clone)]
pub struct SimulationRequest {
    pub token_in: Address,
    pub token_out: Address,
    /// Input amount in the token's smallest unit
    pub amount_in: U256,
    pub swap_transaction: SwapTransaction,
    /// Block the quote was produced against
    pub target_block: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStatus {
    Success,
    Reverted,
    Error,
    Skipped,
}

impl SimulationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulationStatus::Success => "success",
            SimulationStatus::Reverted => "reverted",
            SimulationStatus::Error => "error",
            SimulationStatus::Skipped => "skipped",
        }
    }
}

/// Outcome of one simulation. Exactly one per sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub status: SimulationStatus,
    pub amount_out: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    /// Gas cost in output-token units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_cost: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_amount: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    pub attempts: u32,
}

impl SimulationResult {
    fn empty(status: SimulationStatus, attempts: u32) -> Self {
        Self {
            status,
            amount_out: U256::ZERO,
            gas_used: None,
            gas_cost: None,
            net_amount: None,
            error: None,
            revert_reason: None,
            attempts,
        }
    }

    pub fn success(amount_out: U256, gas_used: u64, attempts: u32) -> Self {
        Self {
            amount_out,
            gas_used: Some(gas_used),
            ..Self::empty(SimulationStatus::Success, attempts)
        }
    }

    pub fn reverted(reason: String, gas_used: u64, attempts: u32) -> Self {
        Self {
            gas_used: Some(gas_used),
            revert_reason: Some(reason),
            ..Self::empty(SimulationStatus::Reverted, attempts)
        }
    }

    pub fn error(message: impl Into<String>, attempts: u32) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::empty(SimulationStatus::Error, attempts)
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::empty(SimulationStatus::Skipped, 0)
        }
    }

    pub fn with_gas_accounting(mut self, gas_cost: U256, net_amount: U256) -> Self {
        self.gas_cost = Some(gas_cost);
        self.net_amount = Some(net_amount);
        self
    }
}
