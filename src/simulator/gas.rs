//! Gas Accountant - Gas Usage to Output-Token Cost
//!
//! gas_cost = floor(gas_used * gas_price / 1e18 * native_price * 10^decimals)
//! net      = max(0, amount_out - gas_cost)
//!
//! All arithmetic is exact decimal; nothing goes through f64.

use alloy_primitives::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

// ============================================
// CONSTANTS
// ============================================

/// Decimals of the native token (wei per ether)
const NATIVE_DECIMALS: u32 = 18;

/// Highest output-token precision we can scale to exactly
const MAX_OUTPUT_DECIMALS: u8 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GasError {
    #[error("gas cost overflows decimal arithmetic")]
    Overflow,

    #[error("output token has too many decimals ({0})")]
    UnsupportedDecimals(u8),

    #[error("native price must not be negative")]
    NegativePrice,
}

/// How to value native gas in the output token
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputPricing {
    /// Output-token units per one native token (e.g. 2500 USDC per ETH)
    pub native_price: Option<Decimal>,
    pub output_decimals: u8,
}

impl OutputPricing {
    /// Output token is the native token itself
    pub fn native() -> Self {
        Self {
            native_price: Some(Decimal::ONE),
            output_decimals: NATIVE_DECIMALS as u8,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GasAccountant {
    assumed_gas_price_wei: u128,
}

impl GasAccountant {
    pub fn new(assumed_gas_price_wei: u128) -> Self {
        Self {
            assumed_gas_price_wei,
        }
    }

    /// Cost of `gas_used` in output-token base units, rounded down
    pub fn gas_cost(
        &self,
        gas_used: u64,
        native_price: Decimal,
        output_decimals: u8,
    ) -> Result<U256, GasError> {
        if native_price.is_sign_negative() {
            return Err(GasError::NegativePrice);
        }
        if output_decimals > MAX_OUTPUT_DECIMALS {
            return Err(GasError::UnsupportedDecimals(output_decimals));
        }

        let wei = u128::from(gas_used)
            .checked_mul(self.assumed_gas_price_wei)
            .ok_or(GasError::Overflow)?;
        let wei = i128::try_from(wei).map_err(|_| GasError::Overflow)?;

        // wei / 1e18, exactly
        let native_cost =
            Decimal::try_from_i128_with_scale(wei, NATIVE_DECIMALS).map_err(|_| GasError::Overflow)?;

        let scale = 10u128
            .checked_pow(u32::from(output_decimals))
            .ok_or(GasError::Overflow)?;
        let scale = Decimal::try_from_i128_with_scale(scale as i128, 0).map_err(|_| GasError::Overflow)?;

        let cost = native_cost
            .checked_mul(native_price)
            .and_then(|c| c.checked_mul(scale))
            .ok_or(GasError::Overflow)?
            .floor();

        cost.to_u128().map(U256::from).ok_or(GasError::Overflow)
    }

    /// `max(0, amount_out - gas_cost)`
    pub fn net_amount(amount_out: U256, gas_cost: U256) -> U256 {
        amount_out.saturating_sub(gas_cost)
    }

    /// Cost and net together; `None` when no price is known
    pub fn settle(
        &self,
        amount_out: U256,
        gas_used: u64,
        pricing: &OutputPricing,
    ) -> Option<Result<(U256, U256), GasError>> {
        let price = pricing.native_price?;
        Some(
            self.gas_cost(gas_used, price, pricing.output_decimals)
                .map(|cost| (cost, Self::net_amount(amount_out, cost))),
        )
    }
}
