//! Swap Executor - Fund, Approve, Submit, Measure
//!
//! Runs a provider's swap calldata on the fork from a test account:
//!
//! 1. Fund the account (native + ERC20 via the injector, with a safety buffer)
//! 2. Approve the swap target for the buffered amount
//! 3. Snapshot the output-token balance
//! 4. Check the target has code
//! 5. Submit with a fixed gas ceiling and wait for the receipt
//! 6. Diff the output balance, or replay the revert for a reason
//!
//! A receipt that never arrives is retried from a freshly reset fork.

use alloy_primitives::{Address, B256, U256};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::gas::{GasAccountant, OutputPricing};
use super::types::{SimulationRequest, SimulationResult};
use crate::fork::ForkController;
use crate::injector::{BalanceInjector, InjectError};
use crate::node::{is_transient, read_policy, NodeError, SharedNode, TxReceipt, IERC20};
use crate::retry::{AttemptTimeout, RetryExecutor, RetryPolicy, RetryPolicyError};
use crate::tokens::is_native;

/// Native balance on top of the swap value, for gas
const GAS_ALLOWANCE_WEI: u128 = 10_000_000_000_000_000_000; // 10 ETH

// ============================================
// ERRORS
// ============================================

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("no contract code at swap target {0}")]
    ContractNotFound(Address),

    #[error("Failed to set token balance for simulation")]
    InsufficientBalanceSetup,

    #[error("transaction timed out: {0}")]
    TransactionTimeout(String),

    #[error("unknown execution error: {0}")]
    Unknown(String),

    #[error(transparent)]
    Inject(#[from] InjectError),

    #[error(transparent)]
    Node(#[from] NodeError),
}

impl AttemptTimeout for SimulationError {
    fn attempt_timed_out(operation: &str, after: Duration) -> Self {
        SimulationError::TransactionTimeout(format!("{} exceeded {:?}", operation, after))
    }
}

/// Send and receipt failures that are worth a fork refresh and another go
fn submission_error(err: NodeError) -> SimulationError {
    if err.is_timeout() || is_transient(&err) {
        SimulationError::TransactionTimeout(err.to_string())
    } else {
        SimulationError::Node(err)
    }
}

/// Only timeouts are worth a fork refresh and another go
pub fn is_transaction_timeout(err: &SimulationError) -> bool {
    matches!(err, SimulationError::TransactionTimeout(_))
}

/// 3 attempts, 5 minutes each, timeouts only
pub fn transaction_policy() -> RetryPolicy<SimulationError> {
    RetryPolicy::new(3, is_transaction_timeout)
        .with_delays(Duration::from_secs(1), Duration::from_secs(5))
        .with_attempt_timeout(Duration::from_secs(300))
}

// ============================================
// SETTINGS
// ============================================

#[derive(Debug, Clone)]
pub struct SwapSettings {
    /// Account the swap is sent from (impersonated)
    pub test_account: Address,
    /// Gas limit on the swap transaction
    pub gas_ceiling: u64,
    /// Input is funded with `amount_in * funding_multiplier`
    pub funding_multiplier: u64,
}

/// What one attempt produced
#[derive(Debug)]
enum Executed {
    Success { amount_out: U256, receipt: TxReceipt },
    Reverted { reason: String, gas_used: u64 },
}

// ============================================
// EXECUTOR
// ============================================

pub struct SwapExecutor {
    fork: ForkController,
    injector: BalanceInjector,
    accountant: GasAccountant,
    retry: RetryExecutor<SimulationError>,
    reads: RetryExecutor<NodeError>,
    settings: SwapSettings,
}

impl SwapExecutor {
    pub fn new(
        fork: ForkController,
        injector: BalanceInjector,
        accountant: GasAccountant,
        settings: SwapSettings,
    ) -> Result<Self, RetryPolicyError> {
        Ok(Self {
            fork,
            injector,
            accountant,
            retry: RetryExecutor::new(transaction_policy())?,
            reads: RetryExecutor::new(read_policy())?,
            settings,
        })
    }

    pub fn with_retry(mut self, retry: RetryExecutor<SimulationError>) -> Self {
        self.retry = retry;
        self
    }

    pub fn fork(&self) -> &ForkController {
        &self.fork
    }

    pub fn injector(&self) -> &BalanceInjector {
        &self.injector
    }

    fn node(&self) -> &SharedNode {
        self.fork.node()
    }

    /// Simulate one swap. Never fails: every outcome becomes a result.
    pub async fn execute(
        &self,
        request: &SimulationRequest,
        pricing: &OutputPricing,
    ) -> SimulationResult {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let outcome = self
            .retry
            .run("swap simulation", move || async move {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt > 1 {
                    info!(
                        "🔄 Refreshing fork to block {} before attempt {}",
                        request.target_block, attempt
                    );
                    self.fork.reset_to_block(request.target_block).await?;
                }
                self.attempt(request).await
            })
            .await;

        let attempts = attempts.load(Ordering::SeqCst);

        match outcome {
            Ok(Executed::Success { amount_out, receipt }) => {
                let result = SimulationResult::success(amount_out, receipt.gas_used, attempts);
                match self.accountant.settle(amount_out, receipt.gas_used, pricing) {
                    Some(Ok((cost, net))) => result.with_gas_accounting(cost, net),
                    Some(Err(e)) => {
                        warn!("Gas accounting failed: {}", e);
                        result
                    }
                    None => result,
                }
            }
            Ok(Executed::Reverted { reason, gas_used }) => {
                info!("↩️  Swap reverted: {}", reason);
                SimulationResult::reverted(reason, gas_used, attempts)
            }
            Err(e) => {
                warn!("Simulation failed after {} attempt(s): {}", attempts, e);
                SimulationResult::error(e.to_string(), attempts)
            }
        }
    }

    async fn attempt(&self, request: &SimulationRequest) -> Result<Executed, SimulationError> {
        let account = self.settings.test_account;
        let swap = &request.swap_transaction;
        let multiplier = U256::from(self.settings.funding_multiplier.max(1));

        // ========== Funding ==========
        let native_funding = U256::from(GAS_ALLOWANCE_WEI) + swap.value.saturating_mul(multiplier);
        self.injector.fund_native(account, native_funding).await?;

        let buffered = request.amount_in.saturating_mul(multiplier);
        if !is_native(&request.token_in)
            && !self
                .injector
                .inject(request.token_in, account, buffered)
                .await?
        {
            return Err(SimulationError::InsufficientBalanceSetup);
        }

        self.reads
            .run("anvil_impersonateAccount", || self.node().impersonate(account))
            .await?;

        if !is_native(&request.token_in) {
            self.approve(request.token_in, account, swap.to, buffered)
                .await?;
        }

        // ========== Execution ==========
        let before = self.output_balance(request.token_out, account).await?;

        let code = self
            .reads
            .run("eth_getCode", || self.node().code_at(swap.to))
            .await?;
        if code.is_empty() {
            return Err(SimulationError::ContractNotFound(swap.to));
        }

        let tx = TransactionRequest::default()
            .from(account)
            .to(swap.to)
            .input(swap.data.clone().into())
            .value(swap.value)
            .gas_limit(self.settings.gas_ceiling);

        let tx_hash = self
            .node()
            .send_transaction(tx.clone())
            .await
            .map_err(submission_error)?;
        debug!("Swap submitted: {:?}", tx_hash);

        let receipt = self.receipt(tx_hash).await?;

        if !receipt.success {
            let reason = self.replay_revert(tx, receipt.block_number).await;
            return Ok(Executed::Reverted {
                reason,
                gas_used: receipt.gas_used,
            });
        }

        let after = self.output_balance(request.token_out, account).await?;
        let mut amount_out = after.saturating_sub(before);
        if is_native(&request.token_out) {
            // Gas came out of the same balance we are measuring
            amount_out += receipt.gas_paid_wei();
        }

        debug!(
            "Swap mined in block {} using {} gas, output {}",
            receipt.block_number, receipt.gas_used, amount_out
        );

        Ok(Executed::Success { amount_out, receipt })
    }

    async fn approve(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<(), SimulationError> {
        let calldata = IERC20::approveCall { spender, amount }.abi_encode();
        let tx = TransactionRequest::default()
            .from(owner)
            .to(token)
            .input(calldata.into());

        let tx_hash = self
            .node()
            .send_transaction(tx)
            .await
            .map_err(submission_error)?;
        let receipt = self.receipt(tx_hash).await?;
        if !receipt.success {
            return Err(SimulationError::Unknown(format!(
                "approve of {} for {} reverted",
                token, spender
            )));
        }
        Ok(())
    }

    async fn receipt(&self, tx_hash: B256) -> Result<TxReceipt, SimulationError> {
        self.node()
            .wait_for_receipt(tx_hash)
            .await
            .map_err(submission_error)
    }

    async fn output_balance(&self, token: Address, holder: Address) -> Result<U256, NodeError> {
        if is_native(&token) {
            self.node().balance(holder).await
        } else {
            self.injector.balance_of(token, holder).await
        }
    }

    /// Re-run the failed swap read-only at its block to recover a reason
    async fn replay_revert(&self, tx: TransactionRequest, block: u64) -> String {
        match self.node().call(tx, Some(block)).await {
            Err(NodeError::Reverted { reason, .. }) => reason,
            Err(e) => format!("reverted ({})", e),
            Ok(_) => "reverted without reason".to_string(),
        }
    }
}

// ============================================
// TESTS
// ============================================
