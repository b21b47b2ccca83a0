//! Benchmark Runner
//!
//! For each sample: fetch every provider's quote concurrently, then verify
//! each quote on the fork one at a time (reset to the quote's block first).
//! Every (sample, provider) pair produces exactly one result row, including
//! the ones skipped after Ctrl-C.

use alloy_primitives::{Address, U256};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use chrono::{DateTime, Utc};
use console::style;
use eyre::Result;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::node::IERC20;
use crate::quotes::{Quote, QuoteError, QuoteSource, Sample, ZeroQuotePolicy};
use crate::simulator::{
    OutputPricing, SimulationRequest, SimulationResult, SimulationStatus, SwapExecutor,
};
use crate::tokens;

/// Output decimals when neither the batch, the registry nor the chain know
const FALLBACK_DECIMALS: u8 = 18;

// ============================================
// RESULT ROWS
// ============================================

/// One line of the results file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub timestamp: DateTime<Utc>,
    pub sample_id: usize,
    pub provider: String,
    pub baseline: bool,
    pub token_in: Address,
    pub token_out: Address,
    pub pair: String,
    pub amount_in: U256,
    pub block: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quoted_output: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_error: Option<String>,
    pub simulation: SimulationResult,
}

impl ResultRecord {
    /// Append this record as one JSON line
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

// ============================================
// SUMMARY
// ============================================

#[derive(Debug, Clone, Default)]
pub struct ProviderStats {
    pub rows: usize,
    pub quotes: usize,
    pub simulated_ok: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub samples: usize,
    pub by_status: BTreeMap<&'static str, usize>,
    pub providers: BTreeMap<String, ProviderStats>,
    pub cached_slots: usize,
    pub fork_resets: u32,
    pub fork_reset_retries: u32,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    fn record(&mut self, row: &ResultRecord) {
        *self.by_status.entry(row.simulation.status.as_str()).or_default() += 1;

        let stats = self.providers.entry(row.provider.clone()).or_default();
        stats.rows += 1;
        if row.quoted_output.is_some() {
            stats.quotes += 1;
        }
        if row.simulation.status == SimulationStatus::Success {
            stats.simulated_ok += 1;
        }
    }

    pub fn count(&self, status: SimulationStatus) -> usize {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }

    pub fn print(&self) {
        let (banner, title) = if self.interrupted {
            (
                style("═══════════════════════════════════════════════════════════════").yellow(),
                style(" ⚠️  RUN INTERRUPTED").yellow().bold(),
            )
        } else {
            (
                style("═══════════════════════════════════════════════════════════════").green(),
                style(" ✅ RUN COMPLETE").green().bold(),
            )
        };

        println!();
        println!("{}", banner);
        println!("{}", title);
        println!("{}", banner);
        println!();
        println!("Summary:");
        println!("  • Samples: {} in {:.1?}", self.samples, self.elapsed);
        for status in [
            SimulationStatus::Success,
            SimulationStatus::Reverted,
            SimulationStatus::Error,
            SimulationStatus::Skipped,
        ] {
            println!("  • {:<9} {}", status.as_str(), self.count(status));
        }
        println!("  • Cached balance slots: {}", self.cached_slots);
        println!(
            "  • Fork resets: {} ({} retried)",
            self.fork_resets, self.fork_reset_retries
        );
        println!();

        if !self.providers.is_empty() {
            println!("Providers:");
            for (name, stats) in &self.providers {
                let rate = if stats.quotes == 0 {
                    0.0
                } else {
                    stats.simulated_ok as f64 * 100.0 / stats.quotes as f64
                };
                println!(
                    "  • {:<20} quotes {:>4}/{:<4} verified {:>4} ({:.1}%)",
                    style(name).cyan(),
                    stats.quotes,
                    stats.rows,
                    stats.simulated_ok,
                    rate
                );
            }
            println!();
        }
    }
}

// ============================================
// RUNNER
// ============================================

pub struct Runner {
    sources: Vec<Box<dyn QuoteSource>>,
    executor: Option<SwapExecutor>,
    quote_timeout: Duration,
    zero_quote_policy: ZeroQuotePolicy,
    results_path: Option<PathBuf>,
    shutdown: watch::Receiver<bool>,
    show_progress: bool,
    records: Vec<ResultRecord>,
}

impl Runner {
    pub fn new(
        sources: Vec<Box<dyn QuoteSource>>,
        executor: Option<SwapExecutor>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            sources,
            executor,
            quote_timeout: Duration::from_secs(30),
            zero_quote_policy: ZeroQuotePolicy::default(),
            results_path: None,
            shutdown,
            show_progress: false,
            records: Vec::new(),
        }
    }

    pub fn with_quote_timeout(mut self, timeout: Duration) -> Self {
        self.quote_timeout = timeout;
        self
    }

    pub fn with_zero_quote_policy(mut self, policy: ZeroQuotePolicy) -> Self {
        self.zero_quote_policy = policy;
        self
    }

    pub fn with_results_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_path = Some(path.into());
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub async fn run(&mut self, samples: &[Sample]) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary {
            samples: samples.len(),
            ..RunSummary::default()
        };

        let progress = if self.show_progress {
            let bar = ProgressBar::new(samples.len() as u64);
            let style = ProgressStyle::with_template(
                "{spinner:.cyan} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        } else {
            ProgressBar::hidden()
        };

        for sample in samples {
            progress.set_message(sample.label());

            let rows = if self.stopping() {
                summary.interrupted = true;
                self.skipped_rows(sample, "interrupted")
            } else {
                self.run_sample(sample).await
            };

            for row in rows {
                summary.record(&row);
                if let Some(path) = &self.results_path {
                    if let Err(e) = row.append_to_file(path) {
                        warn!("Could not write result row: {}", e);
                    }
                }
                self.records.push(row);
            }
            progress.inc(1);
        }

        progress.finish_and_clear();

        summary.interrupted |= self.stopping();
        summary.elapsed = started.elapsed();
        if let Some(executor) = &self.executor {
            summary.cached_slots = executor.injector().cache().len();
            summary.fork_resets = executor.fork().resets();
            summary.fork_reset_retries = executor.fork().reset_retries();
        }
        summary
    }

    async fn run_sample(&self, sample: &Sample) -> Vec<ResultRecord> {
        let request = sample.quote_request();
        let quote_timeout = self.quote_timeout;

        let fetches = join_all(self.sources.iter().map(|source| {
            let request = &request;
            async move {
                match tokio::time::timeout(quote_timeout, source.fetch_quote(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(QuoteError::Timeout),
                }
            }
        }));

        let mut shutdown = self.shutdown.clone();
        let quotes = tokio::select! {
            quotes = fetches => quotes,
            _ = shutdown_requested(&mut shutdown) => {
                return self.skipped_rows(sample, "interrupted");
            }
        };

        let mut rows = Vec::with_capacity(quotes.len());
        for (source, quote) in self.sources.iter().zip(quotes) {
            let mut row = self.row(sample, source.as_ref());

            let simulation = match quote {
                Err(e) => {
                    debug!("{} has no quote for sample {}: {}", source.name(), sample.id, e);
                    row.quote_error = Some(e.to_string());
                    SimulationResult::skipped("quote failed")
                }
                Ok(quote) => {
                    row.route_count = Some(quote.route_count);
                    match self.zero_quote_policy.check(&quote) {
                        Ok(output) => {
                            row.quoted_output = Some(output);
                            self.simulate_guarded(sample, source.as_ref(), &quote).await
                        }
                        Err(QuoteError::NoLiquidity) => {
                            row.quoted_output = Some(U256::ZERO);
                            SimulationResult::skipped("no liquidity")
                        }
                        Err(e) => {
                            row.quote_error = Some(e.to_string());
                            SimulationResult::skipped("quote failed")
                        }
                    }
                }
            };

            info!(
                "{} #{} {}: {}",
                source.name(),
                sample.id,
                sample.label(),
                simulation.status.as_str()
            );

            row.simulation = simulation;
            rows.push(row);
        }
        rows
    }

    /// Simulation raced against Ctrl-C; the fork is left as is on interrupt
    async fn simulate_guarded(
        &self,
        sample: &Sample,
        source: &dyn QuoteSource,
        quote: &Quote,
    ) -> SimulationResult {
        if self.stopping() {
            return SimulationResult::skipped("interrupted");
        }

        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            result = self.simulate(sample, source, quote) => result,
            _ = shutdown_requested(&mut shutdown) => SimulationResult::skipped("interrupted"),
        }
    }

    async fn simulate(
        &self,
        sample: &Sample,
        source: &dyn QuoteSource,
        quote: &Quote,
    ) -> SimulationResult {
        let Some(executor) = &self.executor else {
            return SimulationResult::skipped("simulation disabled");
        };
        if !source.supports_simulation() {
            return SimulationResult::skipped("provider does not support simulation");
        }
        let Some(swap_transaction) = quote.swap_transaction.clone() else {
            return SimulationResult::skipped("no swap transaction");
        };

        if let Err(e) = executor.fork().reset_to_block(sample.block).await {
            warn!("Fork reset to {} failed: {}", sample.block, e);
            return SimulationResult::error(format!("fork reset failed: {}", e), 0);
        }

        let pricing = self.pricing(executor, sample).await;
        let request = SimulationRequest {
            token_in: sample.token_in,
            token_out: sample.token_out,
            amount_in: sample.amount_in,
            swap_transaction,
            target_block: sample.block,
        };

        executor.execute(&request, &pricing).await
    }

    async fn pricing(&self, executor: &SwapExecutor, sample: &Sample) -> OutputPricing {
        if tokens::is_native(&sample.token_out) {
            return OutputPricing::native();
        }

        let decimals = match sample
            .output_decimals
            .or_else(|| tokens::known_decimals(&sample.token_out))
        {
            Some(decimals) => decimals,
            None => match onchain_decimals(executor, sample.token_out).await {
                Some(decimals) => decimals,
                None => {
                    warn!(
                        "Unknown decimals for {:?}, assuming {}",
                        sample.token_out, FALLBACK_DECIMALS
                    );
                    FALLBACK_DECIMALS
                }
            },
        };

        OutputPricing {
            native_price: sample.native_price,
            output_decimals: decimals,
        }
    }

    fn row(&self, sample: &Sample, source: &dyn QuoteSource) -> ResultRecord {
        ResultRecord {
            timestamp: Utc::now(),
            sample_id: sample.id,
            provider: source.name().to_string(),
            baseline: source.is_baseline(),
            token_in: sample.token_in,
            token_out: sample.token_out,
            pair: format!(
                "{}/{}",
                tokens::display_symbol(&sample.token_in),
                tokens::display_symbol(&sample.token_out)
            ),
            amount_in: sample.amount_in,
            block: sample.block,
            quoted_output: None,
            route_count: None,
            quote_error: None,
            simulation: SimulationResult::skipped("not run"),
        }
    }

    fn skipped_rows(&self, sample: &Sample, reason: &str) -> Vec<ResultRecord> {
        self.sources
            .iter()
            .map(|source| {
                let mut row = self.row(sample, source.as_ref());
                row.simulation = SimulationResult::skipped(reason);
                row
            })
            .collect()
    }
}

/// Resolves once shutdown is requested; never if the sender is gone
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn onchain_decimals(executor: &SwapExecutor, token: Address) -> Option<u8> {
    let tx = TransactionRequest::default()
        .to(token)
        .input(IERC20::decimalsCall {}.abi_encode().into());
    let output = executor.fork().node().call(tx, None).await.ok()?;
    IERC20::decimalsCall::abi_decode_returns(&output).ok()
}

// ============================================
// TESTS
// ============================================
