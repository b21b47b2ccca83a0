//! Quote Sources
//!
//! Providers are modelled as a capability trait. Live HTTP adapters live
//! outside this crate; what ships here is `RecordedQuoteSource`, which
//! replays quotes captured in a batch file so runs are reproducible.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::simulator::SwapTransaction;
use crate::tokens;

// ============================================
// QUOTES
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Output in the token's smallest unit, as a decimal string
    pub output_amount: String,
    pub swap_transaction: Option<SwapTransaction>,
    #[serde(default)]
    pub route_count: u32,
}

impl Quote {
    pub fn output(&self) -> Result<U256, QuoteError> {
        U256::from_str_radix(self.output_amount.trim(), 10)
            .map_err(|_| QuoteError::InvalidAmount(self.output_amount.clone()))
    }
}

/// What a provider is asked for
#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub sample_id: usize,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub block: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteError {
    #[error("provider has no quote for this sample")]
    NotAvailable,

    #[error("provider error: {0}")]
    Provider(String),

    #[error("quote timed out")]
    Timeout,

    #[error("invalid output amount {0:?}")]
    InvalidAmount(String),

    #[error("quote returned zero output")]
    ZeroOutput,

    #[error("no liquidity")]
    NoLiquidity,
}

#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError>;

    /// Whether quotes carry executable calldata
    fn supports_simulation(&self) -> bool;

    /// Reference provider others are compared against
    fn is_baseline(&self) -> bool {
        false
    }
}

// ============================================
// ZERO-OUTPUT POLICY
// ============================================

/// How to treat a quote whose output is zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZeroQuotePolicy {
    /// A zero quote is a provider error
    #[default]
    Error,
    /// A zero quote means the route has no liquidity; not an error
    NoLiquidity,
}

impl ZeroQuotePolicy {
    /// Parsed output, or the policy's verdict on a zero
    pub fn check(&self, quote: &Quote) -> Result<U256, QuoteError> {
        let output = quote.output()?;
        if !output.is_zero() {
            return Ok(output);
        }
        match self {
            ZeroQuotePolicy::Error => Err(QuoteError::ZeroOutput),
            ZeroQuotePolicy::NoLiquidity => Err(QuoteError::NoLiquidity),
        }
    }
}

impl FromStr for ZeroQuotePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(ZeroQuotePolicy::Error),
            "no-liquidity" | "no_liquidity" | "noliquidity" => Ok(ZeroQuotePolicy::NoLiquidity),
            other => Err(format!("expected \"error\" or \"no-liquidity\", got {:?}", other)),
        }
    }
}

impl fmt::Display for ZeroQuotePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZeroQuotePolicy::Error => write!(f, "error"),
            ZeroQuotePolicy::NoLiquidity => write!(f, "no-liquidity"),
        }
    }
}

// ============================================
// BATCH FILE
// ============================================

/// A recorded provider response inside a batch sample
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedQuote {
    pub provider: String,
    #[serde(default)]
    pub baseline: bool,
    #[serde(flatten)]
    pub quote: Option<Quote>,
    /// Provider error captured instead of a quote
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSample {
    /// Address or known symbol
    pub token_in: String,
    pub token_out: String,
    /// Smallest unit, decimal string
    pub amount_in: String,
    pub block: u64,
    /// Output-token units per native token; gas accounting is skipped without it
    #[serde(default)]
    pub native_price: Option<Decimal>,
    #[serde(default)]
    pub output_decimals: Option<u8>,
    #[serde(default)]
    pub quotes: Vec<RecordedQuote>,
}

/// A sample with tokens and amount resolved
#[derive(Debug, Clone)]
pub struct Sample {
    pub id: usize,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub block: u64,
    pub native_price: Option<Decimal>,
    pub output_decimals: Option<u8>,
}

impl Sample {
    pub fn quote_request(&self) -> QuoteRequest {
        QuoteRequest {
            sample_id: self.id,
            token_in: self.token_in,
            token_out: self.token_out,
            amount_in: self.amount_in,
            block: self.block,
        }
    }

    pub fn label(&self) -> String {
        format!(
            "{} {} -> {} @{}",
            self.amount_in,
            tokens::display_symbol(&self.token_in),
            tokens::display_symbol(&self.token_out),
            self.block
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Batch {
    pub samples: Vec<BatchSample>,
}

impl Batch {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("reading batch file {}", path.display()))?;
        serde_json::from_str(&content).wrap_err("parsing batch file")
    }

    /// Resolve every sample, failing on the first bad one
    pub fn samples(&self) -> Result<Vec<Sample>> {
        self.samples
            .iter()
            .enumerate()
            .map(|(id, raw)| {
                Ok(Sample {
                    id,
                    token_in: resolve_token(&raw.token_in)
                        .wrap_err_with(|| format!("sample {}", id))?,
                    token_out: resolve_token(&raw.token_out)
                        .wrap_err_with(|| format!("sample {}", id))?,
                    amount_in: U256::from_str_radix(raw.amount_in.trim(), 10)
                        .map_err(|e| eyre!("sample {}: bad amountIn: {}", id, e))?,
                    block: raw.block,
                    native_price: raw.native_price,
                    output_decimals: raw.output_decimals,
                })
            })
            .collect()
    }

    /// One replaying source per provider named anywhere in the batch
    pub fn recorded_sources(&self) -> Vec<RecordedQuoteSource> {
        let mut sources: Vec<RecordedQuoteSource> = Vec::new();

        for (id, sample) in self.samples.iter().enumerate() {
            for recorded in &sample.quotes {
                let position = sources.iter().position(|s| s.name == recorded.provider);
                let source = match position {
                    Some(i) => &mut sources[i],
                    None => {
                        sources.push(RecordedQuoteSource::new(&recorded.provider));
                        let last = sources.len() - 1;
                        &mut sources[last]
                    }
                };
                source.baseline |= recorded.baseline;
                let entry = match (&recorded.quote, &recorded.error) {
                    (_, Some(error)) => Err(QuoteError::Provider(error.clone())),
                    (Some(quote), None) => Ok(quote.clone()),
                    (None, None) => Err(QuoteError::NotAvailable),
                };
                source.record(id, entry);
            }
        }
        sources
    }
}

fn resolve_token(raw: &str) -> Result<Address> {
    let raw = raw.trim();
    if let Ok(address) = Address::from_str(raw) {
        return Ok(address);
    }
    tokens::find_by_symbol(raw)
        .map(|t| t.address)
        .ok_or_else(|| eyre!("unknown token {:?}", raw))
}

// ============================================
// RECORDED SOURCE
// ============================================

/// Replays a provider's captured responses, keyed by sample
#[derive(Debug, Clone)]
pub struct RecordedQuoteSource {
    name: String,
    baseline: bool,
    quotes: HashMap<usize, Result<Quote, QuoteError>>,
}

impl RecordedQuoteSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            baseline: false,
            quotes: HashMap::new(),
        }
    }

    pub fn record(&mut self, sample_id: usize, quote: Result<Quote, QuoteError>) {
        self.quotes.insert(sample_id, quote);
    }
}

#[async_trait]
impl QuoteSource for RecordedQuoteSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError> {
        debug!(
            "{}: replaying quote for {} {:?} -> {:?} @{}",
            self.name, request.amount_in, request.token_in, request.token_out, request.block
        );
        self.quotes
            .get(&request.sample_id)
            .cloned()
            .unwrap_or(Err(QuoteError::NotAvailable))
    }

    fn supports_simulation(&self) -> bool {
        self.quotes
            .values()
            .any(|q| matches!(q, Ok(quote) if quote.swap_transaction.is_some()))
    }

    fn is_baseline(&self) -> bool {
        self.baseline
    }
}
