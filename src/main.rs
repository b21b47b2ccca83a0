//! dex-bench - Quote Verification on a Forked Chain
//!
//! Run with: cargo run -- --batch samples.json
//!
//! Replays recorded aggregator quotes, then executes each provider's swap
//! calldata against an anvil fork pinned to the quote's block.

use clap::Parser;
use color_eyre::eyre::{bail, Result, WrapErr};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod fork;
mod injector;
mod node;
mod quotes;
mod retry;
mod runner;
mod simulator;
mod tokens;

use config::Config;
use fork::ForkController;
use injector::BalanceInjector;
use node::{AnvilNode, SharedNode};
use quotes::{Batch, QuoteSource};
use runner::Runner;
use simulator::{GasAccountant, SwapExecutor, SwapSettings};

#[derive(Debug, Parser)]
#[command(name = "dex-bench", version, about = "Verify DEX aggregator quotes on a forked chain")]
struct Cli {
    /// Samples with recorded provider quotes (JSON)
    #[arg(long)]
    batch: PathBuf,

    /// TOML config file; environment / .env is used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the results file
    #[arg(long)]
    results: Option<PathBuf>,

    /// Collect quotes only, every simulation is recorded as skipped
    #[arg(long)]
    no_simulate: bool,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🔬 DEX-BENCH - Aggregator Quote Verification").cyan().bold()
    );
    println!(
        "{}",
        style("    Fork Reset | Balance Injection | Gas-Adjusted Output").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

async fn build_executor(config: &Config) -> Result<SwapExecutor> {
    let node: SharedNode = Arc::new(
        AnvilNode::connect(&config.fork_rpc_url, &config.upstream_rpc_url)
            .wrap_err("could not set up the fork RPC client")?,
    );

    let fork = ForkController::new(
        node.clone(),
        config.fork_health_url.clone(),
        config.settle_delay(),
    )
    .wrap_err("invalid fork reset policy")?;

    println!("{}", style("Waiting for the fork node...").blue());
    fork.wait_until_ready(config.node_ready_timeout())
        .await
        .wrap_err("fork node never became ready")?;
    let head = fork.current_block().await?;
    println!("{} Fork node ready at block {}", style("✓").green(), head);
    println!();

    let settings = SwapSettings {
        test_account: config.test_account,
        gas_ceiling: config.gas_ceiling,
        funding_multiplier: config.funding_buffer_multiplier,
    };

    let injector = BalanceInjector::new(node, config.settle_delay())
        .wrap_err("invalid storage read policy")?;
    let executor = SwapExecutor::new(
        fork,
        injector,
        GasAccountant::new(config.assumed_gas_price_wei as u128),
        settings,
    )
    .wrap_err("invalid swap retry policy")?;
    Ok(executor)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dex_bench=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    print_banner();

    // Load configuration
    let loaded = match &cli.config {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration invalid: {}", e);
            error!("Please check your .env file or --config");
            return Err(e.into());
        }
    };
    if let Some(results) = &cli.results {
        config.results_path = results.display().to_string();
    }

    config.print_summary();
    println!();

    let batch = Batch::from_file(&cli.batch)?;
    let samples = batch.samples()?;
    let sources: Vec<Box<dyn QuoteSource>> = batch
        .recorded_sources()
        .into_iter()
        .map(|source| Box::new(source) as Box<dyn QuoteSource>)
        .collect();

    info!(
        "Loaded {} samples with {} providers from {}",
        samples.len(),
        sources.len(),
        cli.batch.display()
    );

    let executor = if cli.no_simulate {
        warn!("--no-simulate: quotes only");
        None
    } else {
        Some(build_executor(&config).await?)
    };

    // Ctrl-C stops after the in-flight step; remaining rows are written as skipped
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing up");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut runner = Runner::new(sources, executor, shutdown_rx)
        .with_quote_timeout(config.quote_timeout())
        .with_zero_quote_policy(config.zero_quote_policy)
        .with_results_path(&config.results_path)
        .with_progress(true);

    let summary = runner.run(&samples).await;
    summary.print();
    println!("Results: {}", style(&config.results_path).cyan());
    println!();

    if summary.interrupted {
        bail!("run interrupted before all samples were simulated");
    }

    Ok(())
}
