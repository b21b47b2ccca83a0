//! Diagnostic tool - Check configuration and fork node reachability
//!
//! Run with: cargo run --bin diagnose

use std::env;
use std::time::Duration;

fn display_url(url: &str) -> String {
    let chars: Vec<char> = url.chars().collect();
    if chars.len() > 50 {
        let head: String = chars[..30].iter().collect();
        let tail: String = chars[chars.len() - 15..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        url.to_string()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("🔍 DEX-BENCH DIAGNOSTIC CHECK\n");

    // Load .env
    dotenvy::dotenv().ok();

    println!("═══════════════════════════════════════════════════");
    println!("                  CONFIGURATION                     ");
    println!("═══════════════════════════════════════════════════\n");

    let checks = [
        ("ASSUMED_GAS_PRICE_WEI", "1000000000", "Gas price used for cost accounting"),
        ("GAS_CEILING", "3000000", "Gas limit on swap transactions"),
        ("FUNDING_BUFFER_MULTIPLIER", "10", "Input funded as amount x this"),
        ("SETTLE_DELAY_MS", "100", "Pause after fork resets and storage writes"),
        ("NODE_READY_TIMEOUT_SECS", "120", "How long to wait for the fork node"),
        ("QUOTE_TIMEOUT_SECS", "30", "Per-provider quote deadline"),
        ("RESULTS_PATH", "./results/simulations.jsonl", "Where result rows go"),
        ("ZERO_QUOTE_POLICY", "error", "error | no-liquidity"),
        (
            "TEST_ACCOUNT",
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
            "Impersonated swap sender",
        ),
    ];

    for (key, default, desc) in checks {
        let (value, marker) = match env::var(key) {
            Ok(value) => (value, "(from .env)"),
            Err(_) => (default.to_string(), "(default)"),
        };
        println!("  {}: {} {}", key, value, marker);
        println!("    └─ {}\n", desc);
    }

    println!("═══════════════════════════════════════════════════");
    println!("                     ENDPOINTS                      ");
    println!("═══════════════════════════════════════════════════\n");

    let fork_rpc = env::var("FORK_RPC_URL").ok();
    let upstream = env::var("UPSTREAM_RPC_URL").ok();
    let health = env::var("FORK_HEALTH_URL").ok();

    for (key, value) in [
        ("FORK_RPC_URL", &fork_rpc),
        ("UPSTREAM_RPC_URL", &upstream),
        ("FORK_HEALTH_URL", &health),
    ] {
        match value {
            Some(url) => println!("  {:<17} ✅ {}", key, display_url(url)),
            None => println!("  {:<17} ❌ Not set", key),
        }
    }

    println!("\n═══════════════════════════════════════════════════");
    println!("                      STATUS                        ");
    println!("═══════════════════════════════════════════════════\n");

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            println!("  ❌ Could not build HTTP client: {}", e);
            return;
        }
    };

    if let Some(url) = &health {
        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => println!("  ✅ Health endpoint OK"),
            Ok(resp) => println!("  ⚠️  Health endpoint returned {}", resp.status()),
            Err(e) => println!("  ❌ Health endpoint unreachable: {}", e),
        }
    }

    match &fork_rpc {
        Some(url) => {
            let body = serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "eth_blockNumber",
                "params": []
            });
            match client.post(url).json(&body).send().await {
                Ok(resp) => match resp.json::<serde_json::Value>().await {
                    Ok(value) => match value.get("result").and_then(|r| r.as_str()) {
                        Some(hex) => {
                            let block = u64::from_str_radix(hex.trim_start_matches("0x"), 16)
                                .unwrap_or_default();
                            println!("  ✅ Fork node answering at block {}", block);
                        }
                        None => println!("  ⚠️  Fork node replied without a block: {}", value),
                    },
                    Err(e) => println!("  ❌ Fork node sent an unreadable reply: {}", e),
                },
                Err(e) => println!("  ❌ Fork node unreachable: {}", e),
            }
        }
        None => {
            println!("  ❌ FORK_RPC_URL is required");
            println!("     Start anvil with --fork-url and point FORK_RPC_URL at it.");
        }
    }

    if upstream.is_none() {
        println!("\n  ⚠️  UPSTREAM_RPC_URL is required for fork resets.");
    }

    println!("\n✅ Diagnostic complete!\n");
}
