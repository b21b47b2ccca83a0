//! Token definitions for the benchmark
//!
//! A small registry of well-known mainnet tokens, used for display symbols
//! and as the decimals source when a batch file omits them. Unknown tokens
//! fall back to an on-chain `decimals()` call.

use alloy_primitives::{address, Address};

/// Placeholder many aggregators use for the native token
pub const NATIVE_SENTINEL: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

/// Represents a token we know about
#[derive(Debug, Clone)]
pub struct Token {
    pub symbol: &'static str,
    pub address: Address,
    pub decimals: u8,
}

// ============================================
// REGISTRY
// ============================================

pub fn known_tokens() -> Vec<Token> {
    vec![
        Token {
            symbol: "ETH",
            address: NATIVE_SENTINEL,
            decimals: 18,
        },
        Token {
            symbol: "WETH",
            address: address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            decimals: 18,
        },
        Token {
            symbol: "USDC",
            address: address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            decimals: 6,
        },
        Token {
            symbol: "USDT",
            address: address!("dAC17F958D2ee523a2206206994597C13D831ec7"),
            decimals: 6,
        },
        Token {
            symbol: "DAI",
            address: address!("6B175474E89094C44Da98b954EedcdeCB5BE3830"),
            decimals: 18,
        },
        Token {
            symbol: "WBTC",
            address: address!("2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599"),
            decimals: 8,
        },
        Token {
            symbol: "USDS",
            address: address!("dC035D45d973E3EC169d2276DDab16f1e407384F"),
            decimals: 18,
        },
        Token {
            symbol: "crvUSD",
            address: address!("f939E0A03FB07F59A73314E73794Be0E57ac1b4E"),
            decimals: 18,
        },
        Token {
            symbol: "PYUSD",
            address: address!("6c3ea9036406852006290770BEdFcAbA0e23A0e8"),
            decimals: 6,
        },
        Token {
            symbol: "stETH",
            address: address!("ae7ab96520DE3A18E5e111B5EaAb095312D7fE84"),
            decimals: 18,
        },
        Token {
            symbol: "wstETH",
            address: address!("7f39C581F595B53c5cb19bD0b3f8dA6c935E2Ca0"),
            decimals: 18,
        },
        Token {
            symbol: "LINK",
            address: address!("514910771AF9Ca656af840dff83E8264EcF986CA"),
            decimals: 18,
        },
        Token {
            symbol: "UNI",
            address: address!("1f9840a85d5aF5bf1D1762F925BDADdC4201F984"),
            decimals: 18,
        },
    ]
}

/// Get token by address (the zero address resolves to native ETH)
pub fn get_token(address: &Address) -> Option<Token> {
    let address = if is_native(address) {
        NATIVE_SENTINEL
    } else {
        *address
    };
    known_tokens().into_iter().find(|t| t.address == address)
}

/// Get token by symbol, case-insensitive
pub fn find_by_symbol(symbol: &str) -> Option<Token> {
    known_tokens()
        .into_iter()
        .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
}

pub fn known_decimals(address: &Address) -> Option<u8> {
    get_token(address).map(|t| t.decimals)
}

/// Symbol if known, else a shortened address
pub fn display_symbol(address: &Address) -> String {
    match get_token(address) {
        Some(token) => token.symbol.to_string(),
        None => {
            let hex = format!("{:#x}", address);
            format!("{}…{}", &hex[..6], &hex[hex.len() - 4..])
        }
    }
}

/// Zero address or the 0xEeee sentinel
pub fn is_native(address: &Address) -> bool {
    *address == Address::ZERO || *address == NATIVE_SENTINEL
}
