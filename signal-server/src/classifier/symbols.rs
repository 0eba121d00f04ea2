//! Symbol resolution against a closed alphabet of well-known tickers.
//!
//! Broker-side symbol suffixes (e.g. XAUUSDm) are resolved by the broker
//! adapter at trade time, never here.

use once_cell::sync::Lazy;
use regex::Regex;

/// Well-known tickers, checked by substring in listed order.
const COMMON_SYMBOLS: &[&str] = &[
    // Forex majors and crosses
    "EURUSD", "GBPUSD", "USDJPY", "USDCHF", "AUDUSD", "NZDUSD", "EURJPY", "EURGBP", "GBPJPY",
    "AUDNZD", "CADCHF", "AUDCAD",
    // Metals and energies
    "XAUUSD", "GOLD", "XAGUSD", "SILVER", "USOIL", "UKOIL", "XTIUSD", "XBRUSD",
    // Indices
    "US30", "NAS100", "NASDAQ", "GER30", "DE30", "DE40", "SPX500", "US500", "HK30", "JPN225",
    // Crypto
    "BTC", "ETH", "XRP", "ADA", "DOT", "SOL",
];

const ALIASES: &[(&str, &str)] = &[
    ("GOLD", "XAUUSD"),
    ("SILVER", "XAGUSD"),
    ("OIL", "USOIL"),
    ("NASDAQ", "NAS100"),
    ("DOW", "US30"),
];

static FOREX_PAIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z]{3})[/\s]?([A-Z]{3})\b").expect("forex pair regex"));

static CRYPTO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(BTC|ETH|XRP|ADA|SOL)\b").expect("crypto regex"));

fn alias(symbol: &str) -> String {
    ALIASES
        .iter()
        .find(|(from, _)| *from == symbol)
        .map(|(_, to)| to.to_string())
        .unwrap_or_else(|| symbol.to_string())
}

/// Resolve a trading symbol from free text, or None when no known
/// ticker appears.
pub fn resolve(text: &str) -> Option<String> {
    let upper = text.to_uppercase();

    for symbol in COMMON_SYMBOLS {
        if upper.contains(symbol) {
            return Some(alias(symbol));
        }
    }

    // 6-letter forex pairs, optionally split by slash or whitespace
    if let Some(captures) = FOREX_PAIR_RE.captures(&upper) {
        return Some(format!("{}{}", &captures[1], &captures[2]));
    }

    if let Some(captures) = CRYPTO_RE.captures(&upper) {
        return Some(captures[1].to_string());
    }

    None
}
