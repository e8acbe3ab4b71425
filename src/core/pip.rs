// Pip arithmetic, symbol-class dependent
//
// Every threshold in the engine is expressed in pips. The pip divisor
// depends on the symbol class: JPY-quoted pairs and metals quote with two
// decimals (divisor 100), crypto pairs trade in whole price units
// (divisor 1), every other FX pair uses four decimals (divisor 10000).
// pips = price_diff * divisor.

const CRYPTO_BASES: [&str; 8] = ["BTC", "ETH", "LTC", "XRP", "BCH", "ADA", "DOT", "SOL"];

/// Pip divisor for a symbol, derived from its class.
pub fn pip_divisor(symbol: &str) -> f64 {
    let upper = symbol.to_uppercase();

    if CRYPTO_BASES.iter().any(|base| upper.starts_with(base)) {
        return 1.0;
    }
    if upper.ends_with("JPY") || upper.starts_with("XAU") || upper.starts_with("XAG") {
        return 100.0;
    }
    10000.0
}

/// Convert a raw price difference into pips for the given symbol.
pub fn price_to_pips(price_diff: f64, symbol: &str) -> f64 {
    price_diff * pip_divisor(symbol)
}

/// Convert a pip count into a price offset for the given symbol.
pub fn pips_to_price(pips: f64, symbol: &str) -> f64 {
    pips / pip_divisor(symbol)
}
