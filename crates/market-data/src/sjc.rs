//! SJC gold symbol and unit-conversion helpers.
//!
//! Storage always uses the canonical "Lượng" base (`VN.GOLD`); the "Chỉ"
//! variant (`VN.GOLD.C`, 1/10 Lượng) is a pure egress-side conversion.

use rust_decimal::Decimal;

pub const GOLD_BASE_SYMBOL: &str = "VN.GOLD";
pub const GOLD_CHI_SYMBOL: &str = "VN.GOLD.C";

/// Strip the `.C` suffix, if present, returning the canonical storage
/// symbol and whether the caller asked for the Chỉ unit.
pub fn canonicalize_gold_symbol(symbol: &str) -> (&'static str, bool) {
    if symbol.eq_ignore_ascii_case(GOLD_CHI_SYMBOL) {
        (GOLD_BASE_SYMBOL, true)
    } else {
        (GOLD_BASE_SYMBOL, false)
    }
}

pub fn is_gold_symbol(symbol: &str) -> bool {
    symbol.eq_ignore_ascii_case(GOLD_BASE_SYMBOL) || symbol.eq_ignore_ascii_case(GOLD_CHI_SYMBOL)
}

/// Divide a monetary/price field by 10 for the Chỉ egress conversion.
/// `volume` is deliberately never passed through this helper.
pub fn to_chi_unit(value: Decimal) -> Decimal {
    value / Decimal::from(10)
}
