//! Price arithmetic and display.
//!
//! Prices are plain `Decimal` amounts in the store currency (USD). Catalog
//! prices are whole-unit decimals such as `18.50`, never cents.

use rust_decimal::Decimal;

/// Currency symbol used for display.
pub const CURRENCY_SYMBOL: &str = "$";

/// Format an amount for display, e.g. `$18.50`.
#[must_use]
pub fn format_price(amount: Decimal) -> String {
    format!("{CURRENCY_SYMBOL}{:.2}", amount.round_dp(2))
}

/// Multiply a unit price by a quantity.
#[must_use]
pub fn line_total(unit_price: Decimal, quantity: u32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_price_pads_cents() {
        assert_eq!(format_price(Decimal::new(30, 0)), "$30.00");
        assert_eq!(format_price(Decimal::new(1850, 2)), "$18.50");
    }

    #[test]
    fn test_line_total() {
        assert_eq!(line_total(Decimal::new(1250, 2), 3), Decimal::new(3750, 2));
    }
}
