//! Per-token pricing for known models.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// (input, output) USD per token for a model, or zero when unknown.
pub fn model_cost(model: &str) -> (Decimal, Decimal) {
    // Prices are per million tokens.
    let (input, output) = match model {
        m if m.starts_with("gpt-4o-mini") => (dec!(0.15), dec!(0.60)),
        m if m.starts_with("gpt-4o") => (dec!(2.50), dec!(10.00)),
        m if m.starts_with("gpt-4.1-mini") => (dec!(0.40), dec!(1.60)),
        m if m.starts_with("gpt-4.1") => (dec!(2.00), dec!(8.00)),
        _ => (Decimal::ZERO, Decimal::ZERO),
    };
    let per_million = dec!(1_000_000);
    (input / per_million, output / per_million)
}
