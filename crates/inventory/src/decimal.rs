use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept for average cost and total value unless configured
/// otherwise.
pub const DEFAULT_COST_SCALE: u32 = 2;

/// Round half away from zero (8.665 -> 8.67), the way cost figures are
/// printed on bills.
pub fn round_money(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}
