//! Domain models for fee-service.

mod adjustment;
mod attendance;
mod catalog;
mod fee_structure;
mod notification;
mod order;
mod payment;
mod report;
mod student_fee;

pub use adjustment::*;
pub use attendance::*;
pub use catalog::*;
pub use fee_structure::*;
pub use notification::*;
pub use order::*;
pub use payment::*;
pub use report::*;
pub use student_fee::*;

use rust_decimal::Decimal;

/// Largest amount a `NUMERIC(12,2)` column holds: 9,999,999,999.99.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2);

/// Normalize a monetary value to two decimal places.
pub fn money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp(2);
    rounded.rescale(2);
    rounded
}
