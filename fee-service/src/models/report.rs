use rust_decimal::Decimal;
use serde::Serialize;

/// Institute-wide aggregates behind the admin fee report.
#[derive(Debug, Clone, Serialize)]
pub struct FeeTotals {
    pub total_students: i64,
    pub total_fees_collected: Decimal,
    pub pending_fees: Decimal,
}
