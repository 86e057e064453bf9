pub mod attendance;
pub mod checkout;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod policy;
pub mod postgres;
pub mod razorpay;
pub mod receipt;
pub mod store;

pub use attendance::AttendanceTracker;
pub use checkout::Checkout;
pub use error::FeeError;
pub use ledger::{FeeLedger, LedgerPolicy};
pub use memory::MemoryFeeStore;
pub use metrics::{get_metrics, init_metrics};
pub use postgres::PgFeeStore;
pub use razorpay::RazorpayClient;
pub use receipt::{ReceiptDocument, ReceiptRenderer};
pub use store::FeeStore;
