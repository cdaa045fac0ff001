use sea_orm::DatabaseTransaction;
use tracing::warn;

// Checkout
pub mod addresses;
pub mod cart;
pub mod cart_snapshot;
pub mod checkout;
pub mod delivery_quotes;
pub mod stock_ledger;

// Order lifecycle
pub mod cancellation;
pub mod order_status;
pub mod orders;
pub mod payment_proof;
pub mod scheduler;

/// Rolls back after a failed unit of work. The original error is what the
/// caller reports, so a rollback failure is only logged.
pub(crate) async fn rollback(txn: DatabaseTransaction) {
    if let Err(e) = txn.rollback().await {
        warn!(error = %e, "Transaction rollback failed");
    }
}
