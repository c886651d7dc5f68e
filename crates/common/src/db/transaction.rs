//! Transaction coordinator
//!
//! Runs a unit of writes on one pooled connection inside one transaction.
//! Commits when the unit returns `Ok`, rolls back on `Err`. The connection
//! goes back to the pool on every exit path because the transaction owns
//! it and is consumed by commit, rollback or drop.

use crate::errors::{AppError, Result};
use crate::metrics;
use futures::future::BoxFuture;
use sea_orm::{DatabaseTransaction, TransactionTrait};
use std::time::Instant;
use tracing::warn;

/// Run `work` atomically.
///
/// Never call the generative-text service from inside `work`; the
/// transaction holds row locks for as long as it is open.
pub async fn run_in_transaction<C, F, T>(conn: &C, work: F) -> Result<T>
where
    C: TransactionTrait,
    F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T>> + Send,
    T: Send,
{
    let start = Instant::now();

    let txn = conn.begin().await.map_err(|e| AppError::Transaction {
        message: format!("Failed to begin: {}", e),
    })?;

    match work(&txn).await {
        Ok(value) => {
            txn.commit().await.map_err(|e| {
                metrics::record_transaction(start.elapsed().as_secs_f64(), false);
                AppError::Transaction {
                    message: format!("Failed to commit: {}", e),
                }
            })?;
            metrics::record_transaction(start.elapsed().as_secs_f64(), true);
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(error = %rollback_err, "Rollback failed; connection discarded");
            }
            metrics::record_transaction(start.elapsed().as_secs_f64(), false);
            Err(err)
        }
    }
}
