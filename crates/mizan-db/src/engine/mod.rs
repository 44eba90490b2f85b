//! # Ledger Engines
//!
//! The five engines that own the ledger's units of work, plus master-data
//! lookups.
//!
//! ## Control Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  request handler                                                       │
//! │       │                                                                 │
//! │       ├──► InvoiceEngine ──────────┐                                   │
//! │       ├──► TransferEngine ─────────┤                                   │
//! │       ├──► CreditNoteEngine ───────┼──► stock::post_delta ──► stocks   │
//! │       │         (approval)         │         + movement  ──► movements │
//! │       │                            │                                    │
//! │       └──► PaymentEngine ──► invoice::save_settlement ──► invoices     │
//! │                                                                         │
//! │  Every arrow on the right runs inside ONE `BEGIN IMMEDIATE`            │
//! │  transaction opened by the engine entry point.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Retry
//! Each public mutation validates its input, then runs its transaction
//! through [`retry_once`]. A [`DbError::ConsistencyViolation`] (lock
//! contention or a stale invoice version) re-runs the whole unit of work
//! once; any other error, or a second violation, goes back to the caller.

pub mod credit_note;
pub mod invoice;
pub mod master;
pub mod payment;
pub mod stock;
pub mod transfer;

use std::future::Future;

use chrono::NaiveDate;
use sqlx::SqliteConnection;
use tracing::warn;

use mizan_core::{DocumentKind, Location};

use crate::config::NumberingSettings;
use crate::error::{DbError, DbResult};
use crate::repository::{MasterRepository, SequenceRepository};

/// Runs `operation`, re-running it once on a consistency violation.
pub(crate) async fn retry_once<T, F, Fut>(name: &'static str, mut operation: F) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    match operation().await {
        Err(err) if err.is_retryable() => {
            warn!(operation = name, error = %err, "Consistency violation, retrying once");
            operation().await
        }
        result => result,
    }
}

/// `YYYYMM` numbering period of a document date.
pub(crate) fn period_of(date: NaiveDate) -> String {
    date.format("%Y%m").to_string()
}

/// Draws the next document number for `kind` dated `date`.
pub(crate) async fn next_document_number(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    numbering: &NumberingSettings,
    kind: DocumentKind,
    date: NaiveDate,
) -> DbResult<String> {
    let period = period_of(date);
    let seq = SequenceRepository::new(tenant_id)
        .next(conn, kind, &period)
        .await?;
    Ok(numbering.format(kind, &period, seq))
}

/// Active location or `NotFound`.
pub(crate) async fn require_location(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    location_id: &str,
) -> DbResult<Location> {
    MasterRepository::new(tenant_id)
        .get_location(conn, location_id)
        .await?
        .ok_or_else(|| DbError::not_found("Location", location_id))
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use mizan_core::CoreError;

    use super::*;

    #[tokio::test]
    async fn test_retry_once_reruns_a_single_time() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: DbResult<()> = retry_once("busy", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(DbError::ConsistencyViolation("database is locked".into()))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(result, Err(DbError::ConsistencyViolation(_))));
    }

    #[tokio::test]
    async fn test_retry_once_recovers_after_one_violation() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_once("stale", || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(DbError::ConsistencyViolation("stale version".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_once_leaves_rule_errors_alone() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: DbResult<()> = retry_once("rule", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::invalid_transition("Credit note", "cn-1", "approved", "cancel").into())
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(DbError::Core(_))));
    }

    #[test]
    fn test_period_of() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(period_of(date), "202603");
    }
}
