//! # Sequence Repository
//!
//! Per-tenant document counters, one per `(kind, period)`.
//!
//! The increment is a single upsert inside the caller's transaction, so two
//! writers can never draw the same number and a rolled-back document gives
//! its number back.

use sqlx::SqliteConnection;

use crate::error::DbResult;
use mizan_core::DocumentKind;

#[derive(Debug, Clone, Copy)]
pub struct SequenceRepository<'t> {
    tenant_id: &'t str,
}

impl<'t> SequenceRepository<'t> {
    pub fn new(tenant_id: &'t str) -> Self {
        SequenceRepository { tenant_id }
    }

    /// Draws the next value (starting at 1) for `kind` in `period`.
    pub async fn next(
        &self,
        conn: &mut SqliteConnection,
        kind: DocumentKind,
        period: &str,
    ) -> DbResult<i64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO document_sequences (tenant_id, kind, period, last_value)
            VALUES (?1, ?2, ?3, 1)
            ON CONFLICT (tenant_id, kind, period)
            DO UPDATE SET last_value = last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(self.tenant_id)
        .bind(kind.as_str())
        .bind(period)
        .fetch_one(&mut *conn)
        .await?;

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_sequences_are_per_kind_and_period() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let repo = SequenceRepository::new(db.tenant_id());

        assert_eq!(repo.next(&mut conn, DocumentKind::SalesInvoice, "202610").await.unwrap(), 1);
        assert_eq!(repo.next(&mut conn, DocumentKind::SalesInvoice, "202610").await.unwrap(), 2);
        assert_eq!(repo.next(&mut conn, DocumentKind::CreditNote, "202610").await.unwrap(), 1);
        assert_eq!(repo.next(&mut conn, DocumentKind::SalesInvoice, "202611").await.unwrap(), 1);

        let other = SequenceRepository::new("tenant-b");
        assert_eq!(other.next(&mut conn, DocumentKind::SalesInvoice, "202610").await.unwrap(), 1);
    }
}
