//! # Fiscal Document Repository
//!
//! Every document the bridge issues, one row per original order document.
//! A cancellation is recorded on the original row (credit note id and
//! number, status `cancelled`) rather than as a second live row, which is
//! what lets the partial unique index enforce "one live document per order".

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use fiscal_core::{DocumentStatus, FiscalDocument};

/// Credit note details recorded against a cancelled document.
#[derive(Debug, Clone)]
pub struct Cancellation {
    pub credit_note_id: i64,
    pub credit_note_number: Option<i64>,
    pub note: String,
    pub cancelled_at: DateTime<Utc>,
}

/// Repository for fiscal document operations.
#[derive(Debug, Clone)]
pub struct DocumentRepository {
    pool: SqlitePool,
}

impl DocumentRepository {
    /// Creates a new DocumentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DocumentRepository { pool }
    }

    /// Inserts an issued document.
    ///
    /// ## Errors
    /// - [`DbError::UniqueViolation`] if the order already has a live document
    pub async fn insert(&self, doc: &FiscalDocument) -> DbResult<()> {
        debug!(
            shop_id = %doc.shop_id,
            order_id = doc.commerce_order_id,
            document_type = %doc.document_type,
            "Inserting fiscal document"
        );

        sqlx::query(
            r#"
            INSERT INTO fiscal_documents (
                id, shop_id, commerce_order_id, commerce_order_name,
                document_type, tax_code, fiscal_document_id, fiscal_number,
                tax_id, customer_name, customer_email,
                net_amount, tax_amount, gross_amount, currency,
                status, note, error_message, retry_count,
                credit_note_id, credit_note_number,
                generated_at, cancelled_at, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25
            )
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.shop_id)
        .bind(doc.commerce_order_id)
        .bind(&doc.commerce_order_name)
        .bind(doc.document_type)
        .bind(doc.tax_code)
        .bind(doc.fiscal_document_id)
        .bind(doc.fiscal_number)
        .bind(&doc.tax_id)
        .bind(&doc.customer_name)
        .bind(&doc.customer_email)
        .bind(doc.net_amount)
        .bind(doc.tax_amount)
        .bind(doc.gross_amount)
        .bind(&doc.currency)
        .bind(doc.status)
        .bind(&doc.note)
        .bind(&doc.error_message)
        .bind(doc.retry_count)
        .bind(doc.credit_note_id)
        .bind(doc.credit_note_number)
        .bind(doc.generated_at)
        .bind(doc.cancelled_at)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a document by id.
    pub async fn get(&self, id: &str) -> DbResult<FiscalDocument> {
        sqlx::query_as::<_, FiscalDocument>("SELECT * FROM fiscal_documents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("FiscalDocument", id))
    }

    /// Finds the live (not cancelled) document of an order.
    pub async fn find_live_for_order(
        &self,
        shop_id: &str,
        order_id: i64,
    ) -> DbResult<Option<FiscalDocument>> {
        let doc = sqlx::query_as::<_, FiscalDocument>(
            r#"
            SELECT * FROM fiscal_documents
            WHERE shop_id = ?1 AND commerce_order_id = ?2 AND status != ?3
            LIMIT 1
            "#,
        )
        .bind(shop_id)
        .bind(order_id)
        .bind(DocumentStatus::Cancelled)
        .fetch_optional(&self.pool)
        .await?;

        Ok(doc)
    }

    /// All documents of an order, oldest first.
    pub async fn list_for_order(&self, shop_id: &str, order_id: i64) -> DbResult<Vec<FiscalDocument>> {
        let docs = sqlx::query_as::<_, FiscalDocument>(
            r#"
            SELECT * FROM fiscal_documents
            WHERE shop_id = ?1 AND commerce_order_id = ?2
            ORDER BY created_at ASC
            "#,
        )
        .bind(shop_id)
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(docs)
    }

    /// Records a credit note against a live document.
    ///
    /// ## Returns
    /// `false` if the document was already cancelled; nothing is written.
    pub async fn mark_cancelled(&self, id: &str, cancellation: &Cancellation) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE fiscal_documents SET
                status = ?2,
                credit_note_id = ?3,
                credit_note_number = ?4,
                note = ?5,
                cancelled_at = ?6,
                updated_at = ?6
            WHERE id = ?1 AND status != ?2
            "#,
        )
        .bind(id)
        .bind(DocumentStatus::Cancelled)
        .bind(cancellation.credit_note_id)
        .bind(cancellation.credit_note_number)
        .bind(&cancellation.note)
        .bind(cancellation.cancelled_at)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() == 1;
        if applied {
            info!(
                document_id = %id,
                credit_note_id = cancellation.credit_note_id,
                "Document cancelled"
            );
        }
        Ok(applied)
    }
}
