//! # Event Ledger Repository
//!
//! Idempotency ledger for inbound webhook events.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   claim() ──INSERT OR NOTHING──► pending                                │
//! │                                     │ start_processing() (CAS)          │
//! │                                     ▼                                   │
//! │                                processing ──complete()──► completed     │
//! │                                  ▲    │                                 │
//! │                 claim_for_retry()│    └──fail()────────► failed         │
//! │                       (CAS)      └───────────────────────────┘          │
//! │                                                                         │
//! │  pending / processing untouched since the stale cutoff ──────────────► │
//! │  claim_for_retry() as well (a worker died holding the claim).          │
//! │                                                                         │
//! │  Every transition is one UPDATE guarded by the expected status, so two │
//! │  concurrent deliveries can never both move the same record.            │
//! │  completed is terminal. failed is terminal unless retryable.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use fiscal_core::{EventRecord, EventStatus, EventTopic};

/// Outcome of [`EventRepository::claim`].
#[derive(Debug, Clone)]
pub enum Claim {
    /// This call inserted the record; the caller owns processing.
    New(EventRecord),
    /// A record already existed for the natural key.
    Existing(EventRecord),
}

impl Claim {
    pub fn record(&self) -> &EventRecord {
        match self {
            Claim::New(record) | Claim::Existing(record) => record,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Claim::New(_))
    }
}

/// Repository for the webhook event ledger.
#[derive(Debug, Clone)]
pub struct EventRepository {
    pool: SqlitePool,
}

impl EventRepository {
    /// Creates a new EventRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EventRepository { pool }
    }

    /// Atomically creates the record for (shop, topic, natural id) if absent.
    ///
    /// Whichever caller wins the insert gets [`Claim::New`]; everyone else
    /// observes the winner's row as [`Claim::Existing`].
    pub async fn claim(
        &self,
        shop_id: &str,
        topic: EventTopic,
        natural_id: &str,
        payload: &str,
    ) -> DbResult<Claim> {
        let now = Utc::now();

        let inserted = sqlx::query(
            r#"
            INSERT INTO webhook_events (
                id, shop_id, topic, natural_id, status, payload, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            ON CONFLICT (shop_id, topic, natural_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(shop_id)
        .bind(topic)
        .bind(natural_id)
        .bind(EventStatus::Pending)
        .bind(payload)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected()
            == 1;

        let record = self
            .find(shop_id, topic, natural_id)
            .await?
            .ok_or_else(|| DbError::not_found("EventRecord", natural_id))?;

        debug!(
            shop_id = %shop_id,
            topic = %topic,
            natural_id = %natural_id,
            inserted,
            status = ?record.status,
            "Claimed event"
        );

        Ok(if inserted {
            Claim::New(record)
        } else {
            Claim::Existing(record)
        })
    }

    /// Finds a record by natural key.
    pub async fn find(
        &self,
        shop_id: &str,
        topic: EventTopic,
        natural_id: &str,
    ) -> DbResult<Option<EventRecord>> {
        let record = sqlx::query_as::<_, EventRecord>(
            "SELECT * FROM webhook_events WHERE shop_id = ?1 AND topic = ?2 AND natural_id = ?3",
        )
        .bind(shop_id)
        .bind(topic)
        .bind(natural_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Gets a record by id.
    pub async fn get(&self, id: &str) -> DbResult<EventRecord> {
        sqlx::query_as::<_, EventRecord>("SELECT * FROM webhook_events WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("EventRecord", id))
    }

    /// `pending → processing`. Returns `false` if someone else got there first.
    pub async fn start_processing(&self, id: &str) -> DbResult<bool> {
        self.transition(id, EventStatus::Pending, EventStatus::Processing)
            .await
    }

    async fn transition(&self, id: &str, from: EventStatus, to: EventStatus) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE webhook_events SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `processing → completed` with a JSON result reference.
    pub async fn complete(&self, id: &str, result_json: &str) -> DbResult<bool> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE webhook_events SET
                status = ?2,
                result = ?3,
                error_message = NULL,
                retryable = 0,
                next_attempt_at = NULL,
                processed_at = ?4,
                updated_at = ?4
            WHERE id = ?1 AND status = ?5
            "#,
        )
        .bind(id)
        .bind(EventStatus::Completed)
        .bind(result_json)
        .bind(now)
        .bind(EventStatus::Processing)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `processing → failed`.
    ///
    /// `next_attempt_at` is only meaningful when `retryable` is set.
    pub async fn fail(
        &self,
        id: &str,
        message: &str,
        retryable: bool,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> DbResult<bool> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE webhook_events SET
                status = ?2,
                error_message = ?3,
                retryable = ?4,
                next_attempt_at = ?5,
                processed_at = ?6,
                updated_at = ?6
            WHERE id = ?1 AND status = ?7
            "#,
        )
        .bind(id)
        .bind(EventStatus::Failed)
        .bind(message)
        .bind(retryable)
        .bind(if retryable { next_attempt_at } else { None })
        .bind(now)
        .bind(EventStatus::Processing)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Events the replay worker should pick up, oldest first: retryable
    /// failures that are due, and `pending`/`processing` rows abandoned
    /// before `stale_before`.
    pub async fn list_due_retries(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        max_attempts: u32,
        limit: u32,
    ) -> DbResult<Vec<EventRecord>> {
        let records = sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT * FROM webhook_events
            WHERE retry_count < ?4
              AND (
                (status = ?1 AND retryable = 1
                    AND (next_attempt_at IS NULL OR next_attempt_at <= ?5))
                OR (status IN (?2, ?3) AND updated_at <= ?6)
              )
            ORDER BY updated_at ASC
            LIMIT ?7
            "#,
        )
        .bind(EventStatus::Failed)
        .bind(EventStatus::Pending)
        .bind(EventStatus::Processing)
        .bind(i64::from(max_attempts))
        .bind(now)
        .bind(stale_before)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// `failed (retryable) → processing`, or takes over a `pending` /
    /// `processing` row untouched since `stale_before`. Bumps `retry_count`.
    ///
    /// Guarded on `retry_count` so two workers cannot replay the same
    /// attempt.
    pub async fn claim_for_retry(
        &self,
        id: &str,
        expected_retry_count: i64,
        stale_before: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events SET
                status = ?2,
                retry_count = retry_count + 1,
                updated_at = ?5
            WHERE id = ?1
              AND retry_count = ?6
              AND (
                (status = ?3 AND retryable = 1)
                OR (status IN (?4, ?2) AND updated_at <= ?7)
              )
            "#,
        )
        .bind(id)
        .bind(EventStatus::Processing)
        .bind(EventStatus::Failed)
        .bind(EventStatus::Pending)
        .bind(Utc::now())
        .bind(expected_retry_count)
        .bind(stale_before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Lists a shop's events, newest first.
    pub async fn list_for_shop(&self, shop_id: &str, limit: u32) -> DbResult<Vec<EventRecord>> {
        let records = sqlx::query_as::<_, EventRecord>(
            "SELECT * FROM webhook_events WHERE shop_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )
        .bind(shop_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
