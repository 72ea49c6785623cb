use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{AuditEntry, Channel, PaymentProvider, PaymentStatus},
    error::{AppError, Result},
    repository::AuditLogRepository,
};

#[derive(FromRow)]
struct AuditRow {
    id: String,
    registration_id: Option<String>,
    provider: String,
    provider_payment_id: Option<String>,
    channel: String,
    observed_status: Option<String>,
    outcome: String,
    detail: Option<String>,
    payload: Option<String>,
    created_at: NaiveDateTime,
}

pub struct SqliteAuditLogRepository {
    pool: SqlitePool,
}

impl SqliteAuditLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: AuditRow) -> Result<AuditEntry> {
        Ok(AuditEntry {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            registration_id: row
                .registration_id
                .as_deref()
                .map(|s| Uuid::parse_str(s).map_err(|e| AppError::Database(e.to_string())))
                .transpose()?,
            provider: PaymentProvider::parse(&row.provider)
                .ok_or_else(|| AppError::Database(format!("Invalid provider: {}", row.provider)))?,
            provider_payment_id: row.provider_payment_id,
            channel: Channel::parse(&row.channel)
                .ok_or_else(|| AppError::Database(format!("Invalid channel: {}", row.channel)))?,
            observed_status: row.observed_status.as_deref().and_then(PaymentStatus::parse),
            outcome: row.outcome,
            detail: row.detail,
            payload: row
                .payload
                .as_deref()
                .map(|p| {
                    serde_json::from_str(p).map_err(|e| AppError::Database(e.to_string()))
                })
                .transpose()?,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
        })
    }
}

#[async_trait]
impl AuditLogRepository for SqliteAuditLogRepository {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        let payload_json = entry
            .payload
            .as_ref()
            .map(|p| serde_json::to_string(p))
            .transpose()
            .map_err(|e| AppError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO payment_audit_log (
                id, registration_id, provider, provider_payment_id,
                channel, observed_status, outcome, detail, payload, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.registration_id.map(|id| id.to_string()))
        .bind(entry.provider.as_str())
        .bind(&entry.provider_payment_id)
        .bind(entry.channel.as_str())
        .bind(entry.observed_status.map(|s| s.as_str()))
        .bind(&entry.outcome)
        .bind(&entry.detail)
        .bind(payload_json)
        .bind(entry.created_at.naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn list_for_registration(&self, registration_id: Uuid) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, registration_id, provider, provider_payment_id,
                   channel, observed_status, outcome, detail, payload, created_at
            FROM payment_audit_log
            WHERE registration_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(registration_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }
}
