use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{PaymentProvider, PaymentStatus, Registration},
    error::{AppError, Result},
    repository::{RegistrationRepository, TransitionWrite},
};

#[derive(FromRow)]
struct RegistrationRow {
    id: String,
    club_id: String,
    operation_id: String,
    participant_id: String,
    member_id: String,
    provider: Option<String>,
    provider_payment_id: Option<String>,
    internal_payment_id: Option<String>,
    payment_status: String,
    paid: bool,
    paid_at: Option<NaiveDateTime>,
    payment_method: Option<String>,
    amount_cents: i64,
    currency: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, club_id, operation_id, participant_id, member_id,
           provider, provider_payment_id, internal_payment_id,
           payment_status, paid, paid_at, payment_method,
           amount_cents, currency, created_at, updated_at
    FROM registrations
"#;

pub struct SqliteRegistrationRepository {
    pool: SqlitePool,
}

impl SqliteRegistrationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_uuid(s: &str) -> Result<Uuid> {
        Uuid::parse_str(s).map_err(|e| AppError::Database(e.to_string()))
    }

    fn row_to_registration(row: RegistrationRow) -> Result<Registration> {
        let provider = row
            .provider
            .as_deref()
            .map(|s| {
                PaymentProvider::parse(s)
                    .ok_or_else(|| AppError::Database(format!("Invalid provider: {}", s)))
            })
            .transpose()?;

        let status = PaymentStatus::parse(&row.payment_status).ok_or_else(|| {
            AppError::Database(format!("Invalid payment status: {}", row.payment_status))
        })?;

        Ok(Registration {
            id: Self::parse_uuid(&row.id)?,
            club_id: Self::parse_uuid(&row.club_id)?,
            operation_id: Self::parse_uuid(&row.operation_id)?,
            participant_id: Self::parse_uuid(&row.participant_id)?,
            member_id: Self::parse_uuid(&row.member_id)?,
            provider,
            provider_payment_id: row.provider_payment_id,
            internal_payment_id: row
                .internal_payment_id
                .as_deref()
                .map(Self::parse_uuid)
                .transpose()?,
            payment_status: status,
            paid: row.paid,
            paid_at: row.paid_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            payment_method: row.payment_method,
            amount_cents: row.amount_cents,
            currency: row.currency,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    async fn fetch_one_by(&self, sql: String, binds: Vec<String>) -> Result<Option<Registration>> {
        let mut query = sqlx::query_as::<_, RegistrationRow>(&sql);
        for b in &binds {
            query = query.bind(b);
        }
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_registration(r)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RegistrationRepository for SqliteRegistrationRepository {
    async fn create(&self, registration: Registration) -> Result<Registration> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO registrations (
                id, club_id, operation_id, participant_id, member_id,
                provider, provider_payment_id, internal_payment_id,
                payment_status, paid, paid_at, payment_method,
                amount_cents, currency, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(registration.id.to_string())
        .bind(registration.club_id.to_string())
        .bind(registration.operation_id.to_string())
        .bind(registration.participant_id.to_string())
        .bind(registration.member_id.to_string())
        .bind(registration.provider.map(|p| p.as_str()))
        .bind(&registration.provider_payment_id)
        .bind(registration.internal_payment_id.map(|id| id.to_string()))
        .bind(registration.payment_status.as_str())
        .bind(registration.paid)
        .bind(registration.paid_at.map(|dt| dt.naive_utc()))
        .bind(&registration.payment_method)
        .bind(registration.amount_cents)
        .bind(&registration.currency)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(registration.id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created registration".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Registration>> {
        self.fetch_one_by(
            format!("{} WHERE id = ?", SELECT_COLUMNS),
            vec![id.to_string()],
        )
        .await
    }

    async fn find_by_club_and_participant(
        &self,
        club_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Option<Registration>> {
        self.fetch_one_by(
            format!("{} WHERE club_id = ? AND participant_id = ?", SELECT_COLUMNS),
            vec![club_id.to_string(), participant_id.to_string()],
        )
        .await
    }

    async fn find_by_provider_payment_id(
        &self,
        provider: PaymentProvider,
        provider_payment_id: &str,
    ) -> Result<Option<Registration>> {
        self.fetch_one_by(
            format!(
                "{} WHERE provider = ? AND provider_payment_id = ?",
                SELECT_COLUMNS
            ),
            vec![provider.as_str().to_string(), provider_payment_id.to_string()],
        )
        .await
    }

    async fn find_by_internal_payment_id(
        &self,
        internal_payment_id: Uuid,
    ) -> Result<Option<Registration>> {
        self.fetch_one_by(
            format!("{} WHERE internal_payment_id = ?", SELECT_COLUMNS),
            vec![internal_payment_id.to_string()],
        )
        .await
    }

    async fn reset_attempt(
        &self,
        id: Uuid,
        provider: PaymentProvider,
        provider_payment_id: &str,
        internal_payment_id: Uuid,
        initial_status: PaymentStatus,
        amount_cents: i64,
        currency: &str,
    ) -> Result<bool> {
        let now = Utc::now().naive_utc();

        // `paid = 0` guard: a settled registration must never be pointed at
        // a new attempt.
        let result = sqlx::query(
            r#"
            UPDATE registrations
            SET provider = ?,
                provider_payment_id = ?,
                internal_payment_id = ?,
                payment_status = ?,
                paid = 0,
                paid_at = NULL,
                payment_method = NULL,
                amount_cents = ?,
                currency = ?,
                updated_at = ?
            WHERE id = ? AND paid = 0
            "#,
        )
        .bind(provider.as_str())
        .bind(provider_payment_id)
        .bind(internal_payment_id.to_string())
        .bind(initial_status.as_str())
        .bind(amount_cents)
        .bind(currency)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        allowed_from: &[PaymentStatus],
        write: &TransitionWrite,
    ) -> Result<bool> {
        if allowed_from.is_empty() {
            return Ok(false);
        }

        let placeholders = vec!["?"; allowed_from.len()].join(", ");
        let sql = format!(
            r#"
            UPDATE registrations
            SET payment_status = ?,
                paid = ?,
                paid_at = ?,
                payment_method = COALESCE(?, payment_method),
                updated_at = ?
            WHERE id = ? AND paid = 0 AND payment_status IN ({})
            "#,
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(write.status.as_str())
            .bind(write.paid)
            .bind(write.paid_at.map(|dt| dt.naive_utc()))
            .bind(&write.payment_method)
            .bind(Utc::now().naive_utc())
            .bind(id.to_string());
        for from in allowed_from {
            query = query.bind(from.as_str());
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }
}
