use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::*;
use crate::error::Result;

pub mod audit_log_repository;
pub mod registration_repository;

pub use audit_log_repository::SqliteAuditLogRepository;
pub use registration_repository::SqliteRegistrationRepository;

/// Fields the reconciler writes in one atomic transition.
#[derive(Debug, Clone)]
pub struct TransitionWrite {
    pub status: PaymentStatus,
    pub paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
}

#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    async fn create(&self, registration: Registration) -> Result<Registration>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Registration>>;
    async fn find_by_club_and_participant(
        &self,
        club_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Option<Registration>>;
    async fn find_by_provider_payment_id(
        &self,
        provider: PaymentProvider,
        provider_payment_id: &str,
    ) -> Result<Option<Registration>>;
    async fn find_by_internal_payment_id(
        &self,
        internal_payment_id: Uuid,
    ) -> Result<Option<Registration>>;

    /// Point an existing registration at a fresh payment attempt, resetting
    /// its settlement state to `open`. Refuses (returns `false`) if the row
    /// has been paid in the meantime; a settled registration is never
    /// resurrected.
    async fn reset_attempt(
        &self,
        id: Uuid,
        provider: PaymentProvider,
        provider_payment_id: &str,
        internal_payment_id: Uuid,
        initial_status: PaymentStatus,
        amount_cents: i64,
        currency: &str,
    ) -> Result<bool>;

    /// Single guarded UPDATE implementing the transition policy: applies only
    /// while `paid = 0` and the current status is in `allowed_from`. Returns
    /// `true` if the row changed. This compare-and-set is what makes
    /// concurrent webhook/poll reconciliation safe without locks.
    async fn apply_transition(
        &self,
        id: Uuid,
        allowed_from: &[PaymentStatus],
        write: &TransitionWrite,
    ) -> Result<bool>;
}

#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<()>;
    async fn list_for_registration(&self, registration_id: Uuid) -> Result<Vec<AuditEntry>>;
}
