use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{PaymentProvider, PaymentStatus};

/// Which delivery channel triggered a reconciliation attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Webhook,
    Poll,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Webhook => "webhook",
            Channel::Poll => "poll",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "webhook" => Some(Channel::Webhook),
            "poll" => Some(Channel::Poll),
            _ => None,
        }
    }
}

/// Result of a single reconciliation attempt. Skipped events are normal
/// operation (duplicate webhooks, stale polls), not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied(PaymentStatus),
    Skipped { reason: String },
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied(_) => "applied",
            ReconcileOutcome::Skipped { .. } => "skipped",
        }
    }
}

/// One row of the append-only forensic trail. Written for every
/// reconciliation attempt, including no-ops and webhooks that could not be
/// matched to a registration (`registration_id == None`).
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: Uuid,
    pub registration_id: Option<Uuid>,
    pub provider: PaymentProvider,
    pub provider_payment_id: Option<String>,
    pub channel: Channel,
    pub observed_status: Option<PaymentStatus>,
    pub outcome: String,
    pub detail: Option<String>,
    /// Raw provider payload, kept verbatim for forensics.
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        provider: PaymentProvider,
        channel: Channel,
        registration_id: Option<Uuid>,
        provider_payment_id: Option<String>,
        observed_status: Option<PaymentStatus>,
        outcome: &str,
        detail: Option<String>,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            registration_id,
            provider,
            provider_payment_id,
            channel,
            observed_status,
            outcome: outcome.to_string(),
            detail,
            payload,
            created_at: Utc::now(),
        }
    }
}
