use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The per-participant record tracking a single payment obligation and its
/// settlement state. Other subsystems read `paid`, `paid_at` and
/// `payment_status` for gating/display; only the reconciler writes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub id: Uuid,
    pub club_id: Uuid,
    pub operation_id: Uuid,
    pub participant_id: Uuid,
    pub member_id: Uuid,
    /// Set once per payment attempt; `None` means no payment in flight.
    pub provider: Option<PaymentProvider>,
    pub provider_payment_id: Option<String>,
    /// Locally generated correlation id, embedded in provider metadata so a
    /// webhook can be matched back even if the provider does not echo our ids.
    pub internal_payment_id: Option<Uuid>,
    pub payment_status: PaymentStatus,
    pub paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Mollie,
    Stripe,
    Paypal,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Mollie => "mollie",
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::Paypal => "paypal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mollie" => Some(PaymentProvider::Mollie),
            "stripe" => Some(PaymentProvider::Stripe),
            "paypal" => Some(PaymentProvider::Paypal),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized payment status. Provider-specific vocabularies are mapped into
/// this five-state model at the adapter boundary; nothing downstream ever
/// branches on a provider string.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Open,
    Pending,
    Paid,
    Failed,
    Canceled,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Open => "open",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(PaymentStatus::Open),
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "failed" => Some(PaymentStatus::Failed),
            "canceled" => Some(PaymentStatus::Canceled),
            "expired" => Some(PaymentStatus::Expired),
            _ => None,
        }
    }

    /// Terminal states admit no further transitions; `paid` in particular is
    /// a sink that late failure events must never overwrite.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Paid
                | PaymentStatus::Failed
                | PaymentStatus::Canceled
                | PaymentStatus::Expired
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Failed | PaymentStatus::Canceled | PaymentStatus::Expired
        )
    }

    /// The set of current statuses from which a transition to `self` is
    /// legal. Empty for `open`: it is the initial state, never a target.
    pub fn allowed_from(&self) -> &'static [PaymentStatus] {
        match self {
            PaymentStatus::Open => &[],
            PaymentStatus::Pending => &[PaymentStatus::Open],
            _ => &[PaymentStatus::Open, PaymentStatus::Pending],
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
