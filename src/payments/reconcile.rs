use chrono::Utc;
use std::sync::Arc;

use crate::{
    domain::{AuditEntry, Channel, PaymentProvider, PaymentStatus, ReconcileOutcome, Registration},
    error::{AppError, Result},
    payments::StatusSnapshot,
    repository::{AuditLogRepository, RegistrationRepository, TransitionWrite},
};

/// The sole writer of registration payment state. Both delivery channels
/// (webhook and poll) funnel through `reconcile` with a provider-confirmed,
/// normalized status; the transition policy makes repeated, duplicate and
/// out-of-order delivery harmless:
///
/// - `open -> pending -> paid`, or `open|pending -> failed|canceled|expired`
/// - terminal states admit no further transitions; `paid` in particular is a
///   sink that a late `failed` webhook must never overwrite
/// - the write is one compare-and-set UPDATE, so two concurrent invocations
///   for the same registration cannot both apply the same transition
pub struct Reconciler {
    registrations: Arc<dyn RegistrationRepository>,
    audit: Arc<dyn AuditLogRepository>,
}

impl Reconciler {
    pub fn new(
        registrations: Arc<dyn RegistrationRepository>,
        audit: Arc<dyn AuditLogRepository>,
    ) -> Self {
        Self {
            registrations,
            audit,
        }
    }

    pub async fn reconcile(
        &self,
        registration: &Registration,
        snapshot: &StatusSnapshot,
        channel: Channel,
    ) -> Result<ReconcileOutcome> {
        let provider = registration.provider.ok_or_else(|| {
            AppError::Internal(format!(
                "Registration {} has no payment in flight",
                registration.id
            ))
        })?;

        let mut notes: Vec<String> = Vec::new();
        if let Some(reported) = snapshot.amount_cents {
            if reported != registration.amount_cents {
                tracing::warn!(
                    registration_id = %registration.id,
                    expected = registration.amount_cents,
                    reported,
                    "Provider-reported amount does not match registration"
                );
                notes.push(format!(
                    "amount mismatch: expected {} got {}",
                    registration.amount_cents, reported
                ));
            }
        }

        let outcome = self.apply(registration, snapshot, &mut notes).await?;

        let entry = AuditEntry::new(
            provider,
            channel,
            Some(registration.id),
            registration.provider_payment_id.clone(),
            Some(snapshot.status),
            outcome.as_str(),
            if notes.is_empty() {
                None
            } else {
                Some(notes.join("; "))
            },
            Some(snapshot.raw.clone()),
        );
        self.append_audit(entry).await;

        Ok(outcome)
    }

    async fn apply(
        &self,
        registration: &Registration,
        snapshot: &StatusSnapshot,
        notes: &mut Vec<String>,
    ) -> Result<ReconcileOutcome> {
        let current = registration.payment_status;
        let incoming = snapshot.status;

        if registration.paid || current.is_terminal() {
            let reason = format!("registration already terminal ({})", current);
            notes.push(reason.clone());
            return Ok(ReconcileOutcome::Skipped { reason });
        }

        if incoming == PaymentStatus::Open || incoming == current {
            let reason = format!("no transition from {} to {}", current, incoming);
            notes.push(reason.clone());
            return Ok(ReconcileOutcome::Skipped { reason });
        }

        // Paid sets the flag and timestamp; a failure transition clears
        // paid_at; open -> pending touches the status alone.
        let write = if incoming == PaymentStatus::Paid {
            TransitionWrite {
                status: PaymentStatus::Paid,
                paid: true,
                paid_at: Some(snapshot.paid_at.unwrap_or_else(Utc::now)),
                payment_method: snapshot.method.clone(),
            }
        } else {
            TransitionWrite {
                status: incoming,
                paid: false,
                paid_at: None,
                payment_method: None,
            }
        };

        let applied = self
            .registrations
            .apply_transition(registration.id, incoming.allowed_from(), &write)
            .await?;

        if applied {
            tracing::info!(
                registration_id = %registration.id,
                from = %current,
                to = %incoming,
                "Payment status transition applied"
            );
            Ok(ReconcileOutcome::Applied(incoming))
        } else {
            // The guarded UPDATE matched no row: a concurrent reconciliation
            // moved the registration first.
            let reason = format!("superseded by a concurrent transition (observed {})", incoming);
            notes.push(reason.clone());
            Ok(ReconcileOutcome::Skipped { reason })
        }
    }

    /// Records a webhook that could not be matched to any registration. Not
    /// retried; the provider cannot remediate a missing registration.
    pub async fn record_unmatched(
        &self,
        provider: PaymentProvider,
        channel: Channel,
        provider_payment_id: &str,
        payload: Option<serde_json::Value>,
    ) {
        tracing::warn!(
            provider = %provider,
            provider_payment_id,
            "No registration found for provider payment id"
        );
        let entry = AuditEntry::new(
            provider,
            channel,
            None,
            Some(provider_payment_id.to_string()),
            None,
            "skipped",
            Some("no matching registration".to_string()),
            payload,
        );
        self.append_audit(entry).await;
    }

    /// Audit writes are best-effort; the registration update is strictly
    /// more important than the trail and must never be blocked by it.
    async fn append_audit(&self, entry: AuditEntry) {
        if let Err(e) = self.audit.append(entry).await {
            tracing::warn!("Failed to append payment audit entry: {}", e);
        }
    }
}
