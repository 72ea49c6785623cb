use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{Channel, PaymentProvider, PaymentStatus, ReconcileOutcome, Registration},
    error::{AppError, Result},
    payments::{Correlation, CreatePaymentRequest, ProviderRegistry, Reconciler},
    repository::RegistrationRepository,
};

#[derive(Debug, Deserialize)]
pub struct StartCheckoutRequest {
    pub club_id: Uuid,
    pub operation_id: Uuid,
    pub participant_id: Uuid,
    pub provider: PaymentProvider,
    /// Amount due, computed upstream by the operations subsystem.
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    /// Where the provider sends the payer back after checkout.
    pub redirect_url: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub registration_id: Uuid,
    pub provider: PaymentProvider,
    pub provider_payment_id: String,
    pub checkout_url: String,
    pub status: PaymentStatus,
}

/// The settlement fields other subsystems are allowed to read.
#[derive(Debug, Serialize)]
pub struct PaymentStatusView {
    pub provider_payment_id: Option<String>,
    pub status: PaymentStatus,
    pub paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub method: Option<String>,
}

impl PaymentStatusView {
    fn from_registration(registration: &Registration) -> Self {
        Self {
            provider_payment_id: registration.provider_payment_id.clone(),
            status: registration.payment_status,
            paid: registration.paid,
            paid_at: registration.paid_at,
            updated_at: registration.updated_at,
            method: registration.payment_method.clone(),
        }
    }
}

pub struct PaymentService {
    registrations: Arc<dyn RegistrationRepository>,
    providers: Arc<ProviderRegistry>,
    reconciler: Arc<Reconciler>,
    base_url: String,
}

impl PaymentService {
    pub fn new(
        registrations: Arc<dyn RegistrationRepository>,
        providers: Arc<ProviderRegistry>,
        reconciler: Arc<Reconciler>,
        base_url: String,
    ) -> Self {
        Self {
            registrations,
            providers,
            reconciler,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Creates a payment attempt for the caller's registration: picks the
    /// provider, creates the provider-side payment with correlation metadata
    /// embedded, and records the attempt with `payment_status = open`. A
    /// terminal-failed attempt is superseded in place; a settled registration
    /// is never resurrected.
    pub async fn start_checkout(
        &self,
        caller: Uuid,
        request: StartCheckoutRequest,
    ) -> Result<CheckoutResponse> {
        if request.amount_cents <= 0 {
            return Err(AppError::InvalidArgument(
                "Amount must be positive".to_string(),
            ));
        }
        if request.currency.len() != 3 {
            return Err(AppError::InvalidArgument(
                "Currency must be a three-letter code".to_string(),
            ));
        }

        let adapter = self.providers.get(request.provider)?;

        let existing = self
            .registrations
            .find_by_club_and_participant(request.club_id, request.participant_id)
            .await?;

        if let Some(ref registration) = existing {
            if registration.member_id != caller {
                return Err(AppError::PermissionDenied);
            }
            if registration.paid {
                return Err(AppError::FailedPrecondition(
                    "Registration is already paid".to_string(),
                ));
            }
            if registration.provider.is_some() && !registration.payment_status.is_failure() {
                return Err(AppError::FailedPrecondition(
                    "A payment attempt is already in flight".to_string(),
                ));
            }
        }

        let internal_payment_id = Uuid::new_v4();
        let created = adapter
            .create_payment(&CreatePaymentRequest {
                amount_cents: request.amount_cents,
                currency: request.currency.clone(),
                description: request.description.clone(),
                redirect_url: request.redirect_url.clone(),
                webhook_url: format!(
                    "{}/api/payments/webhooks/{}",
                    self.base_url, request.provider
                ),
                correlation: Correlation {
                    club_id: request.club_id,
                    operation_id: request.operation_id,
                    participant_id: request.participant_id,
                    internal_payment_id,
                },
            })
            .await?;

        let registration_id = match existing {
            Some(registration) => {
                let reset = self
                    .registrations
                    .reset_attempt(
                        registration.id,
                        request.provider,
                        &created.provider_payment_id,
                        internal_payment_id,
                        created.status,
                        request.amount_cents,
                        &request.currency,
                    )
                    .await?;
                if !reset {
                    return Err(AppError::FailedPrecondition(
                        "Registration was settled concurrently".to_string(),
                    ));
                }
                registration.id
            }
            None => {
                let now = Utc::now();
                let registration = Registration {
                    id: Uuid::new_v4(),
                    club_id: request.club_id,
                    operation_id: request.operation_id,
                    participant_id: request.participant_id,
                    member_id: caller,
                    provider: Some(request.provider),
                    provider_payment_id: Some(created.provider_payment_id.clone()),
                    internal_payment_id: Some(internal_payment_id),
                    payment_status: created.status,
                    paid: false,
                    paid_at: None,
                    payment_method: None,
                    amount_cents: request.amount_cents,
                    currency: request.currency.clone(),
                    created_at: now,
                    updated_at: now,
                };
                self.registrations.create(registration).await?.id
            }
        };

        Ok(CheckoutResponse {
            registration_id,
            provider: request.provider,
            provider_payment_id: created.provider_payment_id,
            checkout_url: created.checkout_url,
            status: created.status,
        })
    }

    /// Caller-triggered status poll. Authorization and the paid short-circuit
    /// both happen before any provider call; the provider fetch is a single
    /// attempt bounded by the HTTP client's deadline.
    pub async fn poll_status(
        &self,
        caller: Uuid,
        club_id: Uuid,
        participant_id: Uuid,
    ) -> Result<PaymentStatusView> {
        let registration = self
            .registrations
            .find_by_club_and_participant(club_id, participant_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No registration for participant".to_string()))?;

        if registration.member_id != caller {
            return Err(AppError::PermissionDenied);
        }

        if registration.paid {
            return Ok(PaymentStatusView::from_registration(&registration));
        }

        let provider = registration.provider.ok_or_else(|| {
            AppError::FailedPrecondition("No payment has been initiated".to_string())
        })?;
        let provider_payment_id = registration.provider_payment_id.clone().ok_or_else(|| {
            AppError::FailedPrecondition("No payment has been initiated".to_string())
        })?;

        let adapter = self.providers.get(provider)?;
        let snapshot = adapter.fetch_status(&provider_payment_id).await?;

        self.reconciler
            .reconcile(&registration, &snapshot, Channel::Poll)
            .await?;

        let refreshed = self
            .registrations
            .find_by_id(registration.id)
            .await?
            .ok_or_else(|| AppError::Internal("Registration vanished".to_string()))?;

        Ok(PaymentStatusView::from_registration(&refreshed))
    }

    /// Read-only view of the settlement fields, for the participant.
    pub async fn registration_view(
        &self,
        caller: Uuid,
        club_id: Uuid,
        participant_id: Uuid,
    ) -> Result<PaymentStatusView> {
        let registration = self
            .registrations
            .find_by_club_and_participant(club_id, participant_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No registration for participant".to_string()))?;

        if registration.member_id != caller {
            return Err(AppError::PermissionDenied);
        }

        Ok(PaymentStatusView::from_registration(&registration))
    }

    /// Webhook path, shared by all three receivers once the provider payment
    /// id has been extracted. The pushed body's claimed status is never used;
    /// the status always comes from a fresh provider fetch, which doubles as
    /// authentication for the providers that do not sign their webhooks.
    pub async fn handle_webhook(
        &self,
        provider: PaymentProvider,
        provider_payment_id: &str,
    ) -> Result<ReconcileOutcome> {
        let adapter = self.providers.get(provider)?;
        let snapshot = adapter.fetch_status(provider_payment_id).await?;

        let mut registration = match snapshot.internal_payment_id {
            Some(internal_id) => {
                self.registrations
                    .find_by_internal_payment_id(internal_id)
                    .await?
            }
            None => None,
        };
        if registration.is_none() {
            registration = self
                .registrations
                .find_by_provider_payment_id(provider, provider_payment_id)
                .await?;
        }

        // A webhook for a superseded attempt must not touch the current one.
        let registration = registration.filter(|r| {
            r.provider == Some(provider)
                && r.provider_payment_id.as_deref() == Some(provider_payment_id)
        });

        match registration {
            Some(registration) => {
                self.reconciler
                    .reconcile(&registration, &snapshot, Channel::Webhook)
                    .await
            }
            None => {
                self.reconciler
                    .record_unmatched(
                        provider,
                        Channel::Webhook,
                        provider_payment_id,
                        Some(snapshot.raw.clone()),
                    )
                    .await;
                Ok(ReconcileOutcome::Skipped {
                    reason: "no matching registration".to_string(),
                })
            }
        }
    }
}
