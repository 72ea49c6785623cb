use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{
    config::StripeConfig,
    domain::{PaymentProvider, PaymentStatus},
    payments::{
        CreatePaymentRequest, CreatedPayment, ProviderAdapter, ProviderError, StatusSnapshot,
    },
};

type HmacSha256 = Hmac<Sha256>;

/// How far a webhook's signed timestamp may drift before the event is
/// rejected as a replay.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Stripe Checkout Sessions over the form-encoded REST API. Stripe pushes
/// signed webhooks (`Stripe-Signature`), but the pushed body is only used to
/// extract the session id; status always comes from a fresh API fetch.
pub struct StripeAdapter {
    client: reqwest::Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    url: Option<String>,
    status: String,
    payment_status: Option<String>,
    amount_total: Option<i64>,
    currency: Option<String>,
    metadata: Option<serde_json::Value>,
}

impl StripeAdapter {
    pub fn new(client: reqwest::Client, config: StripeConfig) -> Self {
        Self { client, config }
    }

    /// A checkout session reports two axes: the session lifecycle and the
    /// payment settlement. Both collapse into the internal vocabulary here.
    fn normalize_status(
        session_status: &str,
        payment_status: Option<&str>,
    ) -> Result<PaymentStatus, ProviderError> {
        match (session_status, payment_status) {
            ("complete", Some("paid")) | ("complete", Some("no_payment_required")) => {
                Ok(PaymentStatus::Paid)
            }
            // Session closed but funds not yet captured (delayed methods).
            ("complete", _) => Ok(PaymentStatus::Pending),
            ("open", _) => Ok(PaymentStatus::Open),
            ("expired", _) => Ok(PaymentStatus::Expired),
            (other, _) => Err(ProviderError::Unavailable(format!(
                "Unrecognized Stripe session status: {}",
                other
            ))),
        }
    }

    fn snapshot_from_session(
        session: CheckoutSession,
        raw: serde_json::Value,
    ) -> Result<StatusSnapshot, ProviderError> {
        let status = Self::normalize_status(&session.status, session.payment_status.as_deref())?;
        let internal_payment_id = session
            .metadata
            .as_ref()
            .and_then(|m| m.get("internal_payment_id"))
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());

        Ok(StatusSnapshot {
            status,
            // Sessions carry no settlement timestamp; the reconciler falls
            // back to its own clock.
            paid_at: None,
            method: None,
            amount_cents: session.amount_total,
            currency: session.currency.map(|c| c.to_uppercase()),
            internal_payment_id,
            raw,
        })
    }

    fn map_error_status(status: StatusCode, body: String) -> ProviderError {
        if status == StatusCode::NOT_FOUND {
            ProviderError::NotFound
        } else if status.is_client_error() {
            ProviderError::InvalidRequest(format!("Stripe returned {}: {}", status, body))
        } else {
            ProviderError::Unavailable(format!("Stripe returned {}: {}", status, body))
        }
    }

    pub fn webhook_secret(&self) -> &str {
        &self.config.webhook_secret
    }
}

#[async_trait]
impl ProviderAdapter for StripeAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }

    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<CreatedPayment, ProviderError> {
        let amount = request.amount_cents.to_string();
        let correlation = &request.correlation;
        let form: Vec<(&str, String)> = vec![
            ("mode", "payment".to_string()),
            ("success_url", request.redirect_url.clone()),
            ("cancel_url", request.redirect_url.clone()),
            (
                "line_items[0][price_data][currency]",
                request.currency.to_lowercase(),
            ),
            ("line_items[0][price_data][unit_amount]", amount),
            (
                "line_items[0][price_data][product_data][name]",
                request.description.clone(),
            ),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "client_reference_id",
                correlation.internal_payment_id.to_string(),
            ),
            ("metadata[club_id]", correlation.club_id.to_string()),
            ("metadata[operation_id]", correlation.operation_id.to_string()),
            (
                "metadata[participant_id]",
                correlation.participant_id.to_string(),
            ),
            (
                "metadata[internal_payment_id]",
                correlation.internal_payment_id.to_string(),
            ),
        ];

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.config.api_url))
            .bearer_auth(&self.config.secret_key)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_error_status(status, body));
        }

        let raw: serde_json::Value = response.json().await?;
        let session: CheckoutSession = serde_json::from_value(raw)
            .map_err(|e| ProviderError::Unavailable(format!("Malformed Stripe response: {}", e)))?;
        let normalized = Self::normalize_status(&session.status, session.payment_status.as_deref())?;
        let checkout_url = session.url.ok_or_else(|| {
            ProviderError::Unavailable("Stripe returned no checkout URL".to_string())
        })?;

        Ok(CreatedPayment {
            provider_payment_id: session.id,
            checkout_url,
            status: normalized,
        })
    }

    async fn fetch_status(
        &self,
        provider_payment_id: &str,
    ) -> Result<StatusSnapshot, ProviderError> {
        let response = self
            .client
            .get(format!(
                "{}/v1/checkout/sessions/{}",
                self.config.api_url, provider_payment_id
            ))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_error_status(status, body));
        }

        let raw: serde_json::Value = response.json().await?;
        let session: CheckoutSession = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::Unavailable(format!("Malformed Stripe response: {}", e)))?;
        Self::snapshot_from_session(session, raw)
    }
}

/// Verifies a `Stripe-Signature` header (`t=<unix>,v1=<hex hmac>`) against the
/// raw request body. The signed payload is `"{t}.{body}"` keyed with the
/// endpoint's webhook secret.
pub fn verify_webhook_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    now_unix: i64,
) -> bool {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<String> = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = match timestamp {
        Some(t) => t,
        None => return false,
    };
    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return false;
    }

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    candidates
        .iter()
        .any(|candidate| candidate.as_bytes().ct_eq(expected.as_bytes()).into())
}

/// Builds a valid `Stripe-Signature` header for a payload. Test fixture for
/// exercising the webhook receiver.
#[cfg(any(test, feature = "test-utils"))]
pub fn sign_webhook_payload(payload: &str, secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}
