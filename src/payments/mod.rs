use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::ProviderConfig,
    domain::{PaymentProvider, PaymentStatus},
    error::AppError,
};

pub mod mollie;
pub mod paypal;
pub mod reconcile;
pub mod stripe;

#[cfg(any(test, feature = "test-utils"))]
pub mod fake;

pub use reconcile::Reconciler;

#[derive(Error, Debug)]
pub enum ProviderError {
    /// Network failure, timeout or provider 5xx. Transient; never retried
    /// inline, recovered by the provider's webhook retry or a later poll.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider rejected our request (4xx validation error).
    #[error("provider rejected request: {0}")]
    InvalidRequest(String),

    /// The provider has no record of the referenced payment id. Distinct
    /// from a legitimate `open` status.
    #[error("payment not found at provider")]
    NotFound,
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Unavailable(err.to_string())
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unavailable(msg) => AppError::ProviderUnavailable(msg),
            ProviderError::InvalidRequest(msg) => AppError::InvalidProviderRequest(msg),
            ProviderError::NotFound => {
                AppError::NotFound("Payment not found at provider".to_string())
            }
        }
    }
}

/// Identifiers embedded in a payment at creation time so an asynchronous
/// webhook can be matched back to the originating registration.
#[derive(Debug, Clone)]
pub struct Correlation {
    pub club_id: Uuid,
    pub operation_id: Uuid,
    pub participant_id: Uuid,
    pub internal_payment_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    pub redirect_url: String,
    pub webhook_url: String,
    pub correlation: Correlation,
}

#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub provider_payment_id: String,
    pub checkout_url: String,
    pub status: PaymentStatus,
}

/// Provider-confirmed view of a payment, already normalized. The raw payload
/// is carried along untouched for the audit trail.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub method: Option<String>,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
    /// Our correlation id, if the provider echoed its metadata back.
    pub internal_payment_id: Option<Uuid>,
    pub raw: serde_json::Value,
}

/// Common shape over the three payment processors. Implementations hold no
/// mutable state; status normalization lives entirely behind this boundary.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<CreatedPayment, ProviderError>;

    async fn fetch_status(
        &self,
        provider_payment_id: &str,
    ) -> Result<StatusSnapshot, ProviderError>;
}

/// The adapters configured for this deployment, keyed by provider.
pub struct ProviderRegistry {
    adapters: HashMap<PaymentProvider, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let mut registry = Self::new();

        if let Some(mollie) = config.mollie.as_ref().filter(|c| c.enabled) {
            registry.register(Arc::new(mollie::MollieAdapter::new(
                http_client.clone(),
                mollie.clone(),
            )));
        }
        if let Some(stripe) = config.stripe.as_ref().filter(|c| c.enabled) {
            registry.register(Arc::new(stripe::StripeAdapter::new(
                http_client.clone(),
                stripe.clone(),
            )));
        }
        if let Some(paypal) = config.paypal.as_ref().filter(|c| c.enabled) {
            registry.register(Arc::new(paypal::PaypalAdapter::new(
                http_client,
                paypal.clone(),
            )));
        }

        Ok(registry)
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn get(&self, provider: PaymentProvider) -> Result<Arc<dyn ProviderAdapter>, AppError> {
        self.adapters.get(&provider).cloned().ok_or_else(|| {
            AppError::FailedPrecondition(format!("Provider {} is not configured", provider))
        })
    }

    pub fn is_configured(&self, provider: PaymentProvider) -> bool {
        self.adapters.contains_key(&provider)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats a cent amount as the decimal string Mollie and PayPal expect,
/// e.g. 1250 -> "12.50".
pub(crate) fn cents_to_decimal(amount_cents: i64) -> String {
    format!("{}.{:02}", amount_cents / 100, (amount_cents % 100).abs())
}

pub(crate) fn decimal_to_cents(value: &str) -> Option<i64> {
    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, "0"),
    };
    let negative = value.starts_with('-');
    let whole: i64 = whole.parse().ok()?;
    let frac = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        2 => frac.parse::<i64>().ok()?,
        _ => return None,
    };
    Some(whole * 100 + if negative { -frac } else { frac })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_formatting() {
        assert_eq!(cents_to_decimal(1250), "12.50");
        assert_eq!(cents_to_decimal(5), "0.05");
        assert_eq!(cents_to_decimal(100), "1.00");
    }

    #[test]
    fn decimal_parsing() {
        assert_eq!(decimal_to_cents("12.50"), Some(1250));
        assert_eq!(decimal_to_cents("0.05"), Some(5));
        assert_eq!(decimal_to_cents("7"), Some(700));
        assert_eq!(decimal_to_cents("1.5"), Some(150));
        assert_eq!(decimal_to_cents("-12.50"), Some(-1250));
        assert_eq!(decimal_to_cents("-0.50"), Some(-50));
        assert_eq!(decimal_to_cents("not-a-number"), None);
    }
}
