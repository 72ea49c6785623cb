use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    config::PaypalConfig,
    domain::{PaymentProvider, PaymentStatus},
    payments::{
        cents_to_decimal, decimal_to_cents, CreatePaymentRequest, CreatedPayment, ProviderAdapter,
        ProviderError, StatusSnapshot,
    },
};

/// PayPal Orders API (v2) with client-credentials OAuth. PayPal is the
/// pull-oriented integration: settlement is normally observed by the status
/// poll after the payer returns; webhooks are accepted but authenticated by
/// re-fetching the order, the same way Mollie's are.
pub struct PaypalAdapter {
    client: reqwest::Client,
    config: PaypalConfig,
}

#[derive(Debug, Deserialize)]
struct OauthToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PaypalOrder {
    id: String,
    status: String,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
    #[serde(default)]
    links: Vec<PaypalLink>,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    custom_id: Option<String>,
    amount: Option<PaypalAmount>,
    payments: Option<PurchaseUnitPayments>,
}

#[derive(Debug, Deserialize)]
struct PaypalAmount {
    currency_code: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnitPayments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
struct Capture {
    create_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaypalLink {
    rel: String,
    href: String,
}

impl PaypalAdapter {
    pub fn new(client: reqwest::Client, config: PaypalConfig) -> Self {
        Self { client, config }
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.config.api_url))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Unavailable(format!(
                "PayPal token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: OauthToken = response.json().await?;
        Ok(token.access_token)
    }

    fn normalize_status(status: &str) -> Result<PaymentStatus, ProviderError> {
        match status {
            "CREATED" | "PAYER_ACTION_REQUIRED" => Ok(PaymentStatus::Open),
            "SAVED" | "APPROVED" => Ok(PaymentStatus::Pending),
            "COMPLETED" => Ok(PaymentStatus::Paid),
            "VOIDED" => Ok(PaymentStatus::Canceled),
            other => Err(ProviderError::Unavailable(format!(
                "Unrecognized PayPal order status: {}",
                other
            ))),
        }
    }

    fn snapshot_from_order(
        order: PaypalOrder,
        raw: serde_json::Value,
    ) -> Result<StatusSnapshot, ProviderError> {
        let status = Self::normalize_status(&order.status)?;
        let unit = order.purchase_units.into_iter().next();

        let internal_payment_id = unit
            .as_ref()
            .and_then(|u| u.custom_id.as_deref())
            .and_then(|s| Uuid::parse_str(s).ok());
        let paid_at: Option<DateTime<Utc>> = unit
            .as_ref()
            .and_then(|u| u.payments.as_ref())
            .and_then(|p| p.captures.first())
            .and_then(|c| c.create_time.as_deref())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let amount = unit.and_then(|u| u.amount);

        Ok(StatusSnapshot {
            status,
            paid_at,
            method: Some("paypal".to_string()),
            amount_cents: amount.as_ref().and_then(|a| decimal_to_cents(&a.value)),
            currency: amount.map(|a| a.currency_code),
            internal_payment_id,
            raw,
        })
    }

    fn map_error_status(status: StatusCode, body: String) -> ProviderError {
        if status == StatusCode::NOT_FOUND {
            ProviderError::NotFound
        } else if status.is_client_error() {
            ProviderError::InvalidRequest(format!("PayPal returned {}: {}", status, body))
        } else {
            ProviderError::Unavailable(format!("PayPal returned {}: {}", status, body))
        }
    }
}

#[async_trait]
impl ProviderAdapter for PaypalAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Paypal
    }

    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<CreatedPayment, ProviderError> {
        let token = self.access_token().await?;
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": request.correlation.participant_id,
                "custom_id": request.correlation.internal_payment_id,
                "description": request.description,
                "amount": {
                    "currency_code": request.currency,
                    "value": cents_to_decimal(request.amount_cents),
                },
            }],
            "application_context": {
                "return_url": request.redirect_url,
                "cancel_url": request.redirect_url,
            },
        });

        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.config.api_url))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_error_status(status, body));
        }

        let raw: serde_json::Value = response.json().await?;
        let order: PaypalOrder = serde_json::from_value(raw)
            .map_err(|e| ProviderError::Unavailable(format!("Malformed PayPal response: {}", e)))?;
        let normalized = Self::normalize_status(&order.status)?;
        let checkout_url = order
            .links
            .into_iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href)
            .ok_or_else(|| {
                ProviderError::Unavailable("PayPal returned no approval URL".to_string())
            })?;

        Ok(CreatedPayment {
            provider_payment_id: order.id,
            checkout_url,
            status: normalized,
        })
    }

    async fn fetch_status(
        &self,
        provider_payment_id: &str,
    ) -> Result<StatusSnapshot, ProviderError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!(
                "{}/v2/checkout/orders/{}",
                self.config.api_url, provider_payment_id
            ))
            .bearer_auth(&token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_error_status(status, body));
        }

        let raw: serde_json::Value = response.json().await?;
        let order: PaypalOrder = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::Unavailable(format!("Malformed PayPal response: {}", e)))?;
        Self::snapshot_from_order(order, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_order_states() {
        assert_eq!(
            PaypalAdapter::normalize_status("CREATED").unwrap(),
            PaymentStatus::Open
        );
        assert_eq!(
            PaypalAdapter::normalize_status("PAYER_ACTION_REQUIRED").unwrap(),
            PaymentStatus::Open
        );
        assert_eq!(
            PaypalAdapter::normalize_status("APPROVED").unwrap(),
            PaymentStatus::Pending
        );
        assert_eq!(
            PaypalAdapter::normalize_status("COMPLETED").unwrap(),
            PaymentStatus::Paid
        );
        assert_eq!(
            PaypalAdapter::normalize_status("VOIDED").unwrap(),
            PaymentStatus::Canceled
        );
        assert!(PaypalAdapter::normalize_status("REFUNDED").is_err());
    }

    #[test]
    fn snapshot_reads_capture_time_and_custom_id() {
        let raw = serde_json::json!({
            "id": "5O190127TN364715T",
            "status": "COMPLETED",
            "purchase_units": [{
                "custom_id": "5f8b2a1e-1111-4a6b-9d3c-00000000000a",
                "amount": { "currency_code": "EUR", "value": "42.00" },
                "payments": {
                    "captures": [{ "create_time": "2024-03-20T14:02:11Z" }]
                }
            }]
        });
        let order: PaypalOrder = serde_json::from_value(raw.clone()).unwrap();
        let snapshot = PaypalAdapter::snapshot_from_order(order, raw).unwrap();

        assert_eq!(snapshot.status, PaymentStatus::Paid);
        assert_eq!(snapshot.amount_cents, Some(4200));
        assert!(snapshot.paid_at.is_some());
        assert_eq!(
            snapshot.internal_payment_id.unwrap().to_string(),
            "5f8b2a1e-1111-4a6b-9d3c-00000000000a"
        );
    }
}
