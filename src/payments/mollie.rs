use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    config::MollieConfig,
    domain::{PaymentProvider, PaymentStatus},
    payments::{
        cents_to_decimal, decimal_to_cents, CreatePaymentRequest, CreatedPayment, ProviderAdapter,
        ProviderError, StatusSnapshot,
    },
};

/// Mollie Payments API (v2). Mollie's webhook carries only a payment id and
/// is unsigned; authenticity comes from re-fetching the payment from the API.
pub struct MollieAdapter {
    client: reqwest::Client,
    config: MollieConfig,
}

#[derive(Debug, Deserialize)]
struct MolliePayment {
    id: String,
    status: String,
    #[serde(rename = "paidAt")]
    paid_at: Option<String>,
    method: Option<String>,
    amount: Option<MollieAmount>,
    metadata: Option<serde_json::Value>,
    #[serde(rename = "_links")]
    links: Option<MollieLinks>,
}

#[derive(Debug, Deserialize)]
struct MollieAmount {
    value: String,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct MollieLinks {
    checkout: Option<MollieLink>,
}

#[derive(Debug, Deserialize)]
struct MollieLink {
    href: String,
}

impl MollieAdapter {
    pub fn new(client: reqwest::Client, config: MollieConfig) -> Self {
        Self { client, config }
    }

    fn normalize_status(status: &str) -> Result<PaymentStatus, ProviderError> {
        match status {
            "open" => Ok(PaymentStatus::Open),
            // An authorized payment has not settled yet.
            "pending" | "authorized" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "canceled" => Ok(PaymentStatus::Canceled),
            "expired" => Ok(PaymentStatus::Expired),
            other => Err(ProviderError::Unavailable(format!(
                "Unrecognized Mollie status: {}",
                other
            ))),
        }
    }

    fn snapshot_from_payment(
        payment: MolliePayment,
        raw: serde_json::Value,
    ) -> Result<StatusSnapshot, ProviderError> {
        let status = Self::normalize_status(&payment.status)?;
        let paid_at = payment
            .paid_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let internal_payment_id = payment
            .metadata
            .as_ref()
            .and_then(|m| m.get("internal_payment_id"))
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());

        Ok(StatusSnapshot {
            status,
            paid_at,
            method: payment.method,
            amount_cents: payment
                .amount
                .as_ref()
                .and_then(|a| decimal_to_cents(&a.value)),
            currency: payment.amount.map(|a| a.currency),
            internal_payment_id,
            raw,
        })
    }

    async fn read_body(
        response: reqwest::Response,
    ) -> Result<(MolliePayment, serde_json::Value), ProviderError> {
        let raw: serde_json::Value = response.json().await?;
        let payment: MolliePayment = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::Unavailable(format!("Malformed Mollie response: {}", e)))?;
        Ok((payment, raw))
    }

    fn map_error_status(status: StatusCode, body: String) -> ProviderError {
        if status == StatusCode::NOT_FOUND {
            ProviderError::NotFound
        } else if status.is_client_error() {
            ProviderError::InvalidRequest(format!("Mollie returned {}: {}", status, body))
        } else {
            ProviderError::Unavailable(format!("Mollie returned {}: {}", status, body))
        }
    }
}

#[async_trait]
impl ProviderAdapter for MollieAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Mollie
    }

    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<CreatedPayment, ProviderError> {
        let body = json!({
            "amount": {
                "currency": request.currency,
                "value": cents_to_decimal(request.amount_cents),
            },
            "description": request.description,
            "redirectUrl": request.redirect_url,
            "webhookUrl": request.webhook_url,
            "metadata": {
                "club_id": request.correlation.club_id,
                "operation_id": request.correlation.operation_id,
                "participant_id": request.correlation.participant_id,
                "internal_payment_id": request.correlation.internal_payment_id,
            },
        });

        let response = self
            .client
            .post(format!("{}/v2/payments", self.config.api_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 404 from payment creation is a routing problem, not a missing payment
            if status == StatusCode::NOT_FOUND {
                return Err(ProviderError::Unavailable(format!(
                    "Mollie returned 404: {}",
                    body
                )));
            }
            return Err(Self::map_error_status(status, body));
        }

        let (payment, _raw) = Self::read_body(response).await?;
        let normalized = Self::normalize_status(&payment.status)?;
        let checkout_url = payment
            .links
            .and_then(|l| l.checkout)
            .map(|l| l.href)
            .ok_or_else(|| {
                ProviderError::Unavailable("Mollie returned no checkout URL".to_string())
            })?;

        Ok(CreatedPayment {
            provider_payment_id: payment.id,
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
                "{}/v2/payments/{}",
                self.config.api_url, provider_payment_id
            ))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_error_status(status, body));
        }

        let (payment, raw) = Self::read_body(response).await?;
        Self::snapshot_from_payment(payment, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_full_mollie_vocabulary() {
        assert_eq!(
            MollieAdapter::normalize_status("open").unwrap(),
            PaymentStatus::Open
        );
        assert_eq!(
            MollieAdapter::normalize_status("pending").unwrap(),
            PaymentStatus::Pending
        );
        assert_eq!(
            MollieAdapter::normalize_status("authorized").unwrap(),
            PaymentStatus::Pending
        );
        assert_eq!(
            MollieAdapter::normalize_status("paid").unwrap(),
            PaymentStatus::Paid
        );
        assert_eq!(
            MollieAdapter::normalize_status("failed").unwrap(),
            PaymentStatus::Failed
        );
        assert_eq!(
            MollieAdapter::normalize_status("canceled").unwrap(),
            PaymentStatus::Canceled
        );
        assert_eq!(
            MollieAdapter::normalize_status("expired").unwrap(),
            PaymentStatus::Expired
        );
        assert!(MollieAdapter::normalize_status("refunded").is_err());
    }

    #[test]
    fn snapshot_extracts_correlation_and_amount() {
        let raw = serde_json::json!({
            "id": "tr_WDqYK6vllg",
            "status": "paid",
            "paidAt": "2024-03-20T13:28:37+00:00",
            "method": "ideal",
            "amount": { "value": "25.00", "currency": "EUR" },
            "metadata": {
                "club_id": "5f8b2a1e-1111-4a6b-9d3c-000000000001",
                "operation_id": "5f8b2a1e-1111-4a6b-9d3c-000000000002",
                "participant_id": "5f8b2a1e-1111-4a6b-9d3c-000000000003",
                "internal_payment_id": "5f8b2a1e-1111-4a6b-9d3c-000000000004"
            }
        });
        let payment: MolliePayment = serde_json::from_value(raw.clone()).unwrap();
        let snapshot = MollieAdapter::snapshot_from_payment(payment, raw).unwrap();

        assert_eq!(snapshot.status, PaymentStatus::Paid);
        assert_eq!(snapshot.amount_cents, Some(2500));
        assert_eq!(snapshot.currency.as_deref(), Some("EUR"));
        assert_eq!(snapshot.method.as_deref(), Some("ideal"));
        assert!(snapshot.paid_at.is_some());
        assert_eq!(
            snapshot.internal_payment_id.unwrap().to_string(),
            "5f8b2a1e-1111-4a6b-9d3c-000000000004"
        );
    }
}
