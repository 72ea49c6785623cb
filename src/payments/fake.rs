//! Test-only provider fixtures, exposed to integration tests through the
//! `test-utils` feature.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::{
    domain::{PaymentProvider, PaymentStatus},
    payments::{
        CreatePaymentRequest, CreatedPayment, ProviderAdapter, ProviderError, StatusSnapshot,
    },
};

/// Scripted response for `fetch_status`.
#[derive(Debug, Clone)]
pub enum ScriptedFetch {
    Snapshot(StatusSnapshot),
    NotFound,
    Unavailable,
}

/// A provider adapter whose responses are scripted by the test. Fetch
/// responses are consumed in order; the last one is repeated once the queue
/// is exhausted. Counts calls so tests can assert that short-circuits and
/// authorization checks really avoided the provider.
pub struct FakeProviderAdapter {
    provider: PaymentProvider,
    fetch_queue: Mutex<Vec<ScriptedFetch>>,
    pub create_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl FakeProviderAdapter {
    pub fn new(provider: PaymentProvider) -> Self {
        Self {
            provider,
            fetch_queue: Mutex::new(Vec::new()),
            create_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn push_fetch(&self, response: ScriptedFetch) {
        self.fetch_queue.lock().unwrap().push(response);
    }

    pub fn push_status(&self, status: PaymentStatus) {
        self.push_fetch(ScriptedFetch::Snapshot(snapshot(status, None)));
    }

    pub fn push_paid(&self, paid_at: DateTime<Utc>) {
        self.push_fetch(ScriptedFetch::Snapshot(snapshot(
            PaymentStatus::Paid,
            Some(paid_at),
        )));
    }

    pub fn fetch_call_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

/// Builds a minimal snapshot the way an adapter would after normalization.
pub fn snapshot(status: PaymentStatus, paid_at: Option<DateTime<Utc>>) -> StatusSnapshot {
    StatusSnapshot {
        status,
        paid_at,
        method: match status {
            PaymentStatus::Paid => Some("testpay".to_string()),
            _ => None,
        },
        amount_cents: None,
        currency: None,
        internal_payment_id: None,
        raw: serde_json::json!({ "status": status.as_str(), "fake": true }),
    }
}

#[async_trait]
impl ProviderAdapter for FakeProviderAdapter {
    fn provider(&self) -> PaymentProvider {
        self.provider
    }

    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<CreatedPayment, ProviderError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CreatedPayment {
            provider_payment_id: format!("fake_{}", Uuid::new_v4().simple()),
            checkout_url: format!(
                "https://pay.example.test/checkout/{}",
                request.correlation.internal_payment_id
            ),
            status: PaymentStatus::Open,
        })
    }

    async fn fetch_status(
        &self,
        _provider_payment_id: &str,
    ) -> Result<StatusSnapshot, ProviderError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.fetch_queue.lock().unwrap();
        let scripted = if queue.len() > 1 {
            queue.remove(0)
        } else {
            queue
                .first()
                .cloned()
                .unwrap_or(ScriptedFetch::NotFound)
        };
        match scripted {
            ScriptedFetch::Snapshot(snapshot) => Ok(snapshot),
            ScriptedFetch::NotFound => Err(ProviderError::NotFound),
            ScriptedFetch::Unavailable => {
                Err(ProviderError::Unavailable("scripted outage".to_string()))
            }
        }
    }
}
