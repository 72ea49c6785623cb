use std::sync::Arc;

use crate::{auth::AuthService, config::Settings, service::PaymentService};

#[derive(Clone)]
pub struct AppState {
    pub payment_service: Arc<PaymentService>,
    pub auth_service: Arc<AuthService>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        payment_service: Arc<PaymentService>,
        auth_service: Arc<AuthService>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            payment_service,
            auth_service,
            settings,
        }
    }
}
