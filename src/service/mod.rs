pub mod payment_service;

pub use payment_service::{
    CheckoutResponse, PaymentService, PaymentStatusView, StartCheckoutRequest,
};
