pub mod audit;
pub mod registration;

pub use audit::{AuditEntry, Channel, ReconcileOutcome};
pub use registration::{PaymentProvider, PaymentStatus, Registration};
