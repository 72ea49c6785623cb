use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    error::Result,
    service::{CheckoutResponse, PaymentStatusView, StartCheckoutRequest},
};

pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<StartCheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let response = state
        .payment_service
        .start_checkout(user.member_id, request)
        .await?;
    Ok(Json(response))
}

/// Caller-triggered status poll: re-confirms with the provider and applies
/// the result before responding.
pub async fn poll_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path((club_id, participant_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<PaymentStatusView>> {
    let view = state
        .payment_service
        .poll_status(user.member_id, club_id, participant_id)
        .await?;
    Ok(Json(view))
}

/// Read-only settlement view; never calls the provider.
pub async fn get_registration(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path((club_id, participant_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<PaymentStatusView>> {
    let view = state
        .payment_service
        .registration_view(user.member_id, club_id, participant_id)
        .await?;
    Ok(Json(view))
}
