use crate::handlers::common::{
    created_response, map_service_error, success_response, validate_input, PaginatedResponse,
    PaginationParams,
};
use crate::{
    auth::AuthenticatedUser, errors::ApiError, services::InitiateCheckoutInput, AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(initialize_checkout).get(list_checkouts))
        .route("/verify/:reference", get(verify_checkout))
        .route("/:id", get(get_checkout))
        .route("/:id/cancel", post(cancel_checkout))
}

/// Initialize a checkout from the account's cart. Returns the pending
/// record plus the gateway authorization handle the shopper is sent to.
async fn initialize_checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let initialized = state
        .services
        .checkout
        .initialize(
            user.id,
            &user.email,
            InitiateCheckoutInput {
                shipping_address: payload.shipping_address,
                payment_method: payload.payment_method,
            },
        )
        .await
        .map_err(map_service_error)?;

    Ok(created_response(initialized))
}

/// Poll the gateway for the authoritative status of a reference and
/// transition the matching record. Safe to call repeatedly.
async fn verify_checkout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let checkout = state
        .services
        .checkout
        .verify(&reference)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(checkout))
}

/// List the account's checkout records
async fn list_checkouts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (checkouts, total) = state
        .services
        .checkout
        .list_checkouts(user.id, pagination.page, pagination.per_page)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse::new(
        checkouts,
        pagination.page,
        pagination.per_page,
        total,
    )))
}

/// Get one checkout record with its snapshot lines
async fn get_checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .services
        .checkout
        .get_checkout(user.id, id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(detail))
}

/// Cancel a pending checkout
async fn cancel_checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let checkout = state
        .services
        .checkout
        .cancel(user.id, id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(checkout))
}

// Request DTOs

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1))]
    pub shipping_address: String,
    #[validate(length(min = 1))]
    pub payment_method: String,
}
