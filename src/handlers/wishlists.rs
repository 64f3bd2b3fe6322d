use crate::handlers::common::{map_service_error, success_response};
use crate::{auth::AuthenticatedUser, errors::ApiError, AppState};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

/// Creates the router for wishlist endpoints
pub fn wishlists_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_wishlist))
        .route("/:product_id/toggle", post(toggle_item))
}

/// List the account's wishlist
async fn list_wishlist(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .services
        .wishlists
        .list(user.id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(items))
}

/// Toggle a product on the wishlist: removed if present, added otherwise
async fn toggle_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .wishlists
        .toggle(user.id, product_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(outcome))
}
