//! Customer Order History

use axum::{extract::State, Json};

use crate::{auth::CurrentUser, db::Order, error::ApiError, AppState};

/// GET /api/orders/mine
///
/// 최신 주문 먼저
pub async fn my_orders(
    State(state): State<AppState>,
    CurrentUser(profile): CurrentUser,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.store.list_orders_by_buyer(profile.id).await?))
}
