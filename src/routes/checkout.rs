//! Checkout Endpoint
//!
//! # Flow
//!
//! ```text
//! POST /api/checkout
//!   → 주문 저장 (pending)
//!   → { order, whatsapp_url }
//!   → 클라이언트가 whatsapp_url로 이동
//! ```

use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};

use crate::{
    auth::OptionalUser,
    error::ApiError,
    services::orders::{place_order, CheckoutRequest, PlacedOrder},
    services::referral::stored_referral_code,
    AppState,
};

/// POST /api/checkout
///
/// 로그인 사용자면 추천 쿠키를 프로필에 연결하고 buyer_id를 기록.
/// 비회원 주문도 허용 (커미션 대상 아님).
pub async fn checkout(
    State(state): State<AppState>,
    OptionalUser(buyer): OptionalUser,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<PlacedOrder>), ApiError> {
    let stored = stored_referral_code(&headers);
    let placed = place_order(state.store.as_ref(), buyer.as_ref(), stored.as_deref(), &req).await?;
    Ok((StatusCode::CREATED, Json(placed)))
}
