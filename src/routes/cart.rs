//! Cart Endpoints
//!
//! 장바구니 견적과 바우처 확인. 아무것도 저장하지 않음.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{
    db::DiscountType,
    error::ApiError,
    services::orders::{self, CartItemRequest, Quote},
    services::voucher::resolve_voucher,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub items: Vec<CartItemRequest>,
    pub voucher_code: Option<String>,
}

/// POST /api/cart/quote
///
/// 잘못된 바우처 → 422
pub async fn quote_cart(
    State(state): State<AppState>,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<Quote>, ApiError> {
    let quote = orders::quote(state.store.as_ref(), &req.items, req.voucher_code.as_deref()).await?;
    Ok(Json(quote))
}

#[derive(Debug, Deserialize)]
pub struct ValidateVoucherRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct ValidVoucher {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
}

/// POST /api/vouchers/validate
pub async fn validate_voucher(
    State(state): State<AppState>,
    Json(req): Json<ValidateVoucherRequest>,
) -> Result<Json<ValidVoucher>, ApiError> {
    let applied = resolve_voucher(state.store.as_ref(), &req.code).await?;
    Ok(Json(ValidVoucher {
        discount_type: applied.discount.kind(),
        discount_value: applied.discount.value(),
        code: applied.code,
    }))
}
