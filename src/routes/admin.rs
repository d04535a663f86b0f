//! Admin Endpoints
//!
//! 모든 핸들러는 `AdminUser` extractor를 거침 (role = admin, 아니면 403).
//!
//! # Route Structure
//!
//! ```text
//! GET/POST    /api/admin/products         PUT/DELETE /api/admin/products/:id
//! GET/POST    /api/admin/vouchers         PUT/DELETE /api/admin/vouchers/:id
//! GET/PUT     /api/admin/settings
//! GET         /api/admin/orders?status=   DELETE     /api/admin/orders/:id
//! PUT         /api/admin/orders/:id/status
//! GET         /api/admin/affiliates
//! POST        /api/admin/affiliates/:id/payout
//! ```

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::AdminUser,
    db::{
        Order, OrderStatus, Product, ProductInput, Profile, SettingsInput, StoreSettings,
        Voucher, VoucherInput, MAX_PRICE,
    },
    error::ApiError,
    routes::products::ProductQuery,
    services::affiliate::{reset_payout, Payout},
    services::orders::{update_status, StatusChange},
    services::voucher::prepare_voucher_input,
    AppState,
};

// ============ Validation ============

/// 상품 입력 검증 (저장 전에만 호출, 실패 시 아무것도 바뀌지 않음)
pub fn validate_product(mut input: ProductInput) -> Result<ProductInput, ApiError> {
    input.name = input.name.trim().to_string();
    input.category = input.category.trim().to_lowercase();

    if input.name.is_empty() {
        return Err(ApiError::ValidationError("name is required".to_string()));
    }
    let in_range = |v: i64| (0..=MAX_PRICE).contains(&v);
    if !in_range(input.price) || !in_range(input.cost_price) {
        return Err(ApiError::ValidationError(format!(
            "price and cost_price must be between 0 and {}",
            MAX_PRICE
        )));
    }
    if let Some(discount) = input.discount_price {
        if discount < 0 || discount > input.price {
            return Err(ApiError::ValidationError(
                "discount_price must be between 0 and price".to_string(),
            ));
        }
    }
    Ok(input)
}

pub fn validate_settings(mut input: SettingsInput) -> Result<SettingsInput, ApiError> {
    input.store_name = input.store_name.trim().to_string();
    input.whatsapp_number = input.whatsapp_number.trim().to_string();

    if input.store_name.is_empty() {
        return Err(ApiError::ValidationError("store_name is required".to_string()));
    }
    if !(0..=100).contains(&input.commission_rate) {
        return Err(ApiError::ValidationError(
            "commission_rate must be between 0 and 100".to_string(),
        ));
    }
    Ok(input)
}

// ============ Products ============

/// GET /api/admin/products (비활성 포함, 원가 포함)
pub async fn list_products(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.store.list_products(&query.into_filter(true)).await?))
}

pub async fn create_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(input): Json<ProductInput>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let input = validate_product(input)?;
    let product = state.store.insert_product(&input).await?;
    tracing::info!(product_id = %product.id, name = %product.name, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(input): Json<ProductInput>,
) -> Result<Json<Product>, ApiError> {
    let input = validate_product(input)?;
    state
        .store
        .update_product(id, &input)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Product".to_string()))
}

pub async fn delete_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !state.store.delete_product(id).await? {
        return Err(ApiError::NotFound("Product".to_string()));
    }
    tracing::info!(product_id = %id, "product deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ============ Vouchers ============

pub async fn list_vouchers(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<Voucher>>, ApiError> {
    Ok(Json(state.store.list_vouchers().await?))
}

/// 중복 코드 → 409
pub async fn create_voucher(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(input): Json<VoucherInput>,
) -> Result<(StatusCode, Json<Voucher>), ApiError> {
    let input = prepare_voucher_input(input)?;
    let voucher = state.store.insert_voucher(&input).await?;
    tracing::info!(code = %voucher.code, "voucher created");
    Ok((StatusCode::CREATED, Json(voucher)))
}

pub async fn update_voucher(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(input): Json<VoucherInput>,
) -> Result<Json<Voucher>, ApiError> {
    let input = prepare_voucher_input(input)?;
    state
        .store
        .update_voucher(id, &input)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Voucher".to_string()))
}

pub async fn delete_voucher(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !state.store.delete_voucher(id).await? {
        return Err(ApiError::NotFound("Voucher".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============ Settings ============

pub async fn get_settings(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<StoreSettings>, ApiError> {
    Ok(Json(state.store.get_settings().await?))
}

pub async fn update_settings(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(input): Json<SettingsInput>,
) -> Result<Json<StoreSettings>, ApiError> {
    let input = validate_settings(input)?;
    let settings = state.store.update_settings(&input).await?;
    tracing::info!(commission_rate = settings.commission_rate, "store settings updated");
    Ok(Json(settings))
}

// ============ Orders ============

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
}

pub async fn list_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.store.list_orders(query.status).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

/// PUT /api/admin/orders/:id/status
///
/// completed로 바뀌면 응답에 커미션 결과 포함
pub async fn update_order_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<StatusChange>, ApiError> {
    tracing::debug!(admin_id = %admin.id, order_id = %id, status = %req.status, "status change requested");
    Ok(Json(update_status(state.store.as_ref(), id, req.status).await?))
}

pub async fn delete_order(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !state.store.delete_order(id).await? {
        return Err(ApiError::NotFound("Order".to_string()));
    }
    tracing::info!(order_id = %id, "order deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ============ Affiliates ============

pub async fn list_affiliates(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<Profile>>, ApiError> {
    Ok(Json(state.store.list_affiliates().await?))
}

/// POST /api/admin/affiliates/:id/payout
///
/// 잔액을 0으로 초기화하고 지급할 금액과 계좌 정보를 반환
pub async fn payout_affiliate(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Payout>, ApiError> {
    reset_payout(state.store.as_ref(), id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Affiliate".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product_input(price: i64, discount: Option<i64>, cost: i64) -> ProductInput {
        ProductInput {
            name: "  Notion Template  ".to_string(),
            description: String::new(),
            category: " Templates ".to_string(),
            price,
            discount_price: discount,
            cost_price: cost,
            image_url: None,
            is_active: true,
        }
    }

    #[test]
    fn test_validate_product_normalizes() {
        let input = validate_product(product_input(50_000, Some(40_000), 10_000)).unwrap();
        assert_eq!(input.name, "Notion Template");
        assert_eq!(input.category, "templates");
    }

    #[test]
    fn test_validate_product_rejects_bad_prices() {
        assert!(validate_product(product_input(-1, None, 0)).is_err());
        assert!(validate_product(product_input(50_000, None, -5)).is_err());
        assert!(validate_product(product_input(50_000, Some(60_000), 0)).is_err());
    }

    #[test]
    fn test_validate_product_rejects_prices_above_limit() {
        assert!(validate_product(product_input(MAX_PRICE, None, MAX_PRICE)).is_ok());
        assert!(validate_product(product_input(i64::MAX / 10, None, 0)).is_err());
        assert!(validate_product(product_input(50_000, None, MAX_PRICE + 1)).is_err());
    }

    #[test]
    fn test_validate_settings_rate_bounds() {
        let settings = |rate| SettingsInput {
            store_name: "Toko".to_string(),
            whatsapp_number: "0812".to_string(),
            payment_instructions: String::new(),
            commission_rate: rate,
        };
        assert!(validate_settings(settings(0)).is_ok());
        assert!(validate_settings(settings(100)).is_ok());
        assert!(validate_settings(settings(101)).is_err());
        assert!(validate_settings(settings(-1)).is_err());
    }
}
