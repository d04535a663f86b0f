//! Storefront Product Endpoints
//!
//! 공개 카탈로그. 원가(cost_price)는 응답에 포함하지 않음.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::{Product, ProductFilter, ProductSort},
    error::ApiError,
    AppState,
};

/// 상품 목록 쿼리
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    /// 이름/설명 검색어
    pub q: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub sort: ProductSort,
}

impl ProductQuery {
    pub fn into_filter(self, include_inactive: bool) -> ProductFilter {
        let non_empty = |v: Option<String>| {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        };
        ProductFilter {
            search: non_empty(self.q),
            category: non_empty(self.category),
            sort: self.sort,
            include_inactive,
        }
    }
}

/// 공개용 상품 (원가 제외)
#[derive(Debug, Serialize)]
pub struct PublicProduct {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: i64,
    pub discount_price: Option<i64>,
    /// 실제 판매가
    pub effective_price: i64,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Product> for PublicProduct {
    fn from(p: Product) -> Self {
        Self {
            effective_price: p.effective_price(),
            id: p.id,
            name: p.name,
            description: p.description,
            category: p.category,
            price: p.price,
            discount_price: p.discount_price,
            image_url: p.image_url,
            created_at: p.created_at,
        }
    }
}

/// GET /api/products?q=&category=&sort=
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Vec<PublicProduct>>, ApiError> {
    let products = state.store.list_products(&query.into_filter(false)).await?;
    Ok(Json(products.into_iter().map(PublicProduct::from).collect()))
}

/// GET /api/products/:id
///
/// 비활성 상품은 404
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicProduct>, ApiError> {
    match state.store.get_product(id).await? {
        Some(product) if product.is_active => Ok(Json(product.into())),
        _ => Err(ApiError::NotFound("Product".to_string())),
    }
}
