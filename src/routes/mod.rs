//! API Routes Module
//!
//! 모든 HTTP 엔드포인트 정의
//!
//! # Routes
//! - `/health` - 헬스 체크
//! - `/api/products/*`, `/api/cart/*`, `/api/vouchers/*` - 스토어프론트
//! - `/api/checkout` - 주문 생성 + WhatsApp 링크
//! - `/api/profiles/*`, `/api/affiliate/*`, `/api/orders/*` - 로그인 사용자
//! - `/api/admin/*` - 관리자

pub mod admin;
pub mod affiliate;
pub mod cart;
pub mod checkout;
pub mod health;
pub mod orders;
pub mod products;
pub mod profiles;
pub mod referral;
pub mod settings;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::{auth::USER_ID_HEADER, AppState};

/// 개발 환경 프론트엔드 주소
const DEV_ORIGINS: [&str; 3] = [
    "http://localhost:5173", // Vite dev server
    "http://localhost:3000",
    "http://127.0.0.1:5173",
];

fn cors_layer(state: &AppState) -> CorsLayer {
    // 프로덕션: ALLOWED_ORIGINS에 있는 도메인만
    let origins: Vec<HeaderValue> = if state.config.is_production() {
        state
            .config
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect()
    } else {
        DEV_ORIGINS.into_iter().map(HeaderValue::from_static).collect()
    };

    // ref_code 쿠키를 주고받아야 하므로 credentials 허용 (와일드카드 불가)
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(USER_ID_HEADER)])
        .allow_credentials(true)
}

/// 라우터 생성
///
/// # Route Structure
///
/// ```text
/// GET  /health
///
/// GET  /api/products              - 목록 (?q=&category=&sort=)
/// GET  /api/products/:id
/// POST /api/cart/quote            - 견적 (저장 없음)
/// POST /api/vouchers/validate
/// POST /api/checkout              - 주문 생성
/// GET  /api/settings/public
///
/// POST /api/profiles              - 가입 훅 (추천 쿠키 적용)
/// GET  /api/profiles/me
/// PUT  /api/profiles/me/bank
/// POST /api/affiliate/join
/// GET  /api/affiliate/dashboard
/// GET  /api/orders/mine
///
/// /api/admin/*                    - admin.rs 참고
/// ```
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state);

    let admin = Router::new()
        .route(
            "/products",
            get(admin::list_products).post(admin::create_product),
        )
        .route(
            "/products/:id",
            put(admin::update_product).delete(admin::delete_product),
        )
        .route(
            "/vouchers",
            get(admin::list_vouchers).post(admin::create_voucher),
        )
        .route(
            "/vouchers/:id",
            put(admin::update_voucher).delete(admin::delete_voucher),
        )
        .route(
            "/settings",
            get(admin::get_settings).put(admin::update_settings),
        )
        .route("/orders", get(admin::list_orders))
        .route("/orders/:id", axum::routing::delete(admin::delete_order))
        .route("/orders/:id/status", put(admin::update_order_status))
        .route("/affiliates", get(admin::list_affiliates))
        .route("/affiliates/:id/payout", post(admin::payout_affiliate));

    let api = Router::new()
        // Storefront
        .route("/products", get(products::list_products))
        .route("/products/:id", get(products::get_product))
        .route("/cart/quote", post(cart::quote_cart))
        .route("/vouchers/validate", post(cart::validate_voucher))
        .route("/checkout", post(checkout::checkout))
        .route("/settings/public", get(settings::public_settings))
        // Account
        .route("/profiles", post(profiles::create_profile))
        .route("/profiles/me", get(profiles::get_me))
        .route("/profiles/me/bank", put(profiles::update_bank))
        .route("/affiliate/join", post(affiliate::join))
        .route("/affiliate/dashboard", get(affiliate::dashboard))
        .route("/orders/mine", get(orders::my_orders))
        .nest("/admin", admin);

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api)
        // 미들웨어
        .layer(middleware::from_fn_with_state(
            state.clone(),
            referral::capture_referral,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // 상태 주입
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use chrono::Utc;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::Config,
        db::{MemoryStore, Product, ProductInput, Profile, Role, Store, StoreSettings},
    };

    fn profile(role: Role, affiliate_code: Option<&str>) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            email: format!("{}@example.com", role.as_str()),
            full_name: Some("Tester".to_string()),
            role,
            affiliate_code: affiliate_code.map(str::to_string),
            referred_by: None,
            balance: 0,
            bank_name: None,
            bank_account_number: None,
            bank_account_holder: None,
            created_at: Utc::now(),
        }
    }

    fn app(store: Arc<MemoryStore>) -> Router {
        create_router(AppState::new(store, Config::default()))
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_settings(StoreSettings {
            store_name: "Toko Digital".to_string(),
            whatsapp_number: "081234567890".to_string(),
            payment_instructions: "Transfer BCA 123".to_string(),
            commission_rate: 20,
            updated_at: Utc::now(),
        }))
    }

    async fn seed_product(store: &MemoryStore, price: i64, cost: i64) -> Product {
        store
            .insert_product(&ProductInput {
                name: "E-book Rust".to_string(),
                description: "Belajar Rust".to_string(),
                category: "ebook".to_string(),
                price,
                discount_price: None,
                cost_price: cost,
                image_url: None,
                is_active: true,
            })
            .await
            .unwrap()
    }

    fn request(method: &str, uri: &str, user: Option<Uuid>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(id) = user {
            builder = builder.header(USER_ID_HEADER, id.to_string());
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(resp: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_store() {
        let resp = app(store())
            .oneshot(request("GET", "/health", None, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = json_body(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["store"]["connected"], true);
    }

    #[tokio::test]
    async fn test_public_products_hide_cost_price() {
        let store = store();
        let product = seed_product(&store, 100_000, 40_000).await;

        let resp = app(store)
            .oneshot(request("GET", "/api/products?q=rust", None, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = json_body(resp).await;
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], product.id.to_string());
        assert_eq!(items[0]["effective_price"], 100_000);
        assert!(items[0].get("cost_price").is_none());
    }

    #[tokio::test]
    async fn test_ref_query_sets_cookie() {
        let resp = app(store())
            .oneshot(request("GET", "/api/products?ref=aff123", None, None))
            .await
            .unwrap();

        let cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(cookie.starts_with("ref_code=AFF123;"));
        assert!(cookie.contains("Max-Age=2592000"));
    }

    #[tokio::test]
    async fn test_invalid_voucher_is_422() {
        let resp = app(store())
            .oneshot(request(
                "POST",
                "/api/vouchers/validate",
                None,
                Some(json!({ "code": "nope" })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(resp).await["code"], "VOUCHER_INVALID");
    }

    #[tokio::test]
    async fn test_admin_routes_require_admin() {
        let store = store();
        let customer = profile(Role::Customer, None);
        store.put_profile(customer.clone()).await;
        let app = app(store);

        let resp = app
            .clone()
            .oneshot(request("GET", "/api/admin/orders", None, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .clone()
            .oneshot(request("GET", "/api/admin/orders", Some(Uuid::new_v4()), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .oneshot(request("GET", "/api/admin/orders", Some(customer.id), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_duplicate_voucher_is_conflict() {
        let store = store();
        let admin = profile(Role::Admin, None);
        store.put_profile(admin.clone()).await;
        let app = app(store);

        let voucher = json!({ "code": " hemat10 ", "discount_type": "percentage", "discount_value": 10 });
        let resp = app
            .clone()
            .oneshot(request("POST", "/api/admin/vouchers", Some(admin.id), Some(voucher.clone())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(json_body(resp).await["code"], "HEMAT10");

        let resp = app
            .oneshot(request("POST", "/api/admin/vouchers", Some(admin.id), Some(voucher)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_signup_applies_referral_cookie() {
        let store = store();
        let affiliate = profile(Role::Affiliate, Some("AFF123"));
        store.put_profile(affiliate).await;
        let user_id = Uuid::new_v4();

        let req = Request::builder()
            .method("POST")
            .uri("/api/profiles")
            .header(USER_ID_HEADER, user_id.to_string())
            .header(header::COOKIE, "theme=dark; ref_code=aff123")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "email": "baru@example.com" }).to_string()))
            .unwrap();
        let resp = app(store.clone()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(json_body(resp).await["referred_by"], "AFF123");

        let stored = store.get_profile(user_id).await.unwrap().unwrap();
        assert_eq!(stored.referred_by.as_deref(), Some("AFF123"));
    }

    #[tokio::test]
    async fn test_checkout_then_complete_pays_commission() {
        let store = store();
        let admin = profile(Role::Admin, None);
        let affiliate = profile(Role::Affiliate, Some("AFF123"));
        let mut buyer = profile(Role::Customer, None);
        buyer.referred_by = Some("AFF123".to_string());
        store.put_profile(admin.clone()).await;
        store.put_profile(affiliate.clone()).await;
        store.put_profile(buyer.clone()).await;
        let product = seed_product(&store, 100_000, 40_000).await;
        let app = app(store.clone());

        let checkout = json!({
            "customer_name": "Dewi",
            "customer_phone": "0812-3456-7890",
            "items": [{ "product_id": product.id, "quantity": 1 }],
        });
        let resp = app
            .clone()
            .oneshot(request("POST", "/api/checkout", Some(buyer.id), Some(checkout)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = json_body(resp).await;
        assert!(body["whatsapp_url"]
            .as_str()
            .unwrap()
            .starts_with("https://wa.me/6281234567890?text="));
        let order_id = body["order"]["id"].as_str().unwrap().to_string();

        let resp = app
            .clone()
            .oneshot(request(
                "PUT",
                &format!("/api/admin/orders/{}/status", order_id),
                Some(admin.id),
                Some(json!({ "status": "completed" })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["order"]["status"], "completed");
        assert_eq!(body["order"]["commission_paid"], true);
        assert_eq!(body["commission"]["status"], "paid");
        assert_eq!(body["commission"]["amount"], 12_000);

        let resp = app
            .oneshot(request("GET", "/api/affiliate/dashboard", Some(affiliate.id), None))
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["balance"], 12_000);
        assert_eq!(body["referral_count"], 1);
        assert_eq!(body["commissions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_payout_resets_balance() {
        tokio_test::block_on(async {
            let store = store();
            let admin = profile(Role::Admin, None);
            let mut affiliate = profile(Role::Affiliate, Some("AFF999"));
            affiliate.balance = 55_000;
            store.put_profile(admin.clone()).await;
            store.put_profile(affiliate.clone()).await;

            let resp = app(store.clone())
                .oneshot(request(
                    "POST",
                    &format!("/api/admin/affiliates/{}/payout", affiliate.id),
                    Some(admin.id),
                    None,
                ))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(json_body(resp).await["paid_amount"], 55_000);

            let after = store.get_profile(affiliate.id).await.unwrap().unwrap();
            assert_eq!(after.balance, 0);
        });
    }
}
