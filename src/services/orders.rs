//! Checkout & Order Workflow
//!
//! # Checkout Flow
//!
//! ```text
//! 1. 입력 검증 (이름, 전화번호, 상품)
//! 2. 상품 조회 → 가격/원가 스냅샷
//! 3. 바우처 적용 (최대 1개)
//! 4. 주문 저장 (status = pending)
//! 5. WhatsApp 링크 생성 → 클라이언트가 리다이렉트
//! ```
//!
//! # Status Workflow
//!
//! ```text
//! pending ──→ processing ──→ completed ──┐
//!    │  ←───────┘    │           ↑  (재확인 → 커미션 재시도)
//!    └──→ cancelled ←┘           └──┘
//! ```

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{NewOrder, Order, OrderItem, OrderStatus, Profile, Store};
use crate::services::commission::{CommissionEngine, CommissionOutcome};
use crate::services::pricing::{Cart, CartLine, CheckoutTotals};
use crate::services::referral::attach_referral;
use crate::services::voucher::{resolve_voucher, VoucherError};
use crate::services::whatsapp::{order_message, whatsapp_link};

/// 한 상품당 최대 수량
const MAX_QUANTITY: i64 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct CartItemRequest {
    pub product_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub items: Vec<CartItemRequest>,
    pub voucher_code: Option<String>,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("{0}")]
    Validation(String),

    #[error("product not available: {0}")]
    ProductUnavailable(Uuid),

    #[error(transparent)]
    Voucher(#[from] VoucherError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// 장바구니 견적
#[derive(Debug, Serialize)]
pub struct Quote {
    pub items: Vec<OrderItem>,
    pub voucher_code: Option<String>,
    #[serde(flatten)]
    pub totals: CheckoutTotals,
}

/// 같은 상품은 수량을 합침 (요청 순서 유지)
fn merge_items(items: &[CartItemRequest]) -> Result<Vec<(Uuid, i64)>, CheckoutError> {
    let mut merged: Vec<(Uuid, i64)> = Vec::new();
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    for item in items {
        if item.quantity <= 0 {
            return Err(CheckoutError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }
        match index.get(&item.product_id) {
            Some(&i) => merged[i].1 += item.quantity,
            None => {
                index.insert(item.product_id, merged.len());
                merged.push((item.product_id, item.quantity));
            }
        }
    }

    if merged.iter().any(|(_, qty)| *qty > MAX_QUANTITY) {
        return Err(CheckoutError::Validation(format!(
            "quantity must be at most {}",
            MAX_QUANTITY
        )));
    }
    Ok(merged)
}

/// 장바구니 가격 계산 (저장 없음)
pub async fn quote(
    store: &dyn Store,
    items: &[CartItemRequest],
    voucher_code: Option<&str>,
) -> Result<Quote, CheckoutError> {
    let mut lines = Vec::new();
    let mut snapshot = Vec::new();

    for (product_id, quantity) in merge_items(items)? {
        let product = match store.get_product(product_id).await? {
            Some(p) if p.is_active => p,
            _ => return Err(CheckoutError::ProductUnavailable(product_id)),
        };
        lines.push(CartLine {
            unit_price: product.price,
            discount_unit_price: product.discount_price,
            quantity,
        });
        snapshot.push(OrderItem {
            product_id,
            product_name: product.name.clone(),
            quantity,
            price: product.effective_price(),
            cost_price: product.cost_price,
        });
    }

    let mut cart = Cart::new(lines);
    if cart.checked_subtotal().is_none() {
        return Err(CheckoutError::Validation("cart total is too large".to_string()));
    }
    if let Some(code) = voucher_code.filter(|c| !c.trim().is_empty()) {
        cart.apply_voucher(resolve_voucher(store, code).await?);
    }

    Ok(Quote {
        items: snapshot,
        voucher_code: cart.voucher().map(|v| v.code.clone()),
        totals: cart.totals(),
    })
}

/// 체크아웃 결과
#[derive(Debug, Serialize)]
pub struct PlacedOrder {
    pub order: Order,
    pub whatsapp_url: String,
}

fn validate_checkout(request: &CheckoutRequest) -> Result<(), CheckoutError> {
    if request.customer_name.trim().is_empty() {
        return Err(CheckoutError::Validation("customer_name is required".to_string()));
    }
    let phone_digits = request
        .customer_phone
        .chars()
        .filter(char::is_ascii_digit)
        .count();
    if phone_digits < 8 {
        return Err(CheckoutError::Validation(
            "customer_phone must contain at least 8 digits".to_string(),
        ));
    }
    if let Some(email) = &request.customer_email {
        if !email.trim().is_empty() && !email.contains('@') {
            return Err(CheckoutError::Validation("customer_email is invalid".to_string()));
        }
    }
    if request.items.is_empty() {
        return Err(CheckoutError::Validation("cart is empty".to_string()));
    }
    Ok(())
}

/// 주문 생성
///
/// 검증 실패 시 아무것도 저장하지 않음
pub async fn place_order(
    store: &dyn Store,
    buyer: Option<&Profile>,
    stored_referral: Option<&str>,
    request: &CheckoutRequest,
) -> Result<PlacedOrder, CheckoutError> {
    validate_checkout(request)?;

    let quote = quote(store, &request.items, request.voucher_code.as_deref()).await?;

    // 추천인 연결 실패는 주문을 막지 않음
    if let Some(buyer) = buyer {
        if let Err(e) = attach_referral(store, buyer, stored_referral).await {
            tracing::warn!(buyer_id = %buyer.id, error = ?e, "failed to attach referral at checkout");
        }
    }

    let order = store
        .insert_order(&NewOrder {
            buyer_id: buyer.map(|b| b.id),
            customer_name: request.customer_name.trim().to_string(),
            customer_phone: request.customer_phone.trim().to_string(),
            customer_email: request
                .customer_email
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
            items: quote.items,
            subtotal: quote.totals.subtotal,
            discount_amount: quote.totals.discount,
            voucher_code: quote.voucher_code,
            total: quote.totals.total,
        })
        .await?;

    let settings = store.get_settings().await?;
    let whatsapp_url = whatsapp_link(&settings.whatsapp_number, &order_message(&settings, &order));

    tracing::info!(
        order_id = %order.id,
        total = order.total,
        voucher = ?order.voucher_code,
        "order placed"
    );

    Ok(PlacedOrder {
        order,
        whatsapp_url,
    })
}

/// 허용되는 상태 전환
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;

    matches!(
        (from, to),
        (Pending, Processing | Completed | Cancelled)
            | (Processing, Pending | Completed | Cancelled)
            | (Completed, Completed)
            | (Cancelled, Cancelled)
    )
}

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("order not found")]
    NotFound,

    #[error("cannot change order status from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// 커미션 처리 결과 (실패해도 상태 변경은 유지)
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CommissionReport {
    Done(CommissionOutcome),
    Failed { status: &'static str, error: String },
}

#[derive(Debug, Serialize)]
pub struct StatusChange {
    pub order: Order,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission: Option<CommissionReport>,
}

/// 관리자 주문 상태 변경
///
/// completed로 바뀌면 커미션 계산. 커미션 실패는 상태 변경을 되돌리지 않고
/// 결과에만 포함됨 (commission_paid = false → 다음 변경 때 재시도)
pub async fn update_status(
    store: &dyn Store,
    order_id: Uuid,
    status: OrderStatus,
) -> Result<StatusChange, StatusError> {
    let current = store
        .get_order(order_id)
        .await?
        .ok_or(StatusError::NotFound)?;

    if !can_transition(current.status, status) {
        return Err(StatusError::InvalidTransition {
            from: current.status,
            to: status,
        });
    }

    let order = store
        .update_order_status(order_id, status)
        .await?
        .ok_or(StatusError::NotFound)?;

    tracing::info!(order_id = %order_id, from = %current.status, to = %status, "order status changed");

    if status != OrderStatus::Completed {
        return Ok(StatusChange {
            order,
            commission: None,
        });
    }

    let commission = match CommissionEngine::new(store).process_order(order_id).await {
        Ok(outcome) => CommissionReport::Done(outcome),
        Err(e) => {
            tracing::error!(order_id = %order_id, error = ?e, "commission processing failed");
            CommissionReport::Failed {
                status: "failed",
                error: e.to_string(),
            }
        }
    };

    // 정산 후 commission_paid 반영된 주문으로 응답
    let order = store.get_order(order_id).await?.unwrap_or(order);

    Ok(StatusChange {
        order,
        commission: Some(commission),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::db::{
        BankDetails, CommissionLog, CommissionPayout, DiscountType, MemoryStore, NewProfile,
        Product, ProductFilter, ProductInput, Role, SettingsInput, StoreSettings, Voucher,
        VoucherInput,
    };

    async fn product(store: &MemoryStore, price: i64, discount: Option<i64>, cost: i64) -> Uuid {
        store
            .insert_product(&ProductInput {
                name: format!("Product {}", price),
                description: String::new(),
                category: "software".to_string(),
                price,
                discount_price: discount,
                cost_price: cost,
                image_url: None,
                is_active: true,
            })
            .await
            .unwrap()
            .id
    }

    fn request(items: Vec<CartItemRequest>, voucher: Option<&str>) -> CheckoutRequest {
        CheckoutRequest {
            customer_name: "Dewi".to_string(),
            customer_phone: "0812-3456-7890".to_string(),
            customer_email: Some("dewi@example.com".to_string()),
            items,
            voucher_code: voucher.map(str::to_string),
        }
    }

    #[test]
    fn test_transitions() {
        use OrderStatus::*;
        assert!(can_transition(Pending, Completed));
        assert!(can_transition(Processing, Pending));
        assert!(can_transition(Completed, Completed));
        assert!(!can_transition(Completed, Pending));
        assert!(!can_transition(Cancelled, Completed));
    }

    #[test]
    fn test_merge_items() {
        let id = Uuid::new_v4();
        let merged = merge_items(&[
            CartItemRequest { product_id: id, quantity: 1 },
            CartItemRequest { product_id: id, quantity: 2 },
        ])
        .unwrap();
        assert_eq!(merged, vec![(id, 3)]);

        assert!(merge_items(&[CartItemRequest { product_id: id, quantity: 0 }]).is_err());
    }

    #[tokio::test]
    async fn test_quote_uses_discount_price_and_voucher() {
        let store = MemoryStore::new();
        let id = product(&store, 150_000, Some(100_000), 30_000).await;
        store
            .insert_voucher(&VoucherInput {
                code: "HEMAT10".to_string(),
                discount_type: DiscountType::Percentage,
                discount_value: 10,
                is_active: true,
            })
            .await
            .unwrap();

        let items = vec![CartItemRequest { product_id: id, quantity: 2 }];
        let quote = quote(&store, &items, Some("hemat10")).await.unwrap();

        assert_eq!(quote.totals.subtotal, 200_000);
        assert_eq!(quote.totals.discount, 20_000);
        assert_eq!(quote.totals.total, 180_000);
        assert_eq!(quote.voucher_code.as_deref(), Some("HEMAT10"));
        assert_eq!(quote.items[0].price, 100_000);
        assert_eq!(quote.items[0].cost_price, 30_000);
    }

    #[tokio::test]
    async fn test_quote_rejects_cart_total_out_of_range() {
        let store = MemoryStore::new();
        // 저장소에 직접 넣은 비정상 가격
        let id = product(&store, i64::MAX / 10, None, 0).await;

        let items = vec![CartItemRequest { product_id: id, quantity: 20 }];
        assert!(matches!(
            quote(&store, &items, None).await,
            Err(CheckoutError::Validation(_))
        ));
        assert!(matches!(
            place_order(&store, None, None, &request(items, None)).await,
            Err(CheckoutError::Validation(_))
        ));
        assert!(store.list_orders(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_voucher_does_not_create_order() {
        let store = MemoryStore::new();
        let id = product(&store, 50_000, None, 0).await;

        let result = place_order(
            &store,
            None,
            None,
            &request(vec![CartItemRequest { product_id: id, quantity: 1 }], Some("NOPE")),
        )
        .await;

        assert!(matches!(result, Err(CheckoutError::Voucher(VoucherError::Invalid))));
        assert!(store.list_orders(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_place_order_builds_whatsapp_link() {
        let store = MemoryStore::new();
        store
            .update_settings(&SettingsInput {
                store_name: "Toko".to_string(),
                whatsapp_number: "08111111111".to_string(),
                payment_instructions: String::new(),
                commission_rate: 10,
            })
            .await
            .unwrap();
        let id = product(&store, 75_000, None, 20_000).await;

        let placed = place_order(
            &store,
            None,
            None,
            &request(vec![CartItemRequest { product_id: id, quantity: 1 }], None),
        )
        .await
        .unwrap();

        assert_eq!(placed.order.status, OrderStatus::Pending);
        assert_eq!(placed.order.total, 75_000);
        assert!(!placed.order.commission_paid);
        assert!(placed.whatsapp_url.starts_with("https://wa.me/628111111111?text="));
    }

    #[tokio::test]
    async fn test_checkout_validation() {
        let store = MemoryStore::new();
        let mut bad = request(vec![], None);
        assert!(matches!(
            place_order(&store, None, None, &bad).await,
            Err(CheckoutError::Validation(_))
        ));

        bad.items = vec![CartItemRequest { product_id: Uuid::new_v4(), quantity: 1 }];
        bad.customer_name = "  ".to_string();
        assert!(matches!(
            place_order(&store, None, None, &bad).await,
            Err(CheckoutError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_completing_order_pays_commission_once() {
        let store = MemoryStore::new();
        store
            .update_settings(&SettingsInput {
                store_name: "Toko".to_string(),
                whatsapp_number: "0811".to_string(),
                payment_instructions: String::new(),
                commission_rate: 20,
            })
            .await
            .unwrap();

        let affiliate = store
            .insert_profile(&NewProfile {
                id: Uuid::new_v4(),
                email: "aff@example.com".to_string(),
                full_name: None,
            })
            .await
            .unwrap();
        let affiliate = crate::services::affiliate::join_program(&store, &affiliate)
            .await
            .unwrap();
        let code = affiliate.affiliate_code.clone().unwrap();

        let buyer = store
            .insert_profile(&NewProfile {
                id: Uuid::new_v4(),
                email: "buyer@example.com".to_string(),
                full_name: Some("Dewi".to_string()),
            })
            .await
            .unwrap();

        let id = product(&store, 100_000, None, 40_000).await;
        let placed = place_order(
            &store,
            Some(&buyer),
            Some(&code),
            &request(vec![CartItemRequest { product_id: id, quantity: 1 }], None),
        )
        .await
        .unwrap();

        let change = update_status(&store, placed.order.id, OrderStatus::Completed)
            .await
            .unwrap();
        assert!(change.order.commission_paid);
        assert!(matches!(
            change.commission,
            Some(CommissionReport::Done(CommissionOutcome::Paid { amount: 12_000, .. }))
        ));

        // 재확인: 추가 지급 없음
        update_status(&store, placed.order.id, OrderStatus::Completed)
            .await
            .unwrap();
        let affiliate = store.get_profile(affiliate.id).await.unwrap().unwrap();
        assert_eq!(affiliate.balance, 12_000);

        let err = update_status(&store, placed.order.id, OrderStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, StatusError::InvalidTransition { .. }));
    }

    /// settle_commission을 한 번 실패시키는 저장소
    struct FailingSettleStore {
        inner: MemoryStore,
        fail_next_settle: AtomicBool,
    }

    #[async_trait]
    impl Store for FailingSettleStore {
        async fn health_check(&self) -> Result<()> {
            self.inner.health_check().await
        }
        async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
            self.inner.list_products(filter).await
        }
        async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
            self.inner.get_product(id).await
        }
        async fn insert_product(&self, input: &ProductInput) -> Result<Product> {
            self.inner.insert_product(input).await
        }
        async fn update_product(&self, id: Uuid, input: &ProductInput) -> Result<Option<Product>> {
            self.inner.update_product(id, input).await
        }
        async fn delete_product(&self, id: Uuid) -> Result<bool> {
            self.inner.delete_product(id).await
        }
        async fn list_vouchers(&self) -> Result<Vec<Voucher>> {
            self.inner.list_vouchers().await
        }
        async fn find_voucher_by_code(&self, code: &str) -> Result<Option<Voucher>> {
            self.inner.find_voucher_by_code(code).await
        }
        async fn insert_voucher(&self, input: &VoucherInput) -> Result<Voucher> {
            self.inner.insert_voucher(input).await
        }
        async fn update_voucher(&self, id: Uuid, input: &VoucherInput) -> Result<Option<Voucher>> {
            self.inner.update_voucher(id, input).await
        }
        async fn delete_voucher(&self, id: Uuid) -> Result<bool> {
            self.inner.delete_voucher(id).await
        }
        async fn insert_order(&self, order: &NewOrder) -> Result<Order> {
            self.inner.insert_order(order).await
        }
        async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
            self.inner.get_order(id).await
        }
        async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
            self.inner.list_orders(status).await
        }
        async fn list_orders_by_buyer(&self, buyer_id: Uuid) -> Result<Vec<Order>> {
            self.inner.list_orders_by_buyer(buyer_id).await
        }
        async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> Result<Option<Order>> {
            self.inner.update_order_status(id, status).await
        }
        async fn delete_order(&self, id: Uuid) -> Result<bool> {
            self.inner.delete_order(id).await
        }
        async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>> {
            self.inner.get_profile(id).await
        }
        async fn find_profile_by_affiliate_code(&self, code: &str) -> Result<Option<Profile>> {
            self.inner.find_profile_by_affiliate_code(code).await
        }
        async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile> {
            self.inner.insert_profile(profile).await
        }
        async fn update_bank_details(&self, id: Uuid, bank: &BankDetails) -> Result<Option<Profile>> {
            self.inner.update_bank_details(id, bank).await
        }
        async fn claim_affiliate_code(&self, id: Uuid, code: &str, role: Role) -> Result<bool> {
            self.inner.claim_affiliate_code(id, code, role).await
        }
        async fn attach_referrer(&self, id: Uuid, code: &str) -> Result<bool> {
            self.inner.attach_referrer(id, code).await
        }
        async fn list_affiliates(&self) -> Result<Vec<Profile>> {
            self.inner.list_affiliates().await
        }
        async fn count_referrals(&self, code: &str) -> Result<i64> {
            self.inner.count_referrals(code).await
        }
        async fn increment_balance(&self, id: Uuid, delta: i64) -> Result<()> {
            self.inner.increment_balance(id, delta).await
        }
        async fn reset_balance(&self, id: Uuid) -> Result<Option<i64>> {
            self.inner.reset_balance(id).await
        }
        async fn settle_commission(
            &self,
            order_id: Uuid,
            payout: Option<&CommissionPayout>,
        ) -> Result<bool> {
            if self.fail_next_settle.swap(false, Ordering::SeqCst) {
                anyhow::bail!("connection reset during settlement");
            }
            self.inner.settle_commission(order_id, payout).await
        }
        async fn list_commission_logs(&self, affiliate_id: Uuid) -> Result<Vec<CommissionLog>> {
            self.inner.list_commission_logs(affiliate_id).await
        }
        async fn get_settings(&self) -> Result<StoreSettings> {
            self.inner.get_settings().await
        }
        async fn update_settings(&self, input: &SettingsInput) -> Result<StoreSettings> {
            self.inner.update_settings(input).await
        }
    }

    #[tokio::test]
    async fn test_commission_failure_keeps_status_and_retries() {
        let store = FailingSettleStore {
            inner: MemoryStore::with_settings(StoreSettings {
                commission_rate: 20,
                ..Default::default()
            }),
            fail_next_settle: AtomicBool::new(true),
        };

        let affiliate = store
            .insert_profile(&NewProfile {
                id: Uuid::new_v4(),
                email: "aff@example.com".to_string(),
                full_name: None,
            })
            .await
            .unwrap();
        let affiliate = crate::services::affiliate::join_program(&store, &affiliate)
            .await
            .unwrap();
        let code = affiliate.affiliate_code.clone().unwrap();
        let buyer = store
            .insert_profile(&NewProfile {
                id: Uuid::new_v4(),
                email: "buyer@example.com".to_string(),
                full_name: Some("Budi".to_string()),
            })
            .await
            .unwrap();
        let id = store
            .insert_product(&ProductInput {
                name: "UI Kit".to_string(),
                description: String::new(),
                category: "template".to_string(),
                price: 100_000,
                discount_price: None,
                cost_price: 40_000,
                image_url: None,
                is_active: true,
            })
            .await
            .unwrap()
            .id;
        let placed = place_order(
            &store,
            Some(&buyer),
            Some(&code),
            &request(vec![CartItemRequest { product_id: id, quantity: 1 }], None),
        )
        .await
        .unwrap();

        // 정산 실패: 상태 변경은 유지, 플래그와 잔액은 그대로
        let change = update_status(&store, placed.order.id, OrderStatus::Completed)
            .await
            .unwrap();
        assert!(matches!(
            change.commission,
            Some(CommissionReport::Failed { status: "failed", .. })
        ));
        assert_eq!(change.order.status, OrderStatus::Completed);
        assert!(!change.order.commission_paid);

        let stored = store.get_order(placed.order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Completed);
        assert!(!stored.commission_paid);
        assert_eq!(store.get_profile(affiliate.id).await.unwrap().unwrap().balance, 0);

        // 재확인 → 재시도 성공
        let change = update_status(&store, placed.order.id, OrderStatus::Completed)
            .await
            .unwrap();
        assert!(matches!(
            change.commission,
            Some(CommissionReport::Done(CommissionOutcome::Paid { amount: 12_000, .. }))
        ));
        assert!(change.order.commission_paid);
        assert_eq!(store.get_profile(affiliate.id).await.unwrap().unwrap().balance, 12_000);
        assert_eq!(store.list_commission_logs(affiliate.id).await.unwrap().len(), 1);
    }
}
