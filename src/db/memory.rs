//! In-memory Store
//!
//! 로컬 실행(`STORE_BACKEND=memory`)과 테스트에서 사용하는 저장소.
//! 모든 컬렉션을 하나의 RwLock으로 보호 → 커미션 정산이 단일 임계 구역에서 실행됨.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::{
    BankDetails, CommissionLog, CommissionPayout, NewOrder, NewProfile, Order, OrderStatus,
    Product, ProductFilter, ProductInput, ProductSort, Profile, Role, SettingsInput,
    StoreSettings, Voucher, VoucherInput,
};
use super::repository::{Store, StoreError};

#[derive(Default)]
struct Collections {
    products: HashMap<Uuid, Product>,
    vouchers: HashMap<Uuid, Voucher>,
    orders: HashMap<Uuid, Order>,
    profiles: HashMap<Uuid, Profile>,
    commission_logs: Vec<CommissionLog>,
    settings: StoreSettings,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: StoreSettings) -> Self {
        Self {
            inner: RwLock::new(Collections {
                settings,
                ..Default::default()
            }),
        }
    }

    /// 프로필을 그대로 저장 (시드 데이터, 테스트용)
    pub async fn put_profile(&self, profile: Profile) {
        self.inner.write().await.profiles.insert(profile.id, profile);
    }

    /// 주문을 그대로 저장 (레거시 주문 시드용)
    pub async fn put_order(&self, order: Order) {
        self.inner.write().await.orders.insert(order.id, order);
    }
}

fn sort_products(products: &mut [Product], sort: ProductSort) {
    match sort {
        ProductSort::Newest => products.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        ProductSort::PriceAsc => products.sort_by_key(|p| p.effective_price()),
        ProductSort::PriceDesc => {
            products.sort_by_key(|p| std::cmp::Reverse(p.effective_price()))
        }
        ProductSort::Name => products.sort_by_key(|p| p.name.to_lowercase()),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let inner = self.inner.read().await;
        let search = filter.search.as_ref().map(|s| s.to_lowercase());

        let mut products: Vec<Product> = inner
            .products
            .values()
            .filter(|p| filter.include_inactive || p.is_active)
            .filter(|p| {
                filter
                    .category
                    .as_ref()
                    .map_or(true, |c| p.category.eq_ignore_ascii_case(c))
            })
            .filter(|p| {
                search.as_ref().map_or(true, |s| {
                    p.name.to_lowercase().contains(s) || p.description.to_lowercase().contains(s)
                })
            })
            .cloned()
            .collect();

        sort_products(&mut products, filter.sort);
        Ok(products)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.inner.read().await.products.get(&id).cloned())
    }

    async fn insert_product(&self, input: &ProductInput) -> Result<Product> {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            description: input.description.clone(),
            category: input.category.clone(),
            price: input.price,
            discount_price: input.discount_price,
            cost_price: input.cost_price,
            image_url: input.image_url.clone(),
            is_active: input.is_active,
            created_at: now,
            updated_at: now,
        };
        self.inner
            .write()
            .await
            .products
            .insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: Uuid, input: &ProductInput) -> Result<Option<Product>> {
        let mut inner = self.inner.write().await;
        let Some(product) = inner.products.get_mut(&id) else {
            return Ok(None);
        };
        product.name = input.name.clone();
        product.description = input.description.clone();
        product.category = input.category.clone();
        product.price = input.price;
        product.discount_price = input.discount_price;
        product.cost_price = input.cost_price;
        product.image_url = input.image_url.clone();
        product.is_active = input.is_active;
        product.updated_at = Utc::now();
        Ok(Some(product.clone()))
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool> {
        Ok(self.inner.write().await.products.remove(&id).is_some())
    }

    async fn list_vouchers(&self) -> Result<Vec<Voucher>> {
        let mut vouchers: Vec<Voucher> =
            self.inner.read().await.vouchers.values().cloned().collect();
        vouchers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(vouchers)
    }

    async fn find_voucher_by_code(&self, code: &str) -> Result<Option<Voucher>> {
        let inner = self.inner.read().await;
        Ok(inner.vouchers.values().find(|v| v.code == code).cloned())
    }

    async fn insert_voucher(&self, input: &VoucherInput) -> Result<Voucher> {
        let mut inner = self.inner.write().await;
        if inner.vouchers.values().any(|v| v.code == input.code) {
            return Err(StoreError::Conflict(format!("voucher code {}", input.code)).into());
        }
        let voucher = Voucher {
            id: Uuid::new_v4(),
            code: input.code.clone(),
            discount_type: input.discount_type,
            discount_value: input.discount_value,
            is_active: input.is_active,
            created_at: Utc::now(),
        };
        inner.vouchers.insert(voucher.id, voucher.clone());
        Ok(voucher)
    }

    async fn update_voucher(&self, id: Uuid, input: &VoucherInput) -> Result<Option<Voucher>> {
        let mut inner = self.inner.write().await;
        if inner
            .vouchers
            .values()
            .any(|v| v.id != id && v.code == input.code)
        {
            return Err(StoreError::Conflict(format!("voucher code {}", input.code)).into());
        }
        let Some(voucher) = inner.vouchers.get_mut(&id) else {
            return Ok(None);
        };
        voucher.code = input.code.clone();
        voucher.discount_type = input.discount_type;
        voucher.discount_value = input.discount_value;
        voucher.is_active = input.is_active;
        Ok(Some(voucher.clone()))
    }

    async fn delete_voucher(&self, id: Uuid) -> Result<bool> {
        Ok(self.inner.write().await.vouchers.remove(&id).is_some())
    }

    async fn insert_order(&self, order: &NewOrder) -> Result<Order> {
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            buyer_id: order.buyer_id,
            customer_name: order.customer_name.clone(),
            customer_phone: order.customer_phone.clone(),
            customer_email: order.customer_email.clone(),
            items: Json(order.items.clone()),
            subtotal: order.subtotal,
            discount_amount: order.discount_amount,
            voucher_code: order.voucher_code.clone(),
            total: order.total,
            status: OrderStatus::Pending,
            commission_paid: false,
            created_at: now,
            updated_at: now,
        };
        self.inner
            .write()
            .await
            .orders
            .insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn list_orders_by_buyer(&self, buyer_id: Uuid) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.buyer_id == Some(buyer_id))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> Result<Option<Order>> {
        let mut inner = self.inner.write().await;
        let Some(order) = inner.orders.get_mut(&id) else {
            return Ok(None);
        };
        order.status = status;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn delete_order(&self, id: Uuid) -> Result<bool> {
        Ok(self.inner.write().await.orders.remove(&id).is_some())
    }

    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>> {
        Ok(self.inner.read().await.profiles.get(&id).cloned())
    }

    async fn find_profile_by_affiliate_code(&self, code: &str) -> Result<Option<Profile>> {
        let inner = self.inner.read().await;
        Ok(inner
            .profiles
            .values()
            .find(|p| p.affiliate_code.as_deref() == Some(code))
            .cloned())
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile> {
        let mut inner = self.inner.write().await;
        if inner.profiles.contains_key(&profile.id) {
            return Err(StoreError::Conflict(format!("profile {}", profile.id)).into());
        }
        let profile = Profile {
            id: profile.id,
            email: profile.email.clone(),
            full_name: profile.full_name.clone(),
            role: Role::Customer,
            affiliate_code: None,
            referred_by: None,
            balance: 0,
            bank_name: None,
            bank_account_number: None,
            bank_account_holder: None,
            created_at: Utc::now(),
        };
        inner.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn update_bank_details(&self, id: Uuid, bank: &BankDetails) -> Result<Option<Profile>> {
        let mut inner = self.inner.write().await;
        let Some(profile) = inner.profiles.get_mut(&id) else {
            return Ok(None);
        };
        profile.bank_name = Some(bank.bank_name.clone());
        profile.bank_account_number = Some(bank.bank_account_number.clone());
        profile.bank_account_holder = Some(bank.bank_account_holder.clone());
        Ok(Some(profile.clone()))
    }

    async fn claim_affiliate_code(&self, id: Uuid, code: &str, role: Role) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner
            .profiles
            .values()
            .any(|p| p.affiliate_code.as_deref() == Some(code))
        {
            return Ok(false);
        }
        let Some(profile) = inner.profiles.get_mut(&id) else {
            bail!("profile not found: {}", id);
        };
        profile.affiliate_code = Some(code.to_string());
        profile.role = role;
        Ok(true)
    }

    async fn attach_referrer(&self, id: Uuid, code: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.profiles.get_mut(&id) {
            Some(profile) if profile.referred_by.is_none() => {
                profile.referred_by = Some(code.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_affiliates(&self) -> Result<Vec<Profile>> {
        let inner = self.inner.read().await;
        let mut affiliates: Vec<Profile> = inner
            .profiles
            .values()
            .filter(|p| p.affiliate_code.is_some())
            .cloned()
            .collect();
        affiliates.sort_by(|a, b| b.balance.cmp(&a.balance));
        Ok(affiliates)
    }

    async fn count_referrals(&self, code: &str) -> Result<i64> {
        let inner = self.inner.read().await;
        Ok(inner
            .profiles
            .values()
            .filter(|p| p.referred_by.as_deref() == Some(code))
            .count() as i64)
    }

    async fn increment_balance(&self, id: Uuid, delta: i64) -> Result<()> {
        let mut inner = self.inner.write().await;
        let Some(profile) = inner.profiles.get_mut(&id) else {
            bail!("profile not found: {}", id);
        };
        profile.balance += delta;
        Ok(())
    }

    async fn reset_balance(&self, id: Uuid) -> Result<Option<i64>> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .profiles
            .get_mut(&id)
            .map(|p| std::mem::take(&mut p.balance)))
    }

    async fn settle_commission(
        &self,
        order_id: Uuid,
        payout: Option<&CommissionPayout>,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;

        // 모든 검증을 먼저 끝낸 뒤에 변경 → 실패 시 부분 적용 없음
        match inner.orders.get(&order_id) {
            Some(order) if !order.commission_paid => {}
            _ => return Ok(false),
        }
        if let Some(payout) = payout {
            if !inner.profiles.contains_key(&payout.affiliate_id) {
                bail!("affiliate not found: {}", payout.affiliate_id);
            }
            if inner.commission_logs.iter().any(|l| l.order_id == order_id) {
                bail!("commission log already exists for order {}", order_id);
            }
        }

        if let Some(payout) = payout {
            if let Some(profile) = inner.profiles.get_mut(&payout.affiliate_id) {
                profile.balance += payout.amount;
            }
            inner.commission_logs.push(CommissionLog {
                id: Uuid::new_v4(),
                affiliate_id: payout.affiliate_id,
                order_id,
                amount: payout.amount,
                source_buyer: payout.source_buyer.clone(),
                products: payout.products.clone(),
                created_at: Utc::now(),
            });
        }
        if let Some(order) = inner.orders.get_mut(&order_id) {
            order.commission_paid = true;
            order.updated_at = Utc::now();
        }
        Ok(true)
    }

    async fn list_commission_logs(&self, affiliate_id: Uuid) -> Result<Vec<CommissionLog>> {
        let inner = self.inner.read().await;
        let mut logs: Vec<CommissionLog> = inner
            .commission_logs
            .iter()
            .filter(|l| l.affiliate_id == affiliate_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(logs)
    }

    async fn get_settings(&self) -> Result<StoreSettings> {
        Ok(self.inner.read().await.settings.clone())
    }

    async fn update_settings(&self, input: &SettingsInput) -> Result<StoreSettings> {
        let mut inner = self.inner.write().await;
        inner.settings = StoreSettings {
            store_name: input.store_name.clone(),
            whatsapp_number: input.whatsapp_number.clone(),
            payment_instructions: input.payment_instructions.clone(),
            commission_rate: input.commission_rate,
            updated_at: Utc::now(),
        };
        Ok(inner.settings.clone())
    }
}
