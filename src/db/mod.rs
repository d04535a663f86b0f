//! Database Module
//!
//! # Interview Q&A
//!
//! Q: 왜 PostgreSQL을 선택했는가?
//! A: 스토어 백엔드에 적합한 이유
//!
//!    1. ACID 트랜잭션: 커미션 정산(주문 플래그 + 잔액 + 로그)을 한 번에 커밋
//!    2. JSONB 지원: 주문 시점 상품 스냅샷 저장
//!    3. 유니크 제약: 바우처 코드, 어필리에이트 코드, 주문당 커미션 로그 1건
//!    4. 원자적 증가: `balance = balance + $1` (lost update 방지)
//!
//! Q: 커미션 중복 지급은 어떻게 막는가?
//! A: 두 겹의 방어
//!    - `UPDATE orders SET commission_paid = TRUE WHERE id = $1 AND commission_paid = FALSE`
//!      → 영향받은 row가 1일 때만 지급 진행 (compare-and-set)
//!    - `commission_logs.order_id` UNIQUE 제약 → 경쟁 상황에서도 로그는 1건
//!
//! Q: 커넥션 풀은 어떻게 관리하는가?
//! A: SQLx의 PgPool 사용
//!    - 최소/최대 커넥션 수 설정
//!    - 커넥션 재사용 (오버헤드 감소)
//!    - 타임아웃 처리

mod memory;
mod models;
mod repository;

pub use memory::MemoryStore;
pub use models::*;
pub use repository::{Store, StoreError};

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const PRODUCT_COLUMNS: &str = "id, name, description, category, price, discount_price, \
     cost_price, image_url, is_active, created_at, updated_at";

const VOUCHER_COLUMNS: &str = "id, code, discount_type, discount_value, is_active, created_at";

const ORDER_COLUMNS: &str = "id, buyer_id, customer_name, customer_phone, customer_email, \
     items, subtotal, discount_amount, voucher_code, total, status, commission_paid, \
     created_at, updated_at";

const PROFILE_COLUMNS: &str = "id, email, full_name, role, affiliate_code, referred_by, \
     balance, bank_name, bank_account_number, bank_account_holder, created_at";

const SETTINGS_COLUMNS: &str =
    "store_name, whatsapp_number, payment_instructions, commission_rate, updated_at";

/// 유니크 제약 위반을 `StoreError::Conflict`로 변환
fn conflict_or(err: sqlx::Error, what: String) -> anyhow::Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(what).into(),
        _ => err.into(),
    }
}

/// 데이터베이스 연결 및 쿼리 담당
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 데이터베이스 연결
    ///
    /// # Connection Pool Settings
    ///
    /// - max_connections: 10 (트래픽에 따라 조정)
    /// - min_connections: 1 (idle 시 최소 유지)
    /// - acquire_timeout: 3초 (커넥션 획득 대기)
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// 마이그레이션 실행
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for Database {
    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ============ Products ============

    /// 상품 검색 (이름/설명 ILIKE, 카테고리, 정렬)
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE TRUE"));

        if !filter.include_inactive {
            query.push(" AND is_active = TRUE");
        }
        if let Some(category) = &filter.category {
            query
                .push(" AND LOWER(category) = LOWER(")
                .push_bind(category.clone())
                .push(")");
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{}%", search);
            query
                .push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        query.push(match filter.sort {
            ProductSort::Newest => " ORDER BY created_at DESC",
            ProductSort::PriceAsc => " ORDER BY COALESCE(discount_price, price) ASC",
            ProductSort::PriceDesc => " ORDER BY COALESCE(discount_price, price) DESC",
            ProductSort::Name => " ORDER BY LOWER(name) ASC",
        });

        let products = query
            .build_query_as::<Product>()
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    async fn insert_product(&self, input: &ProductInput) -> Result<Product> {
        let product = sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products (
                id, name, description, category, price, discount_price,
                cost_price, image_url, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.category)
        .bind(input.price)
        .bind(input.discount_price)
        .bind(input.cost_price)
        .bind(&input.image_url)
        .bind(input.is_active)
        .fetch_one(&self.pool)
        .await?;
        Ok(product)
    }

    async fn update_product(&self, id: Uuid, input: &ProductInput) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products SET
                name = $2,
                description = $3,
                category = $4,
                price = $5,
                discount_price = $6,
                cost_price = $7,
                image_url = $8,
                is_active = $9,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.category)
        .bind(input.price)
        .bind(input.discount_price)
        .bind(input.cost_price)
        .bind(&input.image_url)
        .bind(input.is_active)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ============ Vouchers ============

    async fn list_vouchers(&self) -> Result<Vec<Voucher>> {
        let vouchers = sqlx::query_as::<_, Voucher>(&format!(
            "SELECT {VOUCHER_COLUMNS} FROM vouchers ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(vouchers)
    }

    /// 정확히 일치하는 코드만 (대소문자 처리는 호출자의 정규화로)
    async fn find_voucher_by_code(&self, code: &str) -> Result<Option<Voucher>> {
        let voucher = sqlx::query_as::<_, Voucher>(&format!(
            "SELECT {VOUCHER_COLUMNS} FROM vouchers WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(voucher)
    }

    async fn insert_voucher(&self, input: &VoucherInput) -> Result<Voucher> {
        sqlx::query_as::<_, Voucher>(&format!(
            r#"
            INSERT INTO vouchers (id, code, discount_type, discount_value, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING {VOUCHER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&input.code)
        .bind(input.discount_type.as_str())
        .bind(input.discount_value)
        .bind(input.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or(e, format!("voucher code {}", input.code)))
    }

    async fn update_voucher(&self, id: Uuid, input: &VoucherInput) -> Result<Option<Voucher>> {
        sqlx::query_as::<_, Voucher>(&format!(
            r#"
            UPDATE vouchers SET
                code = $2,
                discount_type = $3,
                discount_value = $4,
                is_active = $5
            WHERE id = $1
            RETURNING {VOUCHER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&input.code)
        .bind(input.discount_type.as_str())
        .bind(input.discount_value)
        .bind(input.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_or(e, format!("voucher code {}", input.code)))
    }

    async fn delete_voucher(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM vouchers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ============ Orders ============

    async fn insert_order(&self, order: &NewOrder) -> Result<Order> {
        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            INSERT INTO orders (
                id, buyer_id, customer_name, customer_phone, customer_email, items,
                subtotal, discount_amount, voucher_code, total, status, commission_paid,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', FALSE, NOW(), NOW())
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(order.buyer_id)
        .bind(&order.customer_name)
        .bind(&order.customer_phone)
        .bind(&order.customer_email)
        .bind(Json(&order.items))
        .bind(order.subtotal)
        .bind(order.discount_amount)
        .bind(&order.voucher_code)
        .bind(order.total)
        .fetch_one(&self.pool)
        .await?;
        Ok(order)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    async fn list_orders_by_buyer(&self, buyer_id: Uuid) -> Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE buyer_id = $1 ORDER BY created_at DESC"
        ))
        .bind(buyer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            UPDATE orders SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn delete_order(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ============ Profiles ============

    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn find_profile_by_affiliate_code(&self, code: &str) -> Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE affiliate_code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile> {
        sqlx::query_as::<_, Profile>(&format!(
            r#"
            INSERT INTO profiles (id, email, full_name, role, balance, created_at)
            VALUES ($1, $2, $3, 'customer', 0, NOW())
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(profile.id)
        .bind(&profile.email)
        .bind(&profile.full_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or(e, format!("profile {}", profile.id)))
    }

    async fn update_bank_details(&self, id: Uuid, bank: &BankDetails) -> Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            r#"
            UPDATE profiles SET
                bank_name = $2,
                bank_account_number = $3,
                bank_account_holder = $4
            WHERE id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&bank.bank_name)
        .bind(&bank.bank_account_number)
        .bind(&bank.bank_account_holder)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn claim_affiliate_code(&self, id: Uuid, code: &str, role: Role) -> Result<bool> {
        let result = sqlx::query("UPDATE profiles SET affiliate_code = $2, role = $3 WHERE id = $1")
            .bind(id)
            .bind(code)
            .bind(role.as_str())
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => bail!("profile not found: {}", id),
            Ok(_) => Ok(true),
            // 코드 충돌 → 호출자가 새 코드로 재시도
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn attach_referrer(&self, id: Uuid, code: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE profiles SET referred_by = $2 WHERE id = $1 AND referred_by IS NULL",
        )
        .bind(id)
        .bind(code)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_affiliates(&self) -> Result<Vec<Profile>> {
        let affiliates = sqlx::query_as::<_, Profile>(&format!(
            r#"
            SELECT {PROFILE_COLUMNS}
            FROM profiles
            WHERE affiliate_code IS NOT NULL
            ORDER BY balance DESC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(affiliates)
    }

    async fn count_referrals(&self, code: &str) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM profiles WHERE referred_by = $1")
            .bind(code)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    async fn increment_balance(&self, id: Uuid, delta: i64) -> Result<()> {
        let result = sqlx::query("UPDATE profiles SET balance = balance + $2 WHERE id = $1")
            .bind(id)
            .bind(delta)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            bail!("profile not found: {}", id);
        }
        Ok(())
    }

    async fn reset_balance(&self, id: Uuid) -> Result<Option<i64>> {
        // 이전 잔액을 같은 문장에서 읽어야 지급 금액이 정확함
        let previous: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE profiles p SET balance = 0
            FROM (SELECT id, balance FROM profiles WHERE id = $1 FOR UPDATE) old
            WHERE p.id = old.id
            RETURNING old.balance
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(previous.map(|row| row.0))
    }

    // ============ Commission ============

    async fn settle_commission(
        &self,
        order_id: Uuid,
        payout: Option<&CommissionPayout>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            UPDATE orders SET commission_paid = TRUE, updated_at = NOW()
            WHERE id = $1 AND commission_paid = FALSE
            "#,
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Some(payout) = payout {
            let credited = sqlx::query("UPDATE profiles SET balance = balance + $2 WHERE id = $1")
                .bind(payout.affiliate_id)
                .bind(payout.amount)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            if credited == 0 {
                // tx drop → rollback
                bail!("affiliate not found: {}", payout.affiliate_id);
            }

            sqlx::query(
                r#"
                INSERT INTO commission_logs (
                    id, affiliate_id, order_id, amount, source_buyer, products, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, NOW())
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(payout.affiliate_id)
            .bind(order_id)
            .bind(payout.amount)
            .bind(&payout.source_buyer)
            .bind(&payout.products)
            .execute(&mut *tx)
            .await
            .map_err(|e| conflict_or(e, format!("commission log for order {}", order_id)))?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn list_commission_logs(&self, affiliate_id: Uuid) -> Result<Vec<CommissionLog>> {
        let logs = sqlx::query_as::<_, CommissionLog>(
            r#"
            SELECT id, affiliate_id, order_id, amount, source_buyer, products, created_at
            FROM commission_logs
            WHERE affiliate_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(affiliate_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }

    // ============ Settings ============

    async fn get_settings(&self) -> Result<StoreSettings> {
        let settings = sqlx::query_as::<_, StoreSettings>(&format!(
            "SELECT {SETTINGS_COLUMNS} FROM store_settings WHERE id = 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(settings.unwrap_or_default())
    }

    async fn update_settings(&self, input: &SettingsInput) -> Result<StoreSettings> {
        let settings = sqlx::query_as::<_, StoreSettings>(&format!(
            r#"
            INSERT INTO store_settings (
                id, store_name, whatsapp_number, payment_instructions, commission_rate, updated_at
            )
            VALUES (1, $1, $2, $3, $4, NOW())
            ON CONFLICT (id)
            DO UPDATE SET
                store_name = EXCLUDED.store_name,
                whatsapp_number = EXCLUDED.whatsapp_number,
                payment_instructions = EXCLUDED.payment_instructions,
                commission_rate = EXCLUDED.commission_rate,
                updated_at = NOW()
            RETURNING {SETTINGS_COLUMNS}
            "#
        ))
        .bind(&input.store_name)
        .bind(&input.whatsapp_number)
        .bind(&input.payment_instructions)
        .bind(input.commission_rate)
        .fetch_one(&self.pool)
        .await?;
        Ok(settings)
    }
}
