//! Database Models
//!
//! Canonical storefront data model shared by every `Store` implementation.
//! Money is stored as integer minor units (e.g. rupiah), rates as integer percents.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

/// 문자열 컬럼을 enum으로 변환할 때 알 수 없는 값
#[derive(Debug, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

// ============ Enums ============

/// 주문 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<String> for OrderStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            _ => Err(UnknownVariant { kind: "order status", value }),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 바우처 할인 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// subtotal의 n% 할인 (내림)
    Percentage,
    /// 고정 금액 할인
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }
}

impl TryFrom<String> for DiscountType {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "percentage" => Ok(DiscountType::Percentage),
            "fixed" => Ok(DiscountType::Fixed),
            _ => Err(UnknownVariant { kind: "discount type", value }),
        }
    }
}

/// 사용자 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Affiliate,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Affiliate => "affiliate",
            Role::Admin => "admin",
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "customer" => Ok(Role::Customer),
            "affiliate" => Ok(Role::Affiliate),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownVariant { kind: "role", value }),
        }
    }
}

// ============ Products ============

/// 단가 상한 (1조). 수량 상한과 곱해도 i64 범위 안에 머무름
pub const MAX_PRICE: i64 = 1_000_000_000_000;

/// 디지털 상품 (소프트웨어, e-book, 템플릿)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: String,

    /// 정가
    pub price: i64,

    /// 할인가 (있으면 정가 대신 적용)
    pub discount_price: Option<i64>,

    /// 원가 - 커미션 계산에 사용 (관리자 화면 전용)
    pub cost_price: i64,

    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// 실제 판매 단가
    pub fn effective_price(&self) -> i64 {
        self.discount_price.unwrap_or(self.price)
    }
}

/// 상품 생성/수정 입력
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub price: i64,
    pub discount_price: Option<i64>,
    #[serde(default)]
    pub cost_price: i64,
    pub image_url: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// 상품 목록 정렬
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

/// 상품 검색 조건
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// 이름/설명 부분 일치 (대소문자 무시)
    pub search: Option<String>,
    pub category: Option<String>,
    pub sort: ProductSort,
    /// 관리자 화면에서는 비활성 상품도 포함
    pub include_inactive: bool,
}

// ============ Vouchers ============

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Voucher {
    pub id: Uuid,

    /// 항상 대문자로 저장 (trim + uppercase)
    pub code: String,

    #[sqlx(try_from = "String")]
    pub discount_type: DiscountType,

    /// percentage: 0~100, fixed: 금액
    pub discount_value: i64,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoucherInput {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

// ============ Orders ============

/// 주문 시점의 상품 스냅샷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i64,

    /// 판매 단가 스냅샷
    pub price: i64,

    /// 원가 스냅샷
    /// 예전 주문에는 없거나 0일 수 있음 → 커미션 계산 시 현재 원가로 보정
    #[serde(default)]
    pub cost_price: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
    pub id: Uuid,

    /// 로그인한 구매자 (비회원 주문이면 None)
    pub buyer_id: Option<Uuid>,

    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,

    pub items: Json<Vec<OrderItem>>,

    pub subtotal: i64,
    pub discount_amount: i64,
    pub voucher_code: Option<String>,
    pub total: i64,

    #[sqlx(try_from = "String")]
    pub status: OrderStatus,

    /// false → true 한 번만 전환됨
    pub commission_paid: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 체크아웃에서 생성되는 주문
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub buyer_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub items: Vec<OrderItem>,
    pub subtotal: i64,
    pub discount_amount: i64,
    pub voucher_code: Option<String>,
    pub total: i64,
}

// ============ Profiles ============

/// 고객 / 어필리에이트 / 관리자 (같은 엔티티)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Profile {
    /// 인증 서비스에서 발급한 사용자 ID
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,

    #[sqlx(try_from = "String")]
    pub role: Role,

    /// 본인의 추천 코드 (어필리에이트 가입 시 발급)
    pub affiliate_code: Option<String>,

    /// 이 사용자를 추천한 어필리에이트의 코드 (한 번만 설정)
    pub referred_by: Option<String>,

    /// 누적 커미션 잔액
    pub balance: i64,

    pub bank_name: Option<String>,
    pub bank_account_number: Option<String>,
    pub bank_account_holder: Option<String>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
}

/// 출금 계좌 정보
#[derive(Debug, Clone, Deserialize)]
pub struct BankDetails {
    pub bank_name: String,
    pub bank_account_number: String,
    pub bank_account_holder: String,
}

// ============ Commission ============

/// 커미션 지급 기록 (append-only, 주문당 최대 1건)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CommissionLog {
    pub id: Uuid,
    pub affiliate_id: Uuid,
    pub order_id: Uuid,
    pub amount: i64,
    pub source_buyer: String,
    pub products: String,
    pub created_at: DateTime<Utc>,
}

/// settle_commission에 전달되는 지급 내역
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionPayout {
    pub affiliate_id: Uuid,
    pub amount: i64,
    pub source_buyer: String,
    pub products: String,
}

// ============ Settings ============

/// 스토어 전역 설정 (단일 레코드)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StoreSettings {
    pub store_name: String,
    pub whatsapp_number: String,
    pub payment_instructions: String,

    /// 커미션 비율 (%, 0~100)
    pub commission_rate: i64,

    pub updated_at: DateTime<Utc>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            store_name: "Digital Store".to_string(),
            whatsapp_number: String::new(),
            payment_instructions: String::new(),
            commission_rate: 0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsInput {
    pub store_name: String,
    pub whatsapp_number: String,
    #[serde(default)]
    pub payment_instructions: String,
    pub commission_rate: i64,
}

fn default_true() -> bool {
    true
}
