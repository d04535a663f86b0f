//! Repository Pattern Implementation
//!
//! # Interview Q&A
//!
//! Q: Repository 패턴이란?
//! A: 데이터 접근 로직을 추상화하는 패턴
//!
//!    장점:
//!    - 비즈니스 로직(바우처, 커미션)과 데이터 접근 분리
//!    - 테스트 시 In-memory 구현으로 교체
//!    - 배포 환경별로 저장소 교체 (Postgres / memory)
//!
//! Q: 왜 컬렉션별 trait이 아니라 하나의 `Store` trait인가?
//! A: 커미션 정산이 여러 테이블(orders, profiles, commission_logs)을
//!    하나의 트랜잭션으로 묶어야 하기 때문
//!    - `settle_commission`은 구현체가 원자성을 보장
//!    - 호출자는 read-then-write 하지 않음
//!
//! Q: 잔액 증가는 왜 별도 메서드인가?
//! A: 같은 어필리에이트에 대한 주문이 동시에 완료될 수 있음
//!    - 클라이언트에서 읽고 쓰면 업데이트 유실 (lost update)
//!    - `balance = balance + $delta` 단일 연산으로 처리

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::models::{
    BankDetails, CommissionLog, CommissionPayout, NewOrder, NewProfile, Order, OrderStatus,
    Product, ProductFilter, ProductInput, Profile, Role, SettingsInput, StoreSettings, Voucher,
    VoucherInput,
};

/// 구현체 공통 에러 (anyhow로 감싸서 전달, `ApiError`에서 downcast)
#[derive(Debug, Error)]
pub enum StoreError {
    /// 유니크 제약 위반 (바우처 코드, 프로필 ID 등)
    #[error("conflict: {0}")]
    Conflict(String),
}

/// 스토어 영속성 인터페이스
///
/// - Postgres 구현: `db::Database`
/// - In-memory 구현: `db::MemoryStore`
#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> Result<()>;

    // ============ Products ============
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>>;
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn insert_product(&self, input: &ProductInput) -> Result<Product>;
    async fn update_product(&self, id: Uuid, input: &ProductInput) -> Result<Option<Product>>;
    async fn delete_product(&self, id: Uuid) -> Result<bool>;

    // ============ Vouchers ============
    async fn list_vouchers(&self) -> Result<Vec<Voucher>>;
    /// `code`는 이미 정규화(trim + uppercase)된 값
    async fn find_voucher_by_code(&self, code: &str) -> Result<Option<Voucher>>;
    async fn insert_voucher(&self, input: &VoucherInput) -> Result<Voucher>;
    async fn update_voucher(&self, id: Uuid, input: &VoucherInput) -> Result<Option<Voucher>>;
    async fn delete_voucher(&self, id: Uuid) -> Result<bool>;

    // ============ Orders ============
    async fn insert_order(&self, order: &NewOrder) -> Result<Order>;
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>>;
    async fn list_orders_by_buyer(&self, buyer_id: Uuid) -> Result<Vec<Order>>;
    async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> Result<Option<Order>>;
    async fn delete_order(&self, id: Uuid) -> Result<bool>;

    // ============ Profiles ============
    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>>;
    async fn find_profile_by_affiliate_code(&self, code: &str) -> Result<Option<Profile>>;
    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile>;
    async fn update_bank_details(&self, id: Uuid, bank: &BankDetails) -> Result<Option<Profile>>;

    /// 어필리에이트 코드 발급
    ///
    /// 코드가 이미 다른 프로필에 있으면 `false` (호출자가 새 코드로 재시도)
    async fn claim_affiliate_code(&self, id: Uuid, code: &str, role: Role) -> Result<bool>;

    /// `referred_by`가 비어 있을 때만 설정 (write-once)
    async fn attach_referrer(&self, id: Uuid, code: &str) -> Result<bool>;

    async fn list_affiliates(&self) -> Result<Vec<Profile>>;
    async fn count_referrals(&self, code: &str) -> Result<i64>;

    /// 원자적 잔액 증가 (단일 연산)
    async fn increment_balance(&self, id: Uuid, delta: i64) -> Result<()>;

    /// 잔액을 0으로 초기화하고 이전 잔액을 반환 (프로필이 없으면 None)
    async fn reset_balance(&self, id: Uuid) -> Result<Option<i64>>;

    // ============ Commission ============

    /// 주문 커미션 정산 (단일 트랜잭션)
    ///
    /// 1. `commission_paid = false`인 주문만 true로 전환 (compare-and-set)
    /// 2. payout이 있으면 잔액 증가 + 커미션 로그 추가
    ///
    /// 이미 정산된 주문이면 아무것도 하지 않고 `false` 반환.
    /// 실패 시 전체 롤백 → `commission_paid`는 false 유지 (재시도 가능)
    async fn settle_commission(
        &self,
        order_id: Uuid,
        payout: Option<&CommissionPayout>,
    ) -> Result<bool>;

    async fn list_commission_logs(&self, affiliate_id: Uuid) -> Result<Vec<CommissionLog>>;

    // ============ Settings ============
    async fn get_settings(&self) -> Result<StoreSettings>;
    async fn update_settings(&self, input: &SettingsInput) -> Result<StoreSettings>;
}
