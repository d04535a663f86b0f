//! Checkout Pricing
//!
//! Cart subtotal, single-voucher discount and final total.
//!
//! # Rules
//!
//! - subtotal = Σ (할인가 ?? 정가) × 수량
//! - percentage: floor(subtotal × value / 100)
//! - fixed: value
//! - 할인은 subtotal을 넘지 않음 → total은 항상 0 이상

use serde::Serialize;
use thiserror::Error;

use crate::db::{DiscountType, Voucher};

/// 장바구니 한 줄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub unit_price: i64,
    pub discount_unit_price: Option<i64>,
    pub quantity: i64,
}

impl CartLine {
    pub fn effective_unit_price(&self) -> i64 {
        self.discount_unit_price.unwrap_or(self.unit_price)
    }

    /// 단가 × 수량 (범위를 넘으면 None)
    pub fn checked_line_total(&self) -> Option<i64> {
        self.effective_unit_price().checked_mul(self.quantity)
    }

    pub fn line_total(&self) -> i64 {
        self.effective_unit_price().saturating_mul(self.quantity)
    }
}

/// subtotal을 i64로 표현할 수 없으면 None
pub fn checked_subtotal(lines: &[CartLine]) -> Option<i64> {
    lines
        .iter()
        .try_fold(0i64, |acc, line| acc.checked_add(line.checked_line_total()?))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidDiscount {
    #[error("discount value must not be negative")]
    Negative,
    #[error("percentage discount must be at most 100")]
    PercentageOver100,
}

/// 검증된 할인 값 (음수, 100% 초과 거부)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoucherDiscount {
    kind: DiscountType,
    value: i64,
}

impl VoucherDiscount {
    pub fn new(kind: DiscountType, value: i64) -> Result<Self, InvalidDiscount> {
        if value < 0 {
            return Err(InvalidDiscount::Negative);
        }
        if kind == DiscountType::Percentage && value > 100 {
            return Err(InvalidDiscount::PercentageOver100);
        }
        Ok(Self { kind, value })
    }

    pub fn kind(&self) -> DiscountType {
        self.kind
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    /// clamp 전 할인 금액
    pub fn nominal_discount(&self, subtotal: i64) -> i64 {
        match self.kind {
            // i128: 큰 subtotal에서 곱셈 overflow 방지
            DiscountType::Percentage => (subtotal as i128 * self.value as i128 / 100) as i64,
            DiscountType::Fixed => self.value,
        }
    }
}

impl TryFrom<&Voucher> for VoucherDiscount {
    type Error = InvalidDiscount;

    fn try_from(voucher: &Voucher) -> Result<Self, Self::Error> {
        VoucherDiscount::new(voucher.discount_type, voucher.discount_value)
    }
}

/// 계산 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckoutTotals {
    pub subtotal: i64,
    pub discount: i64,
    pub total: i64,
}

/// 순수 함수: 부수 효과 없음, 에러 없음
///
/// 범위를 넘는 금액은 포화(saturate)됨. 호출자는 `checked_subtotal`로 먼저 거름
pub fn calculate_totals(lines: &[CartLine], voucher: Option<&VoucherDiscount>) -> CheckoutTotals {
    let subtotal = lines
        .iter()
        .fold(0i64, |acc, line| acc.saturating_add(line.line_total()));

    let discount = voucher
        .map(|v| v.nominal_discount(subtotal))
        .unwrap_or(0)
        .min(subtotal)
        .max(0);

    CheckoutTotals {
        subtotal,
        discount,
        total: subtotal - discount,
    }
}

/// 적용된 바우처 (코드 + 할인 값)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedVoucher {
    pub code: String,
    pub discount: VoucherDiscount,
}

/// 장바구니
///
/// 바우처는 최대 1개. 새 바우처를 적용하면 이전 바우처를 대체함 (중복 적용 없음)
#[derive(Debug, Clone, Default)]
pub struct Cart {
    lines: Vec<CartLine>,
    voucher: Option<AppliedVoucher>,
}

impl Cart {
    pub fn new(lines: Vec<CartLine>) -> Self {
        Self {
            lines,
            voucher: None,
        }
    }

    pub fn checked_subtotal(&self) -> Option<i64> {
        checked_subtotal(&self.lines)
    }

    pub fn voucher(&self) -> Option<&AppliedVoucher> {
        self.voucher.as_ref()
    }

    /// 이전 바우처를 반환하고 새 바우처로 교체
    pub fn apply_voucher(&mut self, voucher: AppliedVoucher) -> Option<AppliedVoucher> {
        self.voucher.replace(voucher)
    }

    pub fn remove_voucher(&mut self) -> Option<AppliedVoucher> {
        self.voucher.take()
    }

    pub fn totals(&self) -> CheckoutTotals {
        calculate_totals(&self.lines, self.voucher.as_ref().map(|v| &v.discount))
    }
}
