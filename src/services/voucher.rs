//! Voucher Lookup
//!
//! 사용자가 입력한 코드 → 활성 바우처.
//! 비교는 정규화(trim + uppercase) 후 정확히 일치하는지로만 판단하고,
//! DB collation에 의존하지 않음.

use thiserror::Error;

use crate::db::{Store, VoucherInput};
use crate::services::pricing::{AppliedVoucher, InvalidDiscount, VoucherDiscount};

#[derive(Debug, Error)]
pub enum VoucherError {
    /// 코드 없음, 비활성, 잘못된 값 → 사용자에게는 모두 "voucher invalid"
    #[error("voucher invalid")]
    Invalid,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// trim + uppercase
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// 코드로 활성 바우처 조회
pub async fn resolve_voucher(store: &dyn Store, raw_code: &str) -> Result<AppliedVoucher, VoucherError> {
    let code = normalize_code(raw_code);
    if code.is_empty() {
        return Err(VoucherError::Invalid);
    }

    let voucher = match store.find_voucher_by_code(&code).await? {
        Some(v) if v.is_active => v,
        Some(_) => {
            tracing::debug!(code = %code, "voucher inactive");
            return Err(VoucherError::Invalid);
        }
        None => {
            tracing::debug!(code = %code, "voucher not found");
            return Err(VoucherError::Invalid);
        }
    };

    // 저장된 값이 깨져 있어도 계산기까지 가지 않음
    let discount = VoucherDiscount::try_from(&voucher).map_err(|e| {
        tracing::warn!(code = %code, error = %e, "stored voucher has invalid value");
        VoucherError::Invalid
    })?;

    Ok(AppliedVoucher {
        code: voucher.code,
        discount,
    })
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VoucherInputError {
    #[error("voucher code is required")]
    EmptyCode,
    #[error(transparent)]
    Discount(#[from] InvalidDiscount),
}

/// 관리자 입력 검증 + 코드 정규화
pub fn prepare_voucher_input(mut input: VoucherInput) -> Result<VoucherInput, VoucherInputError> {
    input.code = normalize_code(&input.code);
    if input.code.is_empty() {
        return Err(VoucherInputError::EmptyCode);
    }
    VoucherDiscount::new(input.discount_type, input.discount_value)?;
    Ok(input)
}
