//! Services Module
//!
//! 비즈니스 로직을 담당하는 서비스 레이어.
//! 모든 서비스는 `&dyn Store`만 받으므로 HTTP 없이 테스트 가능.
//!
//! # Services
//! - `pricing`: 장바구니 합계 / 바우처 할인 계산 (순수 함수)
//! - `voucher`: 바우처 코드 조회
//! - `commission`: 어필리에이트 커미션 계산 및 정산
//! - `referral`: 추천 코드 수집 및 연결
//! - `whatsapp`: 체크아웃 메시지 링크
//! - `affiliate`: 어필리에이트 가입 / 정산
//! - `orders`: 체크아웃, 주문 상태 변경

pub mod affiliate;
pub mod commission;
pub mod orders;
pub mod pricing;
pub mod referral;
pub mod voucher;
pub mod whatsapp;

pub use commission::{CommissionEngine, CommissionOutcome};
pub use pricing::{calculate_totals, Cart, CartLine, CheckoutTotals, VoucherDiscount};
