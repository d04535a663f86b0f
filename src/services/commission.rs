//! Affiliate Commission Service
//!
//! # Interview Q&A
//!
//! Q: 커미션은 매출 기준인가, 이익 기준인가?
//! A: 이익 기준
//!
//!    ```text
//!    total_sell   = Σ price × qty
//!    total_cost   = Σ cost_price × qty
//!    gross_profit = total_sell − total_cost
//!    net_profit   = max(0, gross_profit − order.discount_amount)
//!    commission   = floor(net_profit × rate / 100)
//!    ```
//!
//!    바우처 할인은 매출이 아니라 이익을 깎는 것으로 취급
//!
//! Q: 원가 스냅샷이 0인 예전 주문은?
//! A: 상품의 현재 원가로 보정 (best-effort)
//!    - 주문 이후 원가가 바뀌었다면 부정확할 수 있음
//!    - 상품이 삭제되었으면 원가 0
//!
//! Q: 중복 지급은 어떻게 막는가?
//! A: `Store::settle_commission`이 주문 플래그 CAS + 잔액 증가 + 로그를
//!    하나의 트랜잭션으로 처리. 플래그를 먼저 읽는 것은 최적화일 뿐이고
//!    최종 판단은 저장소가 함

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use serde::Serialize;
use uuid::Uuid;

use crate::db::{CommissionPayout, Order, OrderItem, Profile, Store};

/// 계산 과정 (디버깅, 관리자 화면용)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommissionBreakdown {
    pub total_sell: i64,
    pub total_cost: i64,
    pub gross_profit: i64,
    pub net_profit: i64,
    pub commission: i64,
}

/// 순수 계산
///
/// `current_cost`는 스냅샷 원가가 0인 상품에 대해서만 호출됨
pub fn compute_commission<F>(
    items: &[OrderItem],
    discount_amount: i64,
    rate: i64,
    mut current_cost: F,
) -> CommissionBreakdown
where
    F: FnMut(Uuid) -> i64,
{
    // 합계는 i128로 계산한 뒤 i64 범위로 포화
    let mut total_sell = 0i128;
    let mut total_cost = 0i128;

    for item in items {
        let unit_cost = if item.cost_price == 0 {
            current_cost(item.product_id)
        } else {
            item.cost_price
        };
        total_sell += item.price as i128 * item.quantity as i128;
        total_cost += unit_cost as i128 * item.quantity as i128;
    }

    let gross_profit = total_sell - total_cost;
    let net_profit = (gross_profit - discount_amount as i128).max(0);
    let rate = rate.clamp(0, 100) as i128;
    let commission = net_profit * rate / 100;

    let total_sell = saturate(total_sell);
    let total_cost = saturate(total_cost);
    let gross_profit = saturate(gross_profit);
    let net_profit = saturate(net_profit);
    let commission = saturate(commission);

    CommissionBreakdown {
        total_sell,
        total_cost,
        gross_profit,
        net_profit,
        commission,
    }
}

fn saturate(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// 커미션을 계산하지 않은 이유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyPaid,
    NoBuyer,
    NoReferrer,
    ReferrerNotFound,
    SelfReferral,
    RateDisabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommissionOutcome {
    /// 잔액 증가 + 로그 기록 완료
    Paid {
        affiliate_id: Uuid,
        amount: i64,
        breakdown: CommissionBreakdown,
    },
    /// 계산 결과 0 → 플래그만 설정
    Zero { breakdown: CommissionBreakdown },
    /// 아무것도 변경하지 않음
    Skipped { reason: SkipReason },
}

impl CommissionOutcome {
    fn skipped(reason: SkipReason) -> Self {
        CommissionOutcome::Skipped { reason }
    }
}

pub struct CommissionEngine<'a> {
    store: &'a dyn Store,
}

impl<'a> CommissionEngine<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// 완료된 주문의 커미션 처리 (최대 1회 지급)
    pub async fn process_order(&self, order_id: Uuid) -> Result<CommissionOutcome> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| anyhow!("order not found: {}", order_id))?;

        if order.commission_paid {
            return Ok(CommissionOutcome::skipped(SkipReason::AlreadyPaid));
        }

        let Some(buyer_id) = order.buyer_id else {
            return Ok(CommissionOutcome::skipped(SkipReason::NoBuyer));
        };
        let Some(buyer) = self.store.get_profile(buyer_id).await? else {
            return Ok(CommissionOutcome::skipped(SkipReason::NoBuyer));
        };
        let Some(referral_code) = buyer.referred_by.as_deref() else {
            return Ok(CommissionOutcome::skipped(SkipReason::NoReferrer));
        };
        let Some(referrer) = self.store.find_profile_by_affiliate_code(referral_code).await? else {
            tracing::warn!(order_id = %order.id, code = %referral_code, "referrer code resolves to no profile");
            return Ok(CommissionOutcome::skipped(SkipReason::ReferrerNotFound));
        };
        if referrer.id == buyer.id {
            return Ok(CommissionOutcome::skipped(SkipReason::SelfReferral));
        }

        let rate = self.store.get_settings().await?.commission_rate;
        if rate <= 0 {
            return Ok(CommissionOutcome::skipped(SkipReason::RateDisabled));
        }

        let fallback_costs = self.fallback_costs(&order).await?;
        let breakdown = compute_commission(&order.items, order.discount_amount, rate, |id| {
            fallback_costs.get(&id).copied().unwrap_or(0)
        });

        let payout = (breakdown.commission > 0).then(|| CommissionPayout {
            affiliate_id: referrer.id,
            amount: breakdown.commission,
            source_buyer: buyer_label(&buyer, &order),
            products: products_label(&order.items),
        });

        let settled = self.store.settle_commission(order.id, payout.as_ref()).await?;
        if !settled {
            // 다른 요청이 먼저 정산함
            tracing::info!(order_id = %order.id, "commission already settled concurrently");
            return Ok(CommissionOutcome::skipped(SkipReason::AlreadyPaid));
        }

        Ok(match payout {
            Some(payout) => {
                tracing::info!(
                    order_id = %order.id,
                    affiliate_id = %payout.affiliate_id,
                    amount = payout.amount,
                    net_profit = breakdown.net_profit,
                    rate,
                    "commission paid"
                );
                CommissionOutcome::Paid {
                    affiliate_id: payout.affiliate_id,
                    amount: payout.amount,
                    breakdown,
                }
            }
            None => {
                tracing::info!(order_id = %order.id, "commission is zero, order marked as settled");
                CommissionOutcome::Zero { breakdown }
            }
        })
    }

    /// 원가 스냅샷이 0인 상품의 현재 원가
    async fn fallback_costs(&self, order: &Order) -> Result<HashMap<Uuid, i64>> {
        let mut costs = HashMap::new();
        for item in order.items.iter().filter(|i| i.cost_price == 0) {
            if costs.contains_key(&item.product_id) {
                continue;
            }
            let cost = self
                .store
                .get_product(item.product_id)
                .await?
                .map(|p| p.cost_price)
                .unwrap_or(0);
            tracing::debug!(
                order_id = %order.id,
                product_id = %item.product_id,
                cost,
                "legacy order item without cost snapshot, using current cost"
            );
            costs.insert(item.product_id, cost);
        }
        Ok(costs)
    }
}

fn buyer_label(buyer: &Profile, order: &Order) -> String {
    buyer
        .full_name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| {
            if order.customer_name.trim().is_empty() {
                buyer.email.clone()
            } else {
                order.customer_name.clone()
            }
        })
}

fn products_label(items: &[OrderItem]) -> String {
    items
        .iter()
        .map(|i| {
            if i.quantity > 1 {
                format!("{} x{}", i.product_name, i.quantity)
            } else {
                i.product_name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
