//! Affiliate Program
//!
//! 어필리에이트 가입(코드 발급)과 관리자 정산(잔액 초기화).

use anyhow::{bail, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::db::{CommissionLog, Profile, Role, Store};

const CODE_LEN: usize = 8;
const MAX_CODE_ATTEMPTS: usize = 5;

/// 8자리 대문자 영숫자 코드
pub fn generate_affiliate_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_LEN)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect()
}

/// 어필리에이트 가입
///
/// 이미 코드가 있으면 그대로 반환 (멱등). 관리자는 역할을 유지함.
pub async fn join_program(store: &dyn Store, profile: &Profile) -> Result<Profile> {
    if profile.affiliate_code.is_some() {
        return Ok(profile.clone());
    }

    let role = match profile.role {
        Role::Admin => Role::Admin,
        _ => Role::Affiliate,
    };

    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = generate_affiliate_code();
        if store.claim_affiliate_code(profile.id, &code, role).await? {
            tracing::info!(profile_id = %profile.id, code = %code, "affiliate joined");
            return match store.get_profile(profile.id).await? {
                Some(updated) => Ok(updated),
                None => bail!("profile disappeared after join: {}", profile.id),
            };
        }
        tracing::debug!(attempt, "affiliate code collision, retrying");
    }

    bail!("could not allocate a unique affiliate code")
}

/// 어필리에이트 대시보드
#[derive(Debug, Serialize)]
pub struct AffiliateDashboard {
    pub affiliate_code: Option<String>,
    pub balance: i64,
    pub referral_count: i64,
    pub total_earned: i64,
    pub commissions: Vec<CommissionLog>,
}

pub async fn dashboard(store: &dyn Store, profile: &Profile) -> Result<AffiliateDashboard> {
    let (referral_count, commissions) = match &profile.affiliate_code {
        Some(code) => (
            store.count_referrals(code).await?,
            store.list_commission_logs(profile.id).await?,
        ),
        None => (0, vec![]),
    };

    Ok(AffiliateDashboard {
        affiliate_code: profile.affiliate_code.clone(),
        balance: profile.balance,
        referral_count,
        total_earned: commissions.iter().map(|c| c.amount).sum(),
        commissions,
    })
}

/// 관리자 정산 결과
#[derive(Debug, Serialize)]
pub struct Payout {
    pub affiliate_id: Uuid,
    pub paid_amount: i64,
    pub bank_name: Option<String>,
    pub bank_account_number: Option<String>,
    pub bank_account_holder: Option<String>,
}

/// 잔액을 0으로 초기화 (실제 송금은 관리자가 수동으로)
///
/// 프로필이 없으면 None
pub async fn reset_payout(store: &dyn Store, affiliate_id: Uuid) -> Result<Option<Payout>> {
    let Some(profile) = store.get_profile(affiliate_id).await? else {
        return Ok(None);
    };
    let Some(paid_amount) = store.reset_balance(affiliate_id).await? else {
        return Ok(None);
    };

    tracing::info!(affiliate_id = %affiliate_id, paid_amount, "affiliate payout reset");

    Ok(Some(Payout {
        affiliate_id,
        paid_amount,
        bank_name: profile.bank_name,
        bank_account_number: profile.bank_account_number,
        bank_account_holder: profile.bank_account_holder,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, NewProfile};

    async fn new_profile(store: &MemoryStore) -> Profile {
        store
            .insert_profile(&NewProfile {
                id: Uuid::new_v4(),
                email: "rina@example.com".to_string(),
                full_name: Some("Rina".to_string()),
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_generated_code_shape() {
        let code = generate_affiliate_code();
        assert_eq!(code.len(), CODE_LEN);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let store = MemoryStore::new();
        let profile = new_profile(&store).await;

        let joined = join_program(&store, &profile).await.unwrap();
        assert_eq!(joined.role, Role::Affiliate);
        let code = joined.affiliate_code.clone().unwrap();

        let again = join_program(&store, &joined).await.unwrap();
        assert_eq!(again.affiliate_code, Some(code));
    }

    #[tokio::test]
    async fn test_reset_payout() {
        let store = MemoryStore::new();
        let profile = new_profile(&store).await;
        store.increment_balance(profile.id, 42_000).await.unwrap();

        let payout = reset_payout(&store, profile.id).await.unwrap().unwrap();
        assert_eq!(payout.paid_amount, 42_000);
        assert_eq!(store.get_profile(profile.id).await.unwrap().unwrap().balance, 0);

        assert!(reset_payout(&store, Uuid::new_v4()).await.unwrap().is_none());
    }
}
