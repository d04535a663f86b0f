//! Referral Attribution
//!
//! `?ref=CODE` 링크로 들어온 방문자를 추천인에게 연결.
//!
//! # Flow
//!
//! ```text
//! GET /anything?ref=aff123
//!   → 쿠키 ref_code=AFF123 저장 (마지막 클릭 우선, 기존 값 덮어씀)
//!
//! POST /api/profiles, POST /api/checkout
//!   → referred_by가 비어 있고, 쿠키가 있고, 본인 코드가 아니면
//!     profiles.referred_by = AFF123 (한 번만)
//! ```

use anyhow::Result;
use axum::http::{header::COOKIE, HeaderMap};

use crate::db::{Profile, Store};

/// 추천 코드를 담는 쿠키 이름
pub const REFERRAL_COOKIE: &str = "ref_code";

const MAX_CODE_LEN: usize = 32;

/// trim + uppercase, 허용 문자(영숫자, `-`, `_`)가 아니면 버림
pub fn normalize_referral_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_uppercase();
    let valid = !code.is_empty()
        && code.len() <= MAX_CODE_LEN
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(code)
}

/// 쿼리스트링에서 `ref` 파라미터 추출
pub fn referral_from_query(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "ref")
        .and_then(|(_, value)| normalize_referral_code(&value))
}

/// 요청 쿠키에서 저장된 추천 코드 읽기
pub fn stored_referral_code(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(name, _)| *name == REFERRAL_COOKIE)
        .filter_map(|(_, value)| normalize_referral_code(value))
        .last()
}

/// Set-Cookie 헤더 값
pub fn referral_cookie(code: &str, max_age_days: u32) -> String {
    format!(
        "{}={}; Max-Age={}; Path=/; SameSite=Lax; HttpOnly",
        REFERRAL_COOKIE,
        code,
        u64::from(max_age_days) * 24 * 60 * 60
    )
}

/// 붙일 추천 코드 결정 (순수 함수)
///
/// - 이미 referred_by가 있으면 None (write-once)
/// - 저장된 코드가 없으면 None
/// - 본인 어필리에이트 코드면 None (자기 추천 방지)
pub fn referral_to_attach(profile: &Profile, stored_code: Option<&str>) -> Option<String> {
    if profile.referred_by.is_some() {
        return None;
    }
    let code = normalize_referral_code(stored_code?)?;
    if profile.affiliate_code.as_deref() == Some(code.as_str()) {
        return None;
    }
    Some(code)
}

/// 프로필에 추천인 연결
///
/// 연결된 코드를 반환. 코드가 실제 어필리에이트와 매칭되지 않으면 아무것도 하지 않음
pub async fn attach_referral(
    store: &dyn Store,
    profile: &Profile,
    stored_code: Option<&str>,
) -> Result<Option<String>> {
    let Some(code) = referral_to_attach(profile, stored_code) else {
        return Ok(None);
    };

    match store.find_profile_by_affiliate_code(&code).await? {
        Some(referrer) if referrer.id != profile.id => {}
        Some(_) => return Ok(None),
        None => {
            tracing::debug!(code = %code, "referral code matches no affiliate");
            return Ok(None);
        }
    }

    if store.attach_referrer(profile.id, &code).await? {
        tracing::info!(profile_id = %profile.id, code = %code, "referral attached");
        Ok(Some(code))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, Role};
    use axum::http::HeaderValue;
    use chrono::Utc;
    use uuid::Uuid;

    fn profile(code: Option<&str>, referred_by: Option<&str>) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            full_name: None,
            role: Role::Customer,
            affiliate_code: code.map(str::to_string),
            referred_by: referred_by.map(str::to_string),
            balance: 0,
            bank_name: None,
            bank_account_number: None,
            bank_account_holder: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_referral_from_query() {
        assert_eq!(referral_from_query("ref=aff123"), Some("AFF123".to_string()));
        assert_eq!(
            referral_from_query("page=2&ref=%20promo_1%20"),
            Some("PROMO_1".to_string())
        );
        assert_eq!(referral_from_query("page=2"), None);
        assert_eq!(referral_from_query("ref="), None);
        assert_eq!(referral_from_query("ref=bad%3Bcode"), None);
    }

    #[test]
    fn test_stored_referral_code_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; ref_code=aff123; other=1"),
        );
        assert_eq!(stored_referral_code(&headers), Some("AFF123".to_string()));

        assert_eq!(stored_referral_code(&HeaderMap::new()), None);
    }

    #[test]
    fn test_referral_cookie() {
        let cookie = referral_cookie("AFF123", 30);
        assert!(cookie.starts_with("ref_code=AFF123;"));
        assert!(cookie.contains("Max-Age=2592000"));
    }

    #[test]
    fn test_self_referral_is_ignored() {
        let own = profile(Some("ME123"), None);
        assert_eq!(referral_to_attach(&own, Some("me123")), None);
        assert_eq!(referral_to_attach(&own, Some("OTHER")), Some("OTHER".to_string()));
    }

    #[test]
    fn test_existing_referrer_is_never_overwritten() {
        let referred = profile(None, Some("FIRST"));
        assert_eq!(referral_to_attach(&referred, Some("SECOND")), None);
        assert_eq!(referral_to_attach(&profile(None, None), None), None);
    }

    #[tokio::test]
    async fn test_attach_referral_requires_existing_affiliate() {
        let store = MemoryStore::new();
        let affiliate = profile(Some("AFF123"), None);
        let buyer = profile(None, None);
        store.put_profile(affiliate).await;
        store.put_profile(buyer.clone()).await;

        let attached = attach_referral(&store, &buyer, Some("GHOST")).await.unwrap();
        assert_eq!(attached, None);

        let attached = attach_referral(&store, &buyer, Some("aff123")).await.unwrap();
        assert_eq!(attached.as_deref(), Some("AFF123"));

        let stored = store.get_profile(buyer.id).await.unwrap().unwrap();
        assert_eq!(stored.referred_by.as_deref(), Some("AFF123"));
    }
}
