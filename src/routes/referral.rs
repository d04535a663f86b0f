//! Referral Capture Middleware
//!
//! `?ref=CODE`가 붙은 모든 요청에 `ref_code` 쿠키를 내려줌 (마지막 클릭 우선).

use axum::{
    extract::{Request, State},
    http::{header::SET_COOKIE, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::{
    services::referral::{referral_cookie, referral_from_query},
    AppState,
};

pub async fn capture_referral(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let code = request.uri().query().and_then(referral_from_query);

    let mut response = next.run(request).await;

    if let Some(code) = code {
        let cookie = referral_cookie(&code, state.config.referral_cookie_days);
        // 정규화된 코드는 영숫자와 -, _ 뿐이라 항상 유효한 헤더 값
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
                tracing::debug!(code = %code, "referral code captured");
            }
            Err(e) => tracing::warn!(error = %e, "could not build referral cookie"),
        }
    }

    response
}
