//! Authentication and Authorization
//!
//! 인증 자체는 앞단의 인증 게이트웨이가 처리하고, 검증된 사용자 ID를
//! 헤더로 전달함.
//!
//! ```text
//! X-User-Id: 3f2c9a0e-...
//! ```
//!
//! # Extractors
//!
//! - `AuthUser`: 헤더의 사용자 ID만 (프로필 생성 전, 가입 시)
//! - `CurrentUser`: 프로필까지 로드 (없으면 401)
//! - `OptionalUser`: 비회원 허용 (체크아웃)
//! - `AdminUser`: role = admin (아니면 403)

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use uuid::Uuid;

use crate::{db::Profile, db::Role, error::ApiError, AppState};

/// 게이트웨이가 넣어주는 사용자 ID 헤더
pub const USER_ID_HEADER: &str = "x-user-id";

fn user_id_from_parts(parts: &Parts) -> Result<Option<Uuid>, ApiError> {
    let Some(value) = parts.headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    let id = value
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or(ApiError::Unauthorized)?;
    Ok(Some(id))
}

async fn load_profile(state: &AppState, id: Uuid) -> Result<Profile, ApiError> {
    state
        .store
        .get_profile(id)
        .await?
        .ok_or(ApiError::Unauthorized)
}

/// 인증된 사용자 ID (프로필 없을 수 있음)
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_id_from_parts(parts)?
            .map(AuthUser)
            .ok_or(ApiError::Unauthorized)
    }
}

/// 프로필이 있는 로그인 사용자
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Profile);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let id = user_id_from_parts(parts)?.ok_or(ApiError::Unauthorized)?;
        Ok(CurrentUser(load_profile(state, id).await?))
    }
}

/// 헤더가 없으면 비회원
#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<Profile>);

#[async_trait]
impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match user_id_from_parts(parts)? {
            Some(id) => Ok(OptionalUser(Some(load_profile(state, id).await?))),
            None => Ok(OptionalUser(None)),
        }
    }
}

/// 관리자
#[derive(Debug, Clone)]
pub struct AdminUser(pub Profile);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(profile) = CurrentUser::from_request_parts(parts, state).await?;
        if profile.role != Role::Admin {
            tracing::warn!(profile_id = %profile.id, "non-admin attempted admin action");
            return Err(ApiError::Forbidden);
        }
        Ok(AdminUser(profile))
    }
}
