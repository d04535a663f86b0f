//! Affiliate Endpoints

use axum::{extract::State, Json};

use crate::{
    auth::CurrentUser,
    db::Profile,
    error::ApiError,
    services::affiliate::{self, AffiliateDashboard},
    AppState,
};

/// POST /api/affiliate/join
///
/// 이미 가입했으면 기존 코드 그대로
pub async fn join(
    State(state): State<AppState>,
    CurrentUser(profile): CurrentUser,
) -> Result<Json<Profile>, ApiError> {
    let joined = affiliate::join_program(state.store.as_ref(), &profile).await?;
    Ok(Json(joined))
}

/// GET /api/affiliate/dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(profile): CurrentUser,
) -> Result<Json<AffiliateDashboard>, ApiError> {
    if profile.affiliate_code.is_none() {
        return Err(ApiError::Forbidden);
    }
    Ok(Json(affiliate::dashboard(state.store.as_ref(), &profile).await?))
}
