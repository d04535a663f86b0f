//! Profile Endpoints
//!
//! # Signup Hook
//!
//! 인증 게이트웨이에서 가입이 끝나면 클라이언트가 `POST /api/profiles`를 호출.
//! 프로필을 만들고 `ref_code` 쿠키가 있으면 추천인을 연결함.

use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use serde::Deserialize;

use crate::{
    auth::{AuthUser, CurrentUser},
    db::{BankDetails, NewProfile, Profile},
    error::ApiError,
    services::referral::{attach_referral, stored_referral_code},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateProfileRequest {
    pub email: String,
    pub full_name: Option<String>,
}

/// POST /api/profiles
///
/// 이미 있으면 200 + 기존 프로필, 새로 만들면 201
pub async fn create_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    headers: HeaderMap,
    Json(req): Json<CreateProfileRequest>,
) -> Result<(StatusCode, Json<Profile>), ApiError> {
    let store = state.store.as_ref();

    let (status, profile) = match store.get_profile(user_id).await? {
        Some(existing) => (StatusCode::OK, existing),
        None => {
            let email = req.email.trim();
            if !email.contains('@') {
                return Err(ApiError::ValidationError("email is invalid".to_string()));
            }
            let created = store
                .insert_profile(&NewProfile {
                    id: user_id,
                    email: email.to_string(),
                    full_name: req
                        .full_name
                        .map(|n| n.trim().to_string())
                        .filter(|n| !n.is_empty()),
                })
                .await?;
            tracing::info!(profile_id = %user_id, "profile created");
            (StatusCode::CREATED, created)
        }
    };

    let stored = stored_referral_code(&headers);
    let profile = match attach_referral(store, &profile, stored.as_deref()).await? {
        Some(_) => store.get_profile(user_id).await?.unwrap_or(profile),
        None => profile,
    };

    Ok((status, Json(profile)))
}

/// GET /api/profiles/me
pub async fn get_me(CurrentUser(profile): CurrentUser) -> Json<Profile> {
    Json(profile)
}

/// PUT /api/profiles/me/bank
pub async fn update_bank(
    State(state): State<AppState>,
    CurrentUser(profile): CurrentUser,
    Json(req): Json<BankDetails>,
) -> Result<Json<Profile>, ApiError> {
    let bank = BankDetails {
        bank_name: req.bank_name.trim().to_string(),
        bank_account_number: req.bank_account_number.trim().to_string(),
        bank_account_holder: req.bank_account_holder.trim().to_string(),
    };
    if bank.bank_name.is_empty()
        || bank.bank_account_number.is_empty()
        || bank.bank_account_holder.is_empty()
    {
        return Err(ApiError::ValidationError(
            "bank name, account number and account holder are required".to_string(),
        ));
    }

    let updated = state
        .store
        .update_bank_details(profile.id, &bank)
        .await?
        .ok_or_else(|| ApiError::NotFound("Profile".to_string()))?;
    Ok(Json(updated))
}
