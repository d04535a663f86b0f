//! Public Store Settings

use axum::{extract::State, Json};
use serde::Serialize;

use crate::{error::ApiError, AppState};

/// 스토어 화면에 필요한 값만 (커미션 비율 제외)
#[derive(Debug, Serialize)]
pub struct PublicSettings {
    pub store_name: String,
    pub whatsapp_number: String,
    pub payment_instructions: String,
}

/// GET /api/settings/public
pub async fn public_settings(
    State(state): State<AppState>,
) -> Result<Json<PublicSettings>, ApiError> {
    let settings = state.store.get_settings().await?;
    Ok(Json(PublicSettings {
        store_name: settings.store_name,
        whatsapp_number: settings.whatsapp_number,
        payment_instructions: settings.payment_instructions,
    }))
}
