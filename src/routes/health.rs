//! Health Check Endpoint
//!
//! # Interview Q&A
//!
//! Q: 왜 저장소까지 확인하는가?
//! A: 프로세스가 살아 있어도 DB가 끊기면 체크아웃이 불가능
//!    - 저장소 응답까지 확인해서 degraded 상태를 구분
//!    - 로드밸런서가 트래픽을 뺄 수 있음

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

/// Health check 응답
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: StoreStatus,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct StoreStatus {
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let started = std::time::Instant::now();
    let store = match state.store.health_check().await {
        Ok(()) => StoreStatus {
            connected: true,
            latency_ms: Some(started.elapsed().as_millis() as u64),
        },
        Err(e) => {
            tracing::warn!(error = ?e, "store health check failed");
            StoreStatus {
                connected: false,
                latency_ms: None,
            }
        }
    };

    Json(HealthResponse {
        status: if store.connected { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        store,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
