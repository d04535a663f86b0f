//! Digital Storefront API Library
//!
//! # Overview
//!
//! 디지털 상품(소프트웨어, e-book, 템플릿) 스토어의 백엔드 API.
//! 체크아웃은 WhatsApp으로 넘기고, 바우처 할인과 어필리에이트 커미션을 처리함.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                         API                              │
//! │                                                          │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌─────────┐    │
//! │  │ Routes  │  │Services │  │   DB    │  │  Auth   │    │
//! │  └────┬────┘  └────┬────┘  └────┬────┘  └────┬────┘    │
//! │       │            │            │            │          │
//! │       └────────────┴────────────┴────────────┘          │
//! │                         │                                │
//! └─────────────────────────┼────────────────────────────────┘
//!                           │
//!                           ▼
//!              ┌────────────────────────┐
//!              │  Store (Postgres/Mem)  │
//!              └────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: 환경 설정 관리
//! - `error`: 에러 타입 및 처리
//! - `auth`: 사용자 식별 (게이트웨이 헤더)
//! - `routes`: HTTP 엔드포인트 핸들러
//! - `services`: 비즈니스 로직 (가격, 바우처, 커미션, 추천)
//! - `db`: 저장소 (Store trait, Postgres, In-memory)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use storefront_api::{config::Config, db::MemoryStore, routes, AppState};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(Arc::new(MemoryStore::new()), config);
//!     let app = routes::create_router(state);
//!
//!     // ... 서버 시작
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;

// Re-exports for convenience
pub use config::Config;
pub use db::{Database, MemoryStore, Store};
pub use error::ApiError;

/// 애플리케이션 전역 상태
///
/// 전역 변수 대신 핸들러에 주입됨
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}
