//! Digital Storefront API Server
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Client (Storefront / Admin Dashboard)           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  X-User-Id (auth gateway)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum Web Server                         │
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                      Routes Layer                        ││
//! │  │  /products  /cart  /checkout  /affiliate  /admin/*      ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Services Layer                        ││
//! │  │  Pricing   Voucher   Commission   Referral   WhatsApp   ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Data Layer                            ││
//! │  │  Store trait → PostgreSQL | In-memory                   ││
//! │  └─────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                  WhatsApp (wa.me 링크로 주문 전달)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_api::{
    config::StoreBackend, routes, AppState, Config, Database, MemoryStore, Store,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 환경변수 로드
    dotenvy::dotenv().ok();

    // 로깅 초기화
    // RUST_LOG=debug,sqlx=warn 형태로 레벨 제어 가능
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "storefront_api=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Starting Digital Storefront API Server");

    // 설정 로드
    let config = Config::from_env()?;
    tracing::info!(environment = ?config.environment, backend = ?config.store_backend, "📋 Configuration loaded");

    // 저장소 구성
    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Postgres => {
            let db = Database::connect(&config.database_url).await?;
            tracing::info!("🗄️  Database connected");

            db.run_migrations().await?;
            tracing::info!("📦 Migrations completed");
            Arc::new(db)
        }
        StoreBackend::Memory => {
            tracing::warn!("🧪 Using in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    // 앱 상태 구성 + 라우터
    let app = routes::create_router(AppState::new(store, config));

    // 서버 시작
    tracing::info!("🌐 Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
