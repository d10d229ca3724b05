//! # Simtrade Client
//!
//! 모의투자 서버와 통신하는 클라이언트 계층입니다.
//!
//! - [`guard::SessionTokenGuard`]: REST 요청에 토큰을 붙이고 401이면 한 번 재발급 후 재시도
//! - [`live::LivePriceSynchronizer`]: STOMP over WebSocket 시세 스냅샷 동기화
//! - [`auth::LoginFlow`]: OAuth 콜백 처리, 토큰 재발급, 로그아웃
//! - [`api::ApiClient`]: 기업/포트폴리오/랭킹/주문 API
//! - [`view::CompanyView`]: 기업 화면의 체결 결과 처리
//!
//! # 예제
//!
//! ```no_run
//! use std::sync::Arc;
//! use simtrade_client::{ApiClient, LivePriceSynchronizer, SessionContext, SessionTokenGuard};
//! use simtrade_core::ClientConfig;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::load_default()?;
//! let session = SessionContext::from_config(&config)?;
//! let guard = Arc::new(SessionTokenGuard::new(config.api.clone(), Arc::clone(&session))?);
//! let api = ApiClient::new(guard);
//!
//! let live = Arc::new(LivePriceSynchronizer::new(config.live.clone(), session));
//! let _scope = live.enter_scope()?;
//! live.refresh_snapshot(&api).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod guard;
pub mod live;
pub mod session;
pub mod stomp;
pub mod view;

pub use api::ApiClient;
pub use auth::LoginFlow;
pub use guard::{ApiRequest, ApiResponse, RequestAttempt, RequestFailure, SessionTokenGuard};
pub use live::{
    apply_price_message, ConnectionHandle, LiveFeedScope, LivePriceSynchronizer,
    TopicSubscription, TradeResultSubscription,
};
pub use session::{
    AccessToken, FileTokenStore, MemoryTokenStore, SessionContext, SessionStatus, TokenStore,
};
pub use stomp::ConnectionState;
pub use view::{
    dispatch_trade_result, CompanyRefetch, CompanyView, CompanyViewState, TradeNotification,
    TradeNotifier, TradeResultWatch,
};
