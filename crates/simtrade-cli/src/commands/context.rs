//! 명령어 공통 실행 컨텍스트.

use anyhow::{Context, Result};
use std::sync::Arc;

use simtrade_client::{ApiClient, LivePriceSynchronizer, LoginFlow, SessionContext, SessionTokenGuard};
use simtrade_core::ClientConfig;

/// 설정에서 만든 클라이언트 구성 요소 묶음.
pub struct ClientContext {
    pub config: ClientConfig,
    pub session: Arc<SessionContext>,
    pub guard: Arc<SessionTokenGuard>,
    pub api: ApiClient,
}

impl ClientContext {
    /// 설정으로 컨텍스트 생성.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate().context("설정 검증 실패")?;

        let session = SessionContext::from_config(&config)?;
        let guard = Arc::new(SessionTokenGuard::new(config.api.clone(), Arc::clone(&session))?);
        let api = ApiClient::new(Arc::clone(&guard));

        Ok(Self {
            config,
            session,
            guard,
            api,
        })
    }

    /// 로그인 흐름.
    pub fn login_flow(&self) -> LoginFlow {
        LoginFlow::new(Arc::clone(&self.guard))
    }

    /// 실시간 시세 동기화기.
    pub fn synchronizer(&self) -> Arc<LivePriceSynchronizer> {
        Arc::new(LivePriceSynchronizer::new(
            self.config.live.clone(),
            Arc::clone(&self.session),
        ))
    }

    /// 로그인 상태가 아니면 에러.
    pub fn require_login(&self) -> Result<()> {
        if !self.session.is_authenticated() {
            anyhow::bail!("로그인이 필요합니다. `simtrade login`을 먼저 실행하세요");
        }
        Ok(())
    }
}
