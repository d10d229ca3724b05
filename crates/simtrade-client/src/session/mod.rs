//! 세션 컨텍스트.
//!
//! 토큰 저장소와 세션 상태를 한곳에서 관리합니다. 가드, 로그인 흐름,
//! 실시간 동기화가 같은 `Arc<SessionContext>`를 공유합니다.

mod store;

pub use store::{AccessToken, FileTokenStore, MemoryTokenStore, TokenStore};

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use simtrade_core::{ClientConfig, ClientResult};

/// 세션 상태.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// 토큰 없음
    Anonymous,
    /// 토큰 보유
    Authenticated,
    /// 재인증 실패. 로그인 화면으로 이동해야 함
    LoginRequired {
        /// 이동할 로그인 화면 URL
        login_url: String,
    },
    /// 사용자가 로그아웃함
    LoggedOut,
}

impl SessionStatus {
    /// 인증 상태인지 확인.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionStatus::Authenticated)
    }
}

/// 공유 세션 컨텍스트.
pub struct SessionContext {
    store: Arc<dyn TokenStore>,
    status: watch::Sender<SessionStatus>,
    login_url: String,
}

impl SessionContext {
    /// 새 세션 컨텍스트 생성.
    ///
    /// 저장소에 토큰이 있으면 `Authenticated`로 시작합니다.
    pub fn new(store: Arc<dyn TokenStore>, login_url: impl Into<String>) -> Self {
        let initial = match store.load() {
            Ok(Some(_)) => SessionStatus::Authenticated,
            Ok(None) => SessionStatus::Anonymous,
            Err(e) => {
                warn!("토큰 저장소 읽기 실패: {}", e);
                SessionStatus::Anonymous
            }
        };
        let (status, _) = watch::channel(initial);

        Self {
            store,
            status,
            login_url: login_url.into(),
        }
    }

    /// 설정의 파일 저장소로 세션 컨텍스트 생성.
    pub fn from_config(config: &ClientConfig) -> ClientResult<Arc<Self>> {
        let store = FileTokenStore::new(&config.storage.token_path, &config.storage.token_key);
        let login_url = config.api.login_url()?;
        Ok(Arc::new(Self::new(Arc::new(store), login_url.as_str())))
    }

    /// 현재 접근 토큰.
    ///
    /// 저장소 에러는 토큰 없음으로 취급합니다.
    pub fn access_token(&self) -> Option<AccessToken> {
        match self.store.load() {
            Ok(token) => token,
            Err(e) => {
                warn!("토큰 저장소 읽기 실패: {}", e);
                None
            }
        }
    }

    /// 접근 토큰 저장.
    pub fn set_access_token(&self, token: &AccessToken) -> ClientResult<()> {
        self.store.store(token)?;
        self.status.send_replace(SessionStatus::Authenticated);
        Ok(())
    }

    /// 재인증 실패 처리: 토큰 삭제 후 로그인 화면 이동 신호.
    pub fn invalidate(&self) {
        if let Err(e) = self.store.clear() {
            warn!("토큰 삭제 실패: {}", e);
        }
        info!(login_url = %self.login_url, "세션 만료, 로그인 필요");
        self.status.send_replace(SessionStatus::LoginRequired {
            login_url: self.login_url.clone(),
        });
    }

    /// 로그아웃: 토큰 삭제.
    pub fn logout(&self) -> ClientResult<()> {
        self.store.clear()?;
        self.status.send_replace(SessionStatus::LoggedOut);
        info!("로그아웃 완료");
        Ok(())
    }

    /// 현재 세션 상태.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// 세션 상태 변경 구독.
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// 토큰 보유 여부.
    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    /// 로그인 화면 URL.
    pub fn login_url(&self) -> &str {
        &self.login_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(token: Option<&str>) -> SessionContext {
        let store = match token {
            Some(t) => MemoryTokenStore::with_token(t),
            None => MemoryTokenStore::new(),
        };
        SessionContext::new(Arc::new(store), "http://localhost:8080/login")
    }

    #[test]
    fn test_initial_status_follows_store() {
        assert_eq!(context(Some("t")).status(), SessionStatus::Authenticated);
        assert_eq!(context(None).status(), SessionStatus::Anonymous);
    }

    #[test]
    fn test_invalidate_clears_token_and_requests_login() {
        let session = context(Some("t"));
        let mut rx = session.subscribe_status();

        session.invalidate();

        assert!(session.access_token().is_none());
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            *rx.borrow_and_update(),
            SessionStatus::LoginRequired {
                login_url: "http://localhost:8080/login".to_string()
            }
        );
    }

    #[test]
    fn test_set_token_then_logout() {
        let session = context(None);
        session.set_access_token(&AccessToken::new("fresh")).unwrap();
        assert!(session.is_authenticated());
        assert_eq!(session.access_token().unwrap().expose(), "fresh");

        session.logout().unwrap();
        assert!(!session.is_authenticated());
        assert_eq!(session.status(), SessionStatus::LoggedOut);
    }
}
