//! 로그인 흐름.
//!
//! OAuth 로그인은 브라우저에서 진행되고, 서버는 콜백 URL의 `accessToken`
//! 쿼리 파라미터로 토큰을 돌려줍니다. 쿼리에 토큰이 없으면 refresh 쿠키로
//! `/auth/reissue`를 호출해 `Authorization` 응답 헤더에서 토큰을 얻습니다.

use reqwest::header::AUTHORIZATION;
use std::sync::Arc;
use tracing::{error, info};
use url::Url;

use simtrade_core::{ClientError, ClientResult};

use crate::guard::SessionTokenGuard;
use crate::session::AccessToken;

/// 콜백 쿼리의 토큰 파라미터 이름.
const TOKEN_PARAM: &str = "accessToken";

/// 로그인/로그아웃 흐름.
pub struct LoginFlow {
    guard: Arc<SessionTokenGuard>,
}

impl LoginFlow {
    /// 새 로그인 흐름 생성.
    pub fn new(guard: Arc<SessionTokenGuard>) -> Self {
        Self { guard }
    }

    /// OAuth 로그인 진입 URL.
    pub fn login_url(&self) -> ClientResult<Url> {
        self.guard.url(&self.guard.config().oauth_path)
    }

    /// 로그인 콜백 처리.
    ///
    /// `callback`은 전체 콜백 URL 또는 쿼리 문자열(`?` 포함 가능)입니다.
    pub async fn complete_callback(&self, callback: &str) -> ClientResult<AccessToken> {
        match token_from_callback(callback) {
            Some(token) => {
                self.guard.session().set_access_token(&token)?;
                info!("콜백 URL에서 접근 토큰 수신");
                Ok(token)
            }
            None => self.reissue().await,
        }
    }

    /// refresh 쿠키로 접근 토큰 재발급.
    ///
    /// 실패하면 세션을 무효화하고 `Reauthentication` 에러를 반환합니다.
    pub async fn reissue(&self) -> ClientResult<AccessToken> {
        match self.request_reissue().await {
            Ok(token) => {
                self.guard.session().set_access_token(&token)?;
                info!("reissue로 접근 토큰 수신");
                Ok(token)
            }
            Err(e) => {
                error!("토큰 재발급 실패: {}", e);
                self.guard.session().invalidate();
                Err(ClientError::Reauthentication(e.to_string()))
            }
        }
    }

    async fn request_reissue(&self) -> ClientResult<AccessToken> {
        let url = self.guard.url(&self.guard.config().reissue_path)?;
        let response = self.guard.http().get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::request(
                status.as_u16(),
                status.canonical_reason().unwrap_or("reissue failed"),
            ));
        }

        response
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(AccessToken::from_authorization)
            .ok_or_else(|| ClientError::Parse("Authorization 헤더가 없습니다".to_string()))
    }

    /// 로그아웃: 토큰과 기본 헤더 제거.
    pub fn logout(&self) -> ClientResult<()> {
        self.guard.clear_default_authorization();
        self.guard.session().logout()
    }
}

fn token_from_callback(callback: &str) -> Option<AccessToken> {
    let query = match Url::parse(callback) {
        Ok(url) => url.query().unwrap_or_default().to_string(),
        Err(_) => callback.trim_start_matches('?').to_string(),
    };

    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == TOKEN_PARAM)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
        .map(AccessToken::new)
}
