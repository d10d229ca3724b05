//! 세션 토큰 가드.
//!
//! 모든 REST 요청에 접근 토큰을 붙이고, 401 응답을 받으면 토큰을 한 번
//! 재발급한 뒤 원래 요청을 정확히 한 번 다시 보냅니다.
//!
//! 처리 순서:
//! 1. `attach_credential`: 저장된 토큰이 있으면 `Authorization: Bearer <token>` 설정
//! 2. 전송 후 성공 응답은 `handle_response`가 그대로 통과
//! 3. 실패는 `handle_failure`가 분류
//!    - 401이 아니거나 이미 재시도한 요청 → 그대로 에러 전파
//!    - 그 외 → 재발급 → 토큰 저장 → 기본 헤더 갱신 → 한 번 재전송
//!    - 재발급 실패 → 토큰 삭제, 로그인 필요 신호, `Reauthentication` 에러

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

use simtrade_core::{ApiConfig, ClientError, ClientResult, RefreshPolicy, ResultsEnvelope};

use crate::session::{AccessToken, SessionContext, SessionStatus};

/// 요청당 최대 재발급-재시도 횟수.
const MAX_AUTH_RETRIES: u32 = 1;

/// API 요청 명세.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP 메서드
    pub method: Method,
    /// 기본 URL 기준 경로
    pub path: String,
    /// 쿼리 파라미터
    pub query: Vec<(String, String)>,
    /// JSON 본문
    pub body: Option<Value>,
    /// 요청별 헤더 (기본 헤더보다 우선)
    pub headers: HeaderMap,
}

impl ApiRequest {
    /// 새 요청 생성.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    /// GET 요청.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST 요청.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// 쿼리 파라미터 추가.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// JSON 본문 설정.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// 요청에 실린 접근 토큰.
    pub fn credential(&self) -> Option<AccessToken> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(AccessToken::from_authorization)
    }

    fn set_authorization(&mut self, token: &AccessToken) -> ClientResult<()> {
        self.headers.insert(AUTHORIZATION, bearer_header(token)?);
        Ok(())
    }
}

/// 재시도 횟수를 추적하는 요청.
#[derive(Debug, Clone)]
pub struct RequestAttempt {
    /// 요청
    pub request: ApiRequest,
    /// 재발급 후 재시도한 횟수
    pub retries: u32,
}

impl RequestAttempt {
    /// 첫 시도.
    pub fn new(request: ApiRequest) -> Self {
        Self { request, retries: 0 }
    }

    /// 재발급-재시도 가능 여부.
    pub fn can_retry(&self) -> bool {
        self.retries < MAX_AUTH_RETRIES
    }
}

/// 성공 응답.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// 상태 코드
    pub status: StatusCode,
    /// 응답 헤더
    pub headers: HeaderMap,
    /// 응답 본문
    pub body: String,
}

impl ApiResponse {
    /// 본문을 JSON으로 역직렬화.
    pub fn json<T: DeserializeOwned>(&self) -> ClientResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// `results` 봉투의 내용 반환.
    pub fn results<T: DeserializeOwned>(&self) -> ClientResult<Option<T>> {
        if self.body.trim().is_empty() {
            return Ok(None);
        }
        Ok(self.json::<ResultsEnvelope<T>>()?.results)
    }

    /// 헤더 값 조회.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// 실패한 전송.
#[derive(Debug, Clone)]
pub struct RequestFailure {
    /// 상태 코드 (전송 실패 시 없음)
    pub status: Option<StatusCode>,
    /// 에러 설명
    pub message: String,
    /// 응답 본문
    pub body: Option<String>,
}

impl RequestFailure {
    /// 전송 실패.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            body: None,
        }
    }

    /// 상태 코드가 있는 실패.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        let message = server_message(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown status")
                .to_string()
        });
        Self {
            status: Some(status),
            message,
            body: Some(body),
        }
    }

    /// 401 여부.
    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(StatusCode::UNAUTHORIZED)
    }

    /// 호출자에게 돌려줄 에러.
    pub fn into_error(self) -> ClientError {
        ClientError::Request {
            status: self.status.map(|s| s.as_u16()),
            message: self.message,
        }
    }
}

/// 서버 에러 본문의 `message` 필드.
fn server_message(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
    }

    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.is_empty())
}

/// 재발급 응답.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: Option<String>,
}

fn bearer_header(token: &AccessToken) -> ClientResult<HeaderValue> {
    HeaderValue::from_str(&token.bearer())
        .map_err(|e| ClientError::Parse(format!("잘못된 토큰 형식: {}", e)))
}

/// 세션 토큰 가드.
pub struct SessionTokenGuard {
    http: Client,
    config: ApiConfig,
    base: Url,
    session: Arc<SessionContext>,
    default_headers: RwLock<HeaderMap>,
    refresh_gate: Mutex<()>,
}

impl SessionTokenGuard {
    /// 새 가드 생성.
    ///
    /// HTTP 클라이언트는 쿠키 저장소를 사용합니다 (refresh 쿠키 전달용).
    pub fn new(config: ApiConfig, session: Arc<SessionContext>) -> ClientResult<Self> {
        let base = config.base()?;

        let mut builder = Client::builder().cookie_store(true);
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let http = builder
            .build()
            .map_err(|e| ClientError::Config(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            http,
            config,
            base,
            session,
            default_headers: RwLock::new(HeaderMap::new()),
            refresh_gate: Mutex::new(()),
        })
    }

    /// 공유 세션 컨텍스트.
    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// API 설정.
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// 가드와 쿠키 저장소를 공유하는 HTTP 클라이언트.
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// 기본 URL 기준 절대 URL.
    pub fn url(&self, path: &str) -> ClientResult<Url> {
        Ok(self.base.join(path)?)
    }

    /// 기본 `Authorization` 헤더 값.
    pub fn default_authorization(&self) -> Option<String> {
        let headers = self.default_headers.read().unwrap_or_else(|e| e.into_inner());
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// 이후 모든 요청의 기본 `Authorization` 헤더 설정.
    pub fn set_default_authorization(&self, token: &AccessToken) -> ClientResult<()> {
        let value = bearer_header(token)?;
        let mut headers = self.default_headers.write().unwrap_or_else(|e| e.into_inner());
        headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    /// 기본 `Authorization` 헤더 제거.
    pub fn clear_default_authorization(&self) {
        let mut headers = self.default_headers.write().unwrap_or_else(|e| e.into_inner());
        headers.remove(AUTHORIZATION);
    }

    /// 저장된 토큰이 있으면 요청에 붙입니다. 없으면 요청을 건드리지 않습니다.
    pub fn attach_credential(&self, request: &mut ApiRequest) {
        let Some(token) = self.session.access_token() else {
            return;
        };
        if let Err(e) = request.set_authorization(&token) {
            warn!("토큰을 헤더로 설정할 수 없습니다: {}", e);
        }
    }

    /// 성공 응답 통과.
    pub fn handle_response(&self, response: ApiResponse) -> ApiResponse {
        response
    }

    /// 실패 응답 처리.
    ///
    /// 401이고 아직 재시도하지 않은 요청만 재발급 후 한 번 재전송합니다.
    pub async fn handle_failure(
        &self,
        mut attempt: RequestAttempt,
        failure: RequestFailure,
    ) -> ClientResult<ApiResponse> {
        if !failure.is_unauthorized() || !attempt.can_retry() {
            debug!(
                path = %attempt.request.path,
                status = ?failure.status,
                retries = attempt.retries,
                "요청 실패 전파"
            );
            return Err(failure.into_error());
        }

        warn!(path = %attempt.request.path, "401 수신, 토큰 재발급 시도");
        attempt.retries += 1;
        let stale = attempt.request.credential();
        let token = self.refresh_for(stale).await?;

        attempt.request.set_authorization(&token)?;
        debug!(path = %attempt.request.path, "토큰 재발급 후 재전송");

        match self.dispatch(&attempt.request).await {
            Ok(response) => Ok(self.handle_response(response)),
            // 재시도 요청은 다시 재발급하지 않는다
            Err(failure) => Err(failure.into_error()),
        }
    }

    /// 가드를 거쳐 요청을 보냅니다.
    pub async fn send(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        let mut attempt = RequestAttempt::new(request);
        self.attach_credential(&mut attempt.request);

        match self.dispatch(&attempt.request).await {
            Ok(response) => Ok(self.handle_response(response)),
            Err(failure) => self.handle_failure(attempt, failure).await,
        }
    }

    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, RequestFailure> {
        let mut url = self
            .url(&request.path)
            .map_err(|e| RequestFailure::transport(e.to_string()))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }

        let mut headers = self
            .default_headers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for (name, value) in request.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RequestFailure::transport(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| RequestFailure::transport(e.to_string()))?;

        if !status.is_success() {
            debug!("{} {} failed: {}", request.method, request.path, status);
            return Err(RequestFailure::from_status(status, body));
        }

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    async fn refresh_for(&self, stale: Option<AccessToken>) -> ClientResult<AccessToken> {
        match self.config.refresh_policy {
            RefreshPolicy::PerRequest => self.refresh().await,
            RefreshPolicy::SingleFlight => {
                let _gate = self.refresh_gate.lock().await;

                match (self.session.access_token(), stale) {
                    (Some(current), Some(stale)) if current != stale => {
                        debug!("다른 요청이 이미 토큰을 재발급함");
                        Ok(current)
                    }
                    (Some(current), None) => Ok(current),
                    (None, Some(_))
                        if matches!(
                            self.session.status(),
                            SessionStatus::LoginRequired { .. }
                        ) =>
                    {
                        Err(ClientError::Reauthentication(
                            "이전 토큰 재발급이 실패했습니다".to_string(),
                        ))
                    }
                    _ => self.refresh().await,
                }
            }
        }
    }

    /// refresh 쿠키로 새 접근 토큰을 발급받습니다.
    async fn refresh(&self) -> ClientResult<AccessToken> {
        info!("접근 토큰 재발급 요청");

        match self.request_refresh().await {
            Ok(token) => {
                self.session.set_access_token(&token)?;
                self.set_default_authorization(&token)?;
                info!("접근 토큰 재발급 완료");
                Ok(token)
            }
            Err(reason) => {
                error!("토큰 재발급 실패: {}", reason);
                self.clear_default_authorization();
                self.session.invalidate();
                Err(ClientError::Reauthentication(reason))
            }
        }
    }

    async fn request_refresh(&self) -> Result<AccessToken, String> {
        let url = self.url(&self.config.refresh_path).map_err(|e| e.to_string())?;

        let response = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let body = response.text().await.map_err(|e| e.to_string())?;

        if !status.is_success() {
            return Err(format!("{} - {}", status, body));
        }

        let parsed: RefreshResponse = serde_json::from_str(&body)
            .map_err(|e| format!("재발급 응답 파싱 실패: {}", e))?;

        parsed
            .access_token
            .filter(|t| !t.is_empty())
            .map(AccessToken::new)
            .ok_or_else(|| "재발급 응답에 accessToken이 없습니다".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryTokenStore;

    fn guard_with(token: Option<&str>) -> SessionTokenGuard {
        let store = match token {
            Some(t) => MemoryTokenStore::with_token(t),
            None => MemoryTokenStore::new(),
        };
        let session = Arc::new(SessionContext::new(Arc::new(store), "http://localhost/login"));
        SessionTokenGuard::new(ApiConfig::default(), session).unwrap()
    }

    #[test]
    fn test_attach_credential_with_token() {
        let guard = guard_with(Some("abc"));
        let mut request = ApiRequest::get("/companies/info");
        guard.attach_credential(&mut request);

        assert_eq!(
            request.headers.get(AUTHORIZATION).unwrap().to_str().unwrap(),
            "Bearer abc"
        );
        assert_eq!(request.credential().unwrap().expose(), "abc");
    }

    #[test]
    fn test_attach_credential_without_token_leaves_request() {
        let guard = guard_with(None);
        let mut request = ApiRequest::get("/companies/info");
        guard.attach_credential(&mut request);

        assert!(request.headers.is_empty());
    }

    #[test]
    fn test_failure_message_prefers_server_message() {
        let failure = RequestFailure::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"message":"잔액이 부족합니다"}"#.to_string(),
        );
        let err = failure.into_error();
        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().contains("잔액이 부족합니다"));

        let failure = RequestFailure::from_status(StatusCode::NOT_FOUND, "nope".to_string());
        assert_eq!(failure.message, "Not Found");
    }

    #[test]
    fn test_attempt_retry_limit() {
        let mut attempt = RequestAttempt::new(ApiRequest::get("/x"));
        assert!(attempt.can_retry());
        attempt.retries += 1;
        assert!(!attempt.can_retry());
    }

    #[tokio::test]
    async fn test_non_401_failure_is_propagated_without_refresh() {
        let guard = guard_with(Some("abc"));
        let attempt = RequestAttempt::new(ApiRequest::get("/x"));
        let failure = RequestFailure::from_status(StatusCode::FORBIDDEN, String::new());

        let err = guard.handle_failure(attempt, failure).await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(guard.session().access_token().unwrap().expose(), "abc");
    }

    #[tokio::test]
    async fn test_retried_401_is_propagated() {
        let guard = guard_with(Some("abc"));
        let mut attempt = RequestAttempt::new(ApiRequest::get("/x"));
        attempt.retries = 1;
        let failure = RequestFailure::from_status(StatusCode::UNAUTHORIZED, String::new());

        let err = guard.handle_failure(attempt, failure).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
    }
}
