//! 설정 관리.
//!
//! 이 모듈은 클라이언트 설정을 정의하고 관리합니다.
//! 기본값 → TOML 파일(선택) → `SIMTRADE__` 접두사 환경 변수 순서로 적용됩니다.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{ClientError, ClientResult};

/// 클라이언트 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClientConfig {
    /// REST API 설정
    #[serde(default)]
    pub api: ApiConfig,
    /// 실시간 시세 채널 설정
    #[serde(default)]
    pub live: LiveConfig,
    /// 토큰 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 토큰 재발급 정책.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// 401로 실패한 요청마다 독립적으로 재발급
    #[default]
    PerRequest,
    /// 동시에 실패한 요청들이 하나의 재발급 결과를 공유
    SingleFlight,
}

/// REST API 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API 서버 기본 URL
    pub base_url: String,
    /// 요청 타임아웃 (초). 0이면 전송 계층 기본값 사용
    pub timeout_secs: u64,
    /// 접근 토큰 재발급 경로 (refresh 쿠키 사용)
    pub refresh_path: String,
    /// Authorization 헤더로 토큰을 돌려주는 재발급 경로
    pub reissue_path: String,
    /// OAuth 로그인 진입 경로
    pub oauth_path: String,
    /// 재인증 실패 시 이동할 로그인 화면 경로
    pub login_path: String,
    /// 재발급 정책
    pub refresh_policy: RefreshPolicy,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 0,
            refresh_path: "/api/auth/refresh".to_string(),
            reissue_path: "/auth/reissue".to_string(),
            oauth_path: "/oauth2/authorization/google".to_string(),
            login_path: "/login".to_string(),
            refresh_policy: RefreshPolicy::PerRequest,
        }
    }
}

impl ApiConfig {
    /// 기본 URL 파싱.
    pub fn base(&self) -> ClientResult<Url> {
        Ok(Url::parse(&self.base_url)?)
    }

    /// 기본 URL 기준으로 경로를 결합합니다.
    pub fn url(&self, path: &str) -> ClientResult<Url> {
        Ok(self.base()?.join(path)?)
    }

    /// OAuth 로그인 진입 URL.
    pub fn oauth_url(&self) -> ClientResult<Url> {
        self.url(&self.oauth_path)
    }

    /// 로그인 화면 URL.
    pub fn login_url(&self) -> ClientResult<Url> {
        self.url(&self.login_path)
    }
}

/// 실시간 시세 채널 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LiveConfig {
    /// WebSocket 엔드포인트 (SockJS 경로의 raw WebSocket)
    pub ws_url: String,
    /// 전체 시세 브로드캐스트 토픽
    pub price_topic: String,
    /// 사용자별 체결 결과 토픽
    pub trade_result_topic: String,
    /// 재연결 대기 시간 (밀리초)
    pub reconnect_delay_ms: u64,
    /// STOMP heart-beat 간격 (밀리초). 0이면 비활성화
    pub heartbeat_ms: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8080/ws/websocket".to_string(),
            price_topic: "/topic/price-update".to_string(),
            trade_result_topic: "/user/queue/trade-result".to_string(),
            reconnect_delay_ms: 5000,
            heartbeat_ms: 10000,
        }
    }
}

impl LiveConfig {
    /// WebSocket URL 파싱.
    pub fn endpoint(&self) -> ClientResult<Url> {
        let url = Url::parse(&self.ws_url)?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(ClientError::Config(format!(
                "WebSocket URL 스킴이 올바르지 않습니다: {}",
                other
            ))),
        }
    }
}

/// 토큰 저장소 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 토큰 파일 경로
    pub token_path: PathBuf,
    /// 접근 토큰 키
    pub token_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            token_path: PathBuf::from(".simtrade/session.json"),
            token_key: "accessToken".to_string(),
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl ClientConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            // 기본값으로 시작
            .set_default("api.base_url", "http://localhost:8080")?
            .set_default("live.ws_url", "ws://localhost:8080/ws/websocket")?
            // 파일에서 로드
            .add_source(config::File::from(path.as_ref()).required(false))
            // 환경 변수로 오버라이드 (예: SIMTRADE__API__BASE_URL)
            .add_source(
                config::Environment::with_prefix("SIMTRADE")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/simtrade.toml")
    }

    /// 필수 값 검증.
    pub fn validate(&self) -> ClientResult<()> {
        self.api.base()?;
        self.live.endpoint()?;
        if self.storage.token_key.is_empty() {
            return Err(ClientError::Config("storage.token_key가 비어 있습니다".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_server_contract() {
        let config = ClientConfig::default();
        assert_eq!(config.api.refresh_path, "/api/auth/refresh");
        assert_eq!(config.live.price_topic, "/topic/price-update");
        assert_eq!(config.live.trade_result_topic, "/user/queue/trade-result");
        assert_eq!(config.live.reconnect_delay_ms, 5000);
        assert_eq!(config.storage.token_key, "accessToken");
        assert_eq!(config.api.refresh_policy, RefreshPolicy::PerRequest);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_url_helpers() {
        let api = ApiConfig::default();
        assert_eq!(
            api.oauth_url().unwrap().as_str(),
            "http://localhost:8080/oauth2/authorization/google"
        );
        assert_eq!(api.login_url().unwrap().as_str(), "http://localhost:8080/login");
    }

    #[test]
    fn test_invalid_ws_scheme() {
        let live = LiveConfig {
            ws_url: "http://localhost:8080/ws".to_string(),
            ..Default::default()
        };
        assert!(matches!(live.endpoint(), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[api]\nbase_url = \"http://sim.local:9000\"\nrefresh_policy = \"single_flight\"\n\n[live]\nreconnect_delay_ms = 250"
        )
        .unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.api.base_url, "http://sim.local:9000");
        assert_eq!(config.api.refresh_policy, RefreshPolicy::SingleFlight);
        assert_eq!(config.api.refresh_path, "/api/auth/refresh");
        assert_eq!(config.live.reconnect_delay_ms, 250);
        assert_eq!(config.live.price_topic, "/topic/price-update");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = ClientConfig::load("does/not/exist.toml").unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8080");
    }
}
