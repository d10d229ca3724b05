//! 클라이언트 에러 타입.
//!
//! 세션 가드, 실시간 동기화, 도메인 API 호출 전반에서 사용되는 에러를 정의합니다.

use thiserror::Error;

/// 클라이언트 에러.
#[derive(Debug, Error)]
pub enum ClientError {
    /// 요청 실패 (401이 아닌 실패, 또는 이미 재시도된 요청의 401)
    #[error("요청 실패 ({}): {message}", display_status(.status))]
    Request {
        /// HTTP 상태 코드 (전송 실패 시 없음)
        status: Option<u16>,
        /// 서버 메시지 또는 전송 에러 설명
        message: String,
    },

    /// 토큰 재발급 실패 (토큰 삭제 및 로그인 화면 이동)
    #[error("재인증 필요: {0}")]
    Reauthentication(String),

    /// 파싱할 수 없는 실시간 메시지
    #[error("잘못된 메시지: {0}")]
    MalformedMessage(String),

    /// STOMP 프로토콜 에러 프레임
    #[error("프로토콜 에러: {0}")]
    Protocol(String),

    /// 접근 토큰 없음
    #[error("인증되지 않음: 접근 토큰이 없습니다")]
    NotAuthenticated,

    /// 토큰 저장소 에러
    #[error("저장소 에러: {0}")]
    Storage(String),

    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 네트워크/연결 에러
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 파싱/역직렬화 에러
    #[error("파싱 에러: {0}")]
    Parse(String),
}

fn display_status(status: &Option<u16>) -> String {
    status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "no status".to_string())
}

/// 클라이언트 작업을 위한 Result 타입.
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// 상태 코드가 있는 요청 실패 생성.
    pub fn request(status: u16, message: impl Into<String>) -> Self {
        ClientError::Request {
            status: Some(status),
            message: message.into(),
        }
    }

    /// 요청 실패의 HTTP 상태 코드 반환.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Request { status, .. } => *status,
            _ => None,
        }
    }

    /// 인증 관련 에러인지 확인.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            ClientError::Reauthentication(_) | ClientError::NotAuthenticated
        ) || self.status() == Some(401)
    }

    /// 재시도 가능한 에러인지 확인.
    ///
    /// 실시간 연결 계층에서만 의미가 있습니다. 세션 가드는 401 한 번 외에는 재시도하지 않습니다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Network(_) | ClientError::Protocol(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Parse(err.to_string())
        } else {
            ClientError::Request {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Parse(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::Config(format!("잘못된 URL: {}", err))
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Storage(err.to_string())
    }
}

impl From<config::ConfigError> for ClientError {
    fn from(err: config::ConfigError) -> Self {
        ClientError::Config(err.to_string())
    }
}
