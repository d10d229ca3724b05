//! 접근 토큰 저장소.
//!
//! 고정된 키 하나에 접근 토큰 하나만 보관합니다. 토큰 이력이나 다중 세션은 없습니다.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use simtrade_core::{ClientError, ClientResult};

/// Bearer 접두사.
const BEARER_PREFIX: &str = "Bearer ";

/// 불투명한 bearer 접근 토큰.
pub struct AccessToken(SecretString);

impl AccessToken {
    /// 새 접근 토큰 생성.
    pub fn new(token: impl Into<String>) -> Self {
        let token: String = token.into();
        Self(SecretString::new(token.into_boxed_str()))
    }

    /// `Authorization` 헤더 값에서 토큰 추출.
    ///
    /// `Bearer ` 접두사가 없으면 값 전체를 토큰으로 사용합니다.
    pub fn from_authorization(value: &str) -> Option<Self> {
        let token = value.strip_prefix(BEARER_PREFIX).unwrap_or(value).trim();
        if token.is_empty() {
            None
        } else {
            Some(Self::new(token))
        }
    }

    /// 토큰 원문.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// `Authorization` 헤더 값.
    pub fn bearer(&self) -> String {
        format!("{}{}", BEARER_PREFIX, self.expose())
    }
}

impl Clone for AccessToken {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl PartialEq for AccessToken {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// 토큰 저장소 인터페이스.
pub trait TokenStore: Send + Sync {
    /// 저장된 토큰 조회.
    fn load(&self) -> ClientResult<Option<AccessToken>>;

    /// 토큰 저장 (기존 값 덮어쓰기).
    fn store(&self, token: &AccessToken) -> ClientResult<()>;

    /// 토큰 삭제.
    fn clear(&self) -> ClientResult<()>;
}

/// 메모리 토큰 저장소 (테스트 및 일회성 실행용).
#[derive(Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    /// 빈 저장소 생성.
    pub fn new() -> Self {
        Self::default()
    }

    /// 토큰이 들어있는 저장소 생성.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> ClientResult<Option<AccessToken>> {
        let guard = self.token.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.as_deref().map(AccessToken::new))
    }

    fn store(&self, token: &AccessToken) -> ClientResult<()> {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(token.expose().to_string());
        Ok(())
    }

    fn clear(&self) -> ClientResult<()> {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
        Ok(())
    }
}

/// 파일 기반 키-값 토큰 저장소.
///
/// JSON 객체 파일에 고정된 키로 토큰을 보관합니다. 다른 키는 그대로 보존됩니다.
pub struct FileTokenStore {
    path: PathBuf,
    key: String,
    // 읽기-수정-쓰기 직렬화
    lock: Mutex<()>,
}

impl FileTokenStore {
    /// 새 파일 저장소 생성.
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
            lock: Mutex::new(()),
        }
    }

    /// 저장 파일 경로.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> ClientResult<Map<String, Value>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        if raw.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => Err(ClientError::Storage(format!(
                "토큰 파일 형식이 올바르지 않습니다: {}",
                self.path.display()
            ))),
        }
    }

    fn write_map(&self, map: &Map<String, Value>) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(map)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> ClientResult<Option<AccessToken>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let map = self.read_map()?;
        Ok(map
            .get(&self.key)
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(AccessToken::new))
    }

    fn store(&self, token: &AccessToken) -> ClientResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.read_map()?;
        map.insert(self.key.clone(), Value::from(token.expose()));
        self.write_map(&map)
    }

    fn clear(&self) -> ClientResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.read_map()?;
        if map.remove(&self.key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}
