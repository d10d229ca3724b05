//! # Simtrade Core
//!
//! 모의투자 클라이언트의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 클라이언트 전반에서 사용되는 기본 타입을 제공합니다:
//! - 시세 스냅샷 및 브로드캐스트 메시지 분류
//! - 체결 결과 메시지
//! - 포트폴리오, 랭킹, 기업 상세 응답 구조체
//! - 설정 관리
//! - 로깅 인프라
//! - 에러 분류 체계

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
