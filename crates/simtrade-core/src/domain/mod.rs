//! 도메인 모델.
//!
//! - `market`: 시세 레코드, 스냅샷, 브로드캐스트 메시지 분류
//! - `trade`: 주문 및 체결 결과
//! - `account`: 포트폴리오, 랭킹, 기업 상세, 섹터 테마

pub mod account;
pub mod market;
pub mod trade;

pub use account::*;
pub use market::*;
pub use trade::*;
