//! CLI 명령어 구현 모듈.

pub mod context;
pub mod market;
pub mod session;
pub mod trade;
