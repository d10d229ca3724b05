//! WebSocket 위의 STOMP 클라이언트.
//!
//! - `frame`: STOMP 1.2 프레임 코덱
//! - `connection`: 연결/재연결, 구독 라우팅을 담당하는 백그라운드 엔진

mod connection;
mod frame;

pub use connection::{ConnectionState, EngineCommand, StompEngine};
pub use frame::{Command, Frame, FrameError};
