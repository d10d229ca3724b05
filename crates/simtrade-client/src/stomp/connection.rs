//! STOMP 연결 엔진.
//!
//! 백그라운드 태스크 하나가 WebSocket 소켓을 소유합니다. 구독 요청은 명령 채널로
//! 받고, 수신한 MESSAGE 프레임은 구독 ID별 채널로 라우팅합니다.
//!
//! 연결이 끊기면 고정 지연 후 재연결하며, 매 재연결마다 세션의 현재 토큰을
//! 다시 읽어 CONNECT 헤더에 싣습니다. 토큰이 없거나 세션이 무효화되면 종료합니다.

use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use simtrade_core::{ClientError, ClientResult};

use super::frame::{Command, Frame};
use crate::session::{AccessToken, SessionContext};

/// 연결 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// 시작 전
    #[default]
    Idle,
    /// 연결 시도 중
    Connecting,
    /// STOMP 세션 수립
    Connected,
    /// 재연결 대기
    Reconnecting,
    /// 종료됨
    Closed,
}

/// 엔진 명령.
#[derive(Debug)]
pub enum EngineCommand {
    /// 구독 등록 (연결 중이면 즉시, 아니면 다음 연결 시 전송)
    Subscribe {
        id: String,
        destination: String,
        sink: mpsc::UnboundedSender<String>,
    },
    /// 구독 해제
    Unsubscribe { id: String },
}

struct Route {
    destination: String,
    sink: mpsc::UnboundedSender<String>,
}

/// 한 번의 STOMP 세션이 끝난 이유.
enum SessionEnd {
    /// 종료 요청
    Shutdown,
    /// 세션 무효화 (로그아웃/재인증 실패)
    Invalidated,
    /// 연결 끊김
    Dropped,
}

type WsWrite = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    Message,
>;

/// STOMP 연결 엔진.
pub struct StompEngine {
    endpoint: Url,
    session: Arc<SessionContext>,
    reconnect_delay: Duration,
    heartbeat: Duration,
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    shutdown: CancellationToken,
    state: Arc<watch::Sender<ConnectionState>>,
    routes: HashMap<String, Route>,
    // 등록 순서 유지 (시세 토픽을 먼저 구독)
    order: Vec<String>,
}

impl StompEngine {
    /// 새 엔진 생성.
    pub fn new(
        endpoint: Url,
        session: Arc<SessionContext>,
        reconnect_delay: Duration,
        heartbeat: Duration,
        commands: mpsc::UnboundedReceiver<EngineCommand>,
        shutdown: CancellationToken,
        state: Arc<watch::Sender<ConnectionState>>,
    ) -> Self {
        Self {
            endpoint,
            session,
            reconnect_delay,
            heartbeat,
            commands,
            shutdown,
            state,
            routes: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// 종료될 때까지 연결을 유지합니다.
    pub async fn run(mut self) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let Some(token) = self.session.access_token() else {
                info!("접근 토큰이 없어 실시간 연결을 중단합니다");
                break;
            };

            self.state.send_replace(ConnectionState::Connecting);
            match self.run_session(&token).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Invalidated) => {
                    info!("세션이 무효화되어 실시간 연결을 종료합니다");
                    break;
                }
                Ok(SessionEnd::Dropped) => {
                    warn!("실시간 연결 끊김");
                }
                Err(e) => {
                    error!("실시간 연결 에러: {}", e);
                }
            }

            self.state.send_replace(ConnectionState::Reconnecting);
            warn!("{}ms 후 재연결 시도", self.reconnect_delay.as_millis());
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = self.shutdown.cancelled() => break,
            }
        }

        self.state.send_replace(ConnectionState::Closed);
        debug!("STOMP 엔진 종료");
    }

    async fn run_session(&mut self, token: &AccessToken) -> ClientResult<SessionEnd> {
        info!("WebSocket 연결 중: {}", self.endpoint);

        let (ws_stream, _) = tokio::select! {
            result = connect_async(self.endpoint.as_str()) => result
                .map_err(|e| ClientError::Network(format!("WebSocket 연결 실패: {}", e)))?,
            _ = self.shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
        };
        let (mut write, mut read) = ws_stream.split();

        let host = self.endpoint.host_str().unwrap_or("localhost").to_string();
        let bearer = token.bearer();
        let connect = Frame::connect(&host, Some(&bearer), self.heartbeat.as_millis() as u64);
        send_frame(&mut write, &connect).await?;

        // CONNECTED 대기
        loop {
            let msg = tokio::select! {
                msg = read.next() => msg,
                _ = self.shutdown.cancelled() => {
                    let _ = write.close().await;
                    return Ok(SessionEnd::Shutdown);
                }
            };

            match msg {
                Some(Ok(Message::Text(text))) => {
                    let frames = Frame::decode_all(&text)
                        .map_err(|e| ClientError::Protocol(e.to_string()))?;
                    let mut connected = false;
                    for frame in frames {
                        match frame.command {
                            Command::Connected => connected = true,
                            Command::Error => {
                                let message = frame.get_header("message").unwrap_or("").to_string();
                                error!("Broker Error: {}", message);
                                return Err(ClientError::Protocol(message));
                            }
                            other => debug!("CONNECTED 이전 프레임 무시: {}", other),
                        }
                    }
                    if connected {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Dropped),
                Some(Err(e)) => return Err(ClientError::Network(e.to_string())),
                Some(Ok(_)) => {}
            }
        }

        self.state.send_replace(ConnectionState::Connected);
        info!("Connected to WebSocket");

        // 등록된 구독 복원
        self.drain_pending();
        for id in &self.order {
            if let Some(route) = self.routes.get(id) {
                send_frame(&mut write, &Frame::subscribe(id, &route.destination)).await?;
                debug!("구독: {} ({})", route.destination, id);
            }
        }

        let mut status = self.session.subscribe_status();

        let heartbeat_enabled = !self.heartbeat.is_zero();
        let period = if heartbeat_enabled {
            self.heartbeat
        } else {
            Duration::from_secs(3600)
        };
        let mut heartbeat = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = send_frame(&mut write, &Frame::disconnect()).await;
                    let _ = write.close().await;
                    return Ok(SessionEnd::Shutdown);
                }
                changed = status.changed() => {
                    if changed.is_err() || !status.borrow_and_update().is_authenticated() {
                        let _ = send_frame(&mut write, &Frame::disconnect()).await;
                        let _ = write.close().await;
                        return Ok(SessionEnd::Invalidated);
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.apply_command(&mut write, command).await?,
                        None => {
                            // 소유자가 사라짐
                            let _ = send_frame(&mut write, &Frame::disconnect()).await;
                            let _ = write.close().await;
                            return Ok(SessionEnd::Shutdown);
                        }
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(&mut write, &text).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("서버에서 연결 종료 요청");
                            return Ok(SessionEnd::Dropped);
                        }
                        Some(Err(e)) => {
                            return Err(ClientError::Network(format!("WebSocket 수신 에러: {}", e)));
                        }
                        None => return Ok(SessionEnd::Dropped),
                        _ => {}
                    }
                }
                _ = heartbeat.tick(), if heartbeat_enabled => {
                    write
                        .send(Message::Text("\n".to_string()))
                        .await
                        .map_err(|e| ClientError::Network(e.to_string()))?;
                }
            }
        }
    }

    async fn apply_command(&mut self, write: &mut WsWrite, command: EngineCommand) -> ClientResult<()> {
        if let Some(frame) = self.stage(command) {
            send_frame(write, &frame).await?;
        }
        Ok(())
    }

    /// 명령을 라우팅 테이블에 반영하고 보낼 프레임을 반환합니다.
    ///
    /// 구독은 전송 전에 등록되므로 전송이 실패해도 재연결 시 복원됩니다.
    fn stage(&mut self, command: EngineCommand) -> Option<Frame> {
        match command {
            EngineCommand::Subscribe {
                id,
                destination,
                sink,
            } => {
                debug!("구독: {} ({})", destination, id);
                let frame = Frame::subscribe(&id, &destination);
                self.register(id, destination, sink);
                Some(frame)
            }
            EngineCommand::Unsubscribe { id } => {
                if self.unregister(&id) {
                    debug!("구독 해제: {}", id);
                    Some(Frame::unsubscribe(&id))
                } else {
                    None
                }
            }
        }
    }

    async fn handle_text(&mut self, write: &mut WsWrite, text: &str) -> ClientResult<()> {
        let frames = match Frame::decode_all(text) {
            Ok(frames) => frames,
            Err(e) => {
                warn!("STOMP 프레임 파싱 실패: {}", e);
                return Ok(());
            }
        };

        for frame in frames {
            match frame.command {
                Command::Message => {
                    let Some(id) = frame.get_header("subscription").map(str::to_string) else {
                        debug!("subscription 헤더 없는 MESSAGE 무시");
                        continue;
                    };
                    let delivered = match self.routes.get(&id) {
                        Some(route) => route.sink.send(frame.body).is_ok(),
                        None => {
                            debug!("알 수 없는 구독 메시지: {}", id);
                            continue;
                        }
                    };
                    if !delivered && self.unregister(&id) {
                        // 수신자가 사라진 구독은 정리
                        send_frame(write, &Frame::unsubscribe(&id)).await?;
                    }
                }
                Command::Error => {
                    // 연결은 유지한다
                    let message = frame.get_header("message").unwrap_or("");
                    error!("Broker Error: {}", message);
                }
                other => debug!("프레임 수신: {}", other),
            }
        }
        Ok(())
    }

    fn register(&mut self, id: String, destination: String, sink: mpsc::UnboundedSender<String>) {
        if !self.routes.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.routes.insert(id, Route { destination, sink });
    }

    fn unregister(&mut self, id: &str) -> bool {
        self.order.retain(|o| o != id);
        self.routes.remove(id).is_some()
    }

    /// 연결 전 큐에 쌓인 명령을 반영합니다.
    fn drain_pending(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.stage(command);
        }
    }
}

async fn send_frame(write: &mut WsWrite, frame: &Frame) -> ClientResult<()> {
    write
        .send(Message::Text(frame.encode()))
        .await
        .map_err(|e| ClientError::Network(format!("프레임 전송 실패: {}", e)))
}
