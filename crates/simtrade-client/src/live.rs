//! 실시간 시세 동기화.
//!
//! 접근 토큰이 있을 때만 STOMP 연결을 만들고, 전체 시세 토픽의 메시지로
//! 공유 스냅샷을 통째로 교체합니다. 스냅샷은 `watch` 채널로 배포되어
//! 새 구독자도 최신 값을 바로 받습니다.
//!
//! 연결은 소유자보다 오래 살지 않습니다. [`LiveFeedScope`]가 범위를 벗어나거나
//! 동기화기가 드롭되면 연결이 종료됩니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use simtrade_core::{
    ClientError, ClientResult, LiveConfig, PriceFeedMessage, PriceRecord, PriceSnapshot,
    SnapshotSource, TradeResult,
};

use crate::api::ApiClient;
use crate::session::{AccessToken, SessionContext};
use crate::stomp::{ConnectionState, EngineCommand, StompEngine};

/// 활성 연결 핸들.
pub struct ConnectionHandle {
    credential: AccessToken,
    commands: mpsc::UnboundedSender<EngineCommand>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    /// 연결 생성에 사용한 토큰.
    pub fn credential(&self) -> &AccessToken {
        &self.credential
    }

    /// 아직 살아있는지 확인.
    pub fn is_active(&self) -> bool {
        !self.shutdown.is_cancelled() && !self.task.is_finished()
    }

    fn deactivate(self) {
        self.shutdown.cancel();
    }
}

/// 토픽 구독.
///
/// 드롭되면 구독이 해제됩니다.
pub struct TopicSubscription {
    id: String,
    destination: String,
    receiver: mpsc::UnboundedReceiver<String>,
    commands: mpsc::UnboundedSender<EngineCommand>,
}

impl TopicSubscription {
    /// 구독 ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 구독 토픽.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// 다음 메시지 본문. 연결이 종료되면 `None`.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}

impl Drop for TopicSubscription {
    fn drop(&mut self) {
        let _ = self.commands.send(EngineCommand::Unsubscribe {
            id: self.id.clone(),
        });
    }
}

/// 체결 결과 구독.
pub struct TradeResultSubscription {
    inner: TopicSubscription,
}

impl TradeResultSubscription {
    /// 다음 체결 결과.
    ///
    /// 형식이 맞지 않는 메시지는 로그를 남기고 건너뜁니다.
    pub async fn recv(&mut self) -> Option<TradeResult> {
        while let Some(body) = self.inner.recv().await {
            match TradeResult::decode(&body) {
                Ok(result) => return Some(result),
                Err(e) => error!("체결 결과 파싱 실패: {}", e),
            }
        }
        None
    }

    /// 원시 구독.
    pub fn topic(&self) -> &TopicSubscription {
        &self.inner
    }
}

/// 시세 메시지 하나를 스냅샷에 반영합니다.
///
/// - 빈 본문: 무시 (`Ok(false)`)
/// - 배열 또는 `results` 봉투: 스냅샷 전체 교체 (`Ok(true)`)
/// - 그 외 JSON: 폐기 (`Ok(false)`)
/// - 파싱 실패: 로그를 남기고 에러 반환, 스냅샷은 그대로
pub fn apply_price_message(
    snapshot: &watch::Sender<PriceSnapshot>,
    body: &str,
) -> ClientResult<bool> {
    if body.trim().is_empty() {
        return Ok(false);
    }

    let message = PriceFeedMessage::decode(body).map_err(|e| {
        error!("WebSocket Parse Error: {}", e);
        e
    })?;

    match message.into_records() {
        Some(records) => {
            debug!("시세 스냅샷 교체: {}건", records.len());
            snapshot.send_replace(PriceSnapshot::new(records, SnapshotSource::Broadcast));
            Ok(true)
        }
        None => {
            warn!("알 수 없는 시세 메시지 형식, 폐기");
            Ok(false)
        }
    }
}

/// 실시간 시세 동기화기.
pub struct LivePriceSynchronizer {
    config: LiveConfig,
    session: Arc<SessionContext>,
    handle: Mutex<Option<ConnectionHandle>>,
    snapshot: Arc<watch::Sender<PriceSnapshot>>,
    state: Arc<watch::Sender<ConnectionState>>,
    activations: AtomicU64,
    next_subscription: AtomicU64,
}

impl LivePriceSynchronizer {
    /// 새 동기화기 생성. 연결은 `connect`로 시작합니다.
    pub fn new(config: LiveConfig, session: Arc<SessionContext>) -> Self {
        let (snapshot, _) = watch::channel(PriceSnapshot::default());
        let (state, _) = watch::channel(ConnectionState::Idle);

        Self {
            config,
            session,
            handle: Mutex::new(None),
            snapshot: Arc::new(snapshot),
            state: Arc::new(state),
            activations: AtomicU64::new(0),
            next_subscription: AtomicU64::new(0),
        }
    }

    /// 연결 시작.
    ///
    /// 이미 활성 연결이 있거나 접근 토큰이 없으면 아무것도 하지 않고 `false`를
    /// 반환합니다. tokio 런타임 안에서 호출해야 합니다.
    pub fn connect(&self) -> ClientResult<bool> {
        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = handle.as_ref() {
            if existing.is_active() {
                debug!("이미 실시간 연결이 활성화되어 있습니다");
                return Ok(false);
            }
        }

        let Some(credential) = self.session.access_token() else {
            debug!("접근 토큰이 없어 실시간 연결을 시작하지 않습니다");
            return Ok(false);
        };

        let endpoint = self.config.endpoint()?;
        if let Some(stale) = handle.take() {
            stale.deactivate();
        }

        let (commands, command_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        // 시세 토픽을 가장 먼저 등록
        let (price_tx, mut price_rx) = mpsc::unbounded_channel::<String>();
        commands
            .send(EngineCommand::Subscribe {
                id: self.next_subscription_id(),
                destination: self.config.price_topic.clone(),
                sink: price_tx,
            })
            .map_err(|_| ClientError::Network("명령 채널이 닫혔습니다".to_string()))?;

        let snapshot = Arc::clone(&self.snapshot);
        tokio::spawn(async move {
            while let Some(body) = price_rx.recv().await {
                // 실패는 apply_price_message 안에서 기록됨
                let _ = apply_price_message(&snapshot, &body);
            }
        });

        let engine = StompEngine::new(
            endpoint,
            Arc::clone(&self.session),
            Duration::from_millis(self.config.reconnect_delay_ms),
            Duration::from_millis(self.config.heartbeat_ms),
            command_rx,
            shutdown.clone(),
            Arc::clone(&self.state),
        );
        let task = tokio::spawn(engine.run());

        *handle = Some(ConnectionHandle {
            credential,
            commands,
            shutdown,
            task,
        });
        self.activations.fetch_add(1, Ordering::SeqCst);
        info!("실시간 시세 연결 시작: {}", self.config.ws_url);

        Ok(true)
    }

    /// 연결 종료.
    ///
    /// 활성 연결이 없으면 아무것도 하지 않고 `false`를 반환합니다.
    pub fn disconnect(&self) -> bool {
        let taken = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        match taken {
            Some(handle) => {
                handle.deactivate();
                info!("실시간 시세 연결 종료");
                true
            }
            None => false,
        }
    }

    /// 활성 연결 여부.
    pub fn is_active(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(ConnectionHandle::is_active)
            .unwrap_or(false)
    }

    /// 지금까지 만들어진 연결 수.
    pub fn activation_count(&self) -> u64 {
        self.activations.load(Ordering::SeqCst)
    }

    /// 현재 스냅샷.
    pub fn snapshot(&self) -> PriceSnapshot {
        self.snapshot.borrow().clone()
    }

    /// 스냅샷 구독. 구독 즉시 최신 값을 볼 수 있습니다.
    pub fn subscribe_snapshot(&self) -> watch::Receiver<PriceSnapshot> {
        self.snapshot.subscribe()
    }

    /// 연결 상태 구독.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// 스냅샷을 직접 교체합니다.
    pub fn publish_snapshot(&self, records: Vec<PriceRecord>, source: SnapshotSource) {
        self.snapshot.send_replace(PriceSnapshot::new(records, source));
    }

    /// REST로 전체 시세를 다시 받아 스냅샷을 교체합니다.
    pub async fn refresh_snapshot(&self, api: &ApiClient) -> ClientResult<usize> {
        let records = api.companies().await?;
        let count = records.len();
        self.publish_snapshot(records, SnapshotSource::Refetch);
        Ok(count)
    }

    /// 임의 토픽 구독. 활성 연결이 필요합니다.
    pub fn subscribe(&self, destination: &str) -> ClientResult<TopicSubscription> {
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        let commands = match handle.as_ref() {
            Some(h) if h.is_active() => h.commands.clone(),
            _ => {
                return Err(ClientError::Network(
                    "실시간 연결이 활성화되어 있지 않습니다".to_string(),
                ))
            }
        };

        let id = self.next_subscription_id();
        let (sink, receiver) = mpsc::unbounded_channel();
        commands
            .send(EngineCommand::Subscribe {
                id: id.clone(),
                destination: destination.to_string(),
                sink,
            })
            .map_err(|_| ClientError::Network("명령 채널이 닫혔습니다".to_string()))?;

        Ok(TopicSubscription {
            id,
            destination: destination.to_string(),
            receiver,
            commands,
        })
    }

    /// 사용자별 체결 결과 구독.
    pub fn subscribe_trade_results(&self) -> ClientResult<TradeResultSubscription> {
        let inner = self.subscribe(&self.config.trade_result_topic)?;
        Ok(TradeResultSubscription { inner })
    }

    /// 범위 기반 연결. 반환된 가드가 드롭되면 연결이 종료됩니다.
    pub fn enter_scope(self: &Arc<Self>) -> ClientResult<LiveFeedScope> {
        self.connect()?;
        Ok(LiveFeedScope {
            synchronizer: Arc::clone(self),
        })
    }

    fn next_subscription_id(&self) -> String {
        format!("sub-{}", self.next_subscription.fetch_add(1, Ordering::SeqCst))
    }
}

impl Drop for LivePriceSynchronizer {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// 실시간 연결 범위 가드.
pub struct LiveFeedScope {
    synchronizer: Arc<LivePriceSynchronizer>,
}

impl LiveFeedScope {
    /// 동기화기.
    pub fn synchronizer(&self) -> &Arc<LivePriceSynchronizer> {
        &self.synchronizer
    }
}

impl Drop for LiveFeedScope {
    fn drop(&mut self) {
        self.synchronizer.disconnect();
    }
}
