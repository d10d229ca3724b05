//! 기업 상세 화면 상태.
//!
//! 상세 정보와 보유 수량을 REST로 가져오고, 체결 결과 토픽을 구독합니다.
//! 체결 성공 시 상세 정보와 보유 수량을 각각 정확히 한 번 다시 조회합니다.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use simtrade_core::{ClientError, ClientResult, CompanyDetail, TradeOrder, TradeResult, TradeSide};

use crate::api::ApiClient;
use crate::live::LivePriceSynchronizer;

/// 체결 결과 알림.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeNotification {
    /// 체결 완료
    Filled,
    /// 체결 실패
    Failed {
        /// 서버 메시지
        message: Option<String>,
    },
}

impl TradeNotification {
    /// 사용자에게 보여줄 문구.
    pub fn text(&self) -> String {
        match self {
            TradeNotification::Filled => "거래 체결 완료!".to_string(),
            TradeNotification::Failed { message } => {
                format!("거래 실패: {}", message.as_deref().unwrap_or("알 수 없는 오류"))
            }
        }
    }
}

/// 체결 결과 알림 수신자.
#[async_trait]
pub trait TradeNotifier: Send + Sync {
    /// 알림을 전달합니다.
    async fn notify(&self, notification: &TradeNotification);
}

/// 체결 후 재조회 대상.
#[async_trait]
pub trait CompanyRefetch: Send + Sync {
    /// 기업 상세 재조회.
    async fn refetch_detail(&self) -> ClientResult<()>;

    /// 보유 수량 재조회.
    async fn refetch_position(&self) -> ClientResult<()>;
}

/// 체결 결과를 처리합니다.
///
/// SUCCESS는 알림 후 상세와 보유 수량을 각각 한 번씩 재조회하고,
/// FAIL은 서버 메시지로 알림만 보냅니다. 재조회 실패는 기록만 합니다.
pub async fn dispatch_trade_result(
    result: &TradeResult,
    notifier: &dyn TradeNotifier,
    refetch: &dyn CompanyRefetch,
) {
    if result.is_success() {
        notifier.notify(&TradeNotification::Filled).await;
        if let Err(e) = refetch.refetch_detail().await {
            error!("기업 상세 재조회 실패: {}", e);
        }
        if let Err(e) = refetch.refetch_position().await {
            error!("보유 수량 재조회 실패: {}", e);
        }
    } else {
        notifier
            .notify(&TradeNotification::Failed {
                message: result.message.clone(),
            })
            .await;
    }
}

/// 화면 상태.
#[derive(Debug, Clone, Default)]
pub struct CompanyViewState {
    /// 기업 상세
    pub detail: Option<CompanyDetail>,
    /// 보유 현금
    pub cash: Decimal,
    /// 보유 수량
    pub shares: i64,
}

/// 기업 상세 화면.
pub struct CompanyView {
    company_name: String,
    api: ApiClient,
    state: RwLock<CompanyViewState>,
}

impl CompanyView {
    /// 새 화면 생성.
    pub fn new(company_name: impl Into<String>, api: ApiClient) -> Self {
        Self {
            company_name: company_name.into(),
            api,
            state: RwLock::new(CompanyViewState::default()),
        }
    }

    /// 기업명.
    pub fn company_name(&self) -> &str {
        &self.company_name
    }

    /// 상세와 보유 수량을 모두 조회합니다.
    pub async fn load(&self) -> ClientResult<()> {
        self.refetch_detail().await?;
        self.refetch_position().await
    }

    /// 현재 상태 복사본.
    pub async fn state(&self) -> CompanyViewState {
        self.state.read().await.clone()
    }

    /// 주문 제출.
    ///
    /// 가격은 마지막으로 조회한 상세의 현재가를 사용합니다.
    /// 체결 결과는 체결 결과 토픽으로 따로 도착합니다.
    pub async fn submit_trade(&self, side: TradeSide, quantity: u32) -> ClientResult<TradeOrder> {
        let price = self
            .state
            .read()
            .await
            .detail
            .as_ref()
            .map(|d| d.current_price)
            .ok_or_else(|| ClientError::Parse("기업 상세를 먼저 조회해야 합니다".to_string()))?;

        let order = TradeOrder::new(&self.company_name, quantity, price);
        self.api.submit(side, &order).await?;
        info!("{} 주문 접수: {} x {}", side.display_name(), order.company_name, order.quantity);
        Ok(order)
    }

    /// 체결 결과 하나 처리.
    pub async fn handle_trade_result(&self, result: &TradeResult, notifier: &dyn TradeNotifier) {
        dispatch_trade_result(result, notifier, self).await;
    }

    /// 체결 결과 토픽 구독 시작.
    ///
    /// 반환된 핸들이 드롭되면 구독이 해제됩니다.
    pub fn watch_trade_results(
        self: &Arc<Self>,
        synchronizer: &LivePriceSynchronizer,
        notifier: Arc<dyn TradeNotifier>,
    ) -> ClientResult<TradeResultWatch> {
        let mut subscription = synchronizer.subscribe_trade_results()?;
        let view = Arc::clone(self);

        let task = tokio::spawn(async move {
            while let Some(result) = subscription.recv().await {
                debug!(status = ?result.status, "체결 결과 수신");
                view.handle_trade_result(&result, notifier.as_ref()).await;
            }
            debug!("체결 결과 구독 종료");
        });

        Ok(TradeResultWatch { task })
    }
}

#[async_trait]
impl CompanyRefetch for CompanyView {
    async fn refetch_detail(&self) -> ClientResult<()> {
        match self.api.company_detail(&self.company_name).await? {
            Some(detail) => {
                self.state.write().await.detail = Some(detail);
                Ok(())
            }
            None => {
                warn!("기업 상세가 비어 있습니다: {}", self.company_name);
                Ok(())
            }
        }
    }

    async fn refetch_position(&self) -> ClientResult<()> {
        let Some(portfolio) = self.api.portfolio().await? else {
            warn!("포트폴리오가 비어 있습니다");
            return Ok(());
        };

        let mut state = self.state.write().await;
        state.cash = portfolio.cash();
        state.shares = portfolio.quantity_of(&self.company_name);
        Ok(())
    }
}

/// 체결 결과 구독 핸들.
pub struct TradeResultWatch {
    task: JoinHandle<()>,
}

impl TradeResultWatch {
    /// 구독 중인지 확인.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for TradeResultWatch {
    fn drop(&mut self) {
        // 태스크가 구독을 소유하므로 중단하면 구독도 해제된다
        self.task.abort();
    }
}
