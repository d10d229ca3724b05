//! 모의투자 REST API 클라이언트.
//!
//! 모든 호출은 [`SessionTokenGuard`]를 거칩니다.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

use simtrade_core::{
    ClientResult, CompanyDetail, DataEnvelope, Portfolio, PriceRecord, RankingEntry, SectorTheme,
    TradeOrder, TradeSide,
};

use crate::guard::{ApiRequest, SessionTokenGuard};

/// REST API 클라이언트.
#[derive(Clone)]
pub struct ApiClient {
    guard: Arc<SessionTokenGuard>,
}

impl ApiClient {
    /// 새 API 클라이언트 생성.
    pub fn new(guard: Arc<SessionTokenGuard>) -> Self {
        Self { guard }
    }

    /// 세션 가드.
    pub fn guard(&self) -> &Arc<SessionTokenGuard> {
        &self.guard
    }

    /// 전체 기업 시세 (`GET /companies/info`).
    pub async fn companies(&self) -> ClientResult<Vec<PriceRecord>> {
        let response = self.guard.send(ApiRequest::get("/companies/info")).await?;
        let records: Vec<PriceRecord> = response.results()?.unwrap_or_default();
        debug!("기업 시세 {}건 조회", records.len());
        Ok(records)
    }

    /// 기업 상세 (`GET /companies/detail?name=`).
    pub async fn company_detail(&self, name: &str) -> ClientResult<Option<CompanyDetail>> {
        let request = ApiRequest::get("/companies/detail").query("name", name);
        self.guard.send(request).await?.results()
    }

    /// 내 포트폴리오 (`GET /user-positions/portfolio`).
    pub async fn portfolio(&self) -> ClientResult<Option<Portfolio>> {
        self.guard
            .send(ApiRequest::get("/user-positions/portfolio"))
            .await?
            .results()
    }

    /// 자산 랭킹 (`GET /user-positions/ranking`). 총자산이 0 이하인 사용자는 제외.
    pub async fn rankings(&self) -> ClientResult<Vec<RankingEntry>> {
        let entries: Vec<RankingEntry> = self
            .guard
            .send(ApiRequest::get("/user-positions/ranking"))
            .await?
            .results()?
            .unwrap_or_default();

        Ok(entries
            .into_iter()
            .filter(|e| e.total_assets > Decimal::ZERO)
            .collect())
    }

    /// 섹터 테마 (`GET /sector-themes/info`, `data` 봉투).
    pub async fn sector_themes(&self) -> ClientResult<Vec<SectorTheme>> {
        let response = self.guard.send(ApiRequest::get("/sector-themes/info")).await?;
        if response.body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let envelope: DataEnvelope<Vec<SectorTheme>> = response.json()?;
        Ok(envelope.data.unwrap_or_default())
    }

    /// 매수 주문.
    pub async fn buy(&self, order: &TradeOrder) -> ClientResult<()> {
        self.submit(TradeSide::Buy, order).await
    }

    /// 매도 주문.
    pub async fn sell(&self, order: &TradeOrder) -> ClientResult<()> {
        self.submit(TradeSide::Sell, order).await
    }

    /// 주문 제출.
    ///
    /// 체결 결과는 실시간 채널의 체결 결과 토픽으로 따로 도착합니다.
    /// 서버가 거부하면 에러 메시지에 서버의 `message`가 담깁니다.
    pub async fn submit(&self, side: TradeSide, order: &TradeOrder) -> ClientResult<()> {
        info!(
            "{} 주문: {} x {} @ {}",
            side.display_name(),
            order.company_name,
            order.quantity,
            order.price
        );

        let request = ApiRequest::post(side.path()).json(serde_json::to_value(order)?);
        self.guard.send(request).await?;
        Ok(())
    }
}
