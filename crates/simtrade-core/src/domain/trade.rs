//! 주문 및 체결 결과 타입.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// 매매 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl TradeSide {
    /// 주문 제출 경로.
    pub fn path(&self) -> &'static str {
        match self {
            TradeSide::Buy => "/trade/buy",
            TradeSide::Sell => "/trade/sell",
        }
    }

    /// 표시 이름.
    pub fn display_name(&self) -> &'static str {
        match self {
            TradeSide::Buy => "매수",
            TradeSide::Sell => "매도",
        }
    }
}

impl std::str::FromStr for TradeSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" | "매수" => Ok(TradeSide::Buy),
            "sell" | "매도" => Ok(TradeSide::Sell),
            _ => Err(format!("Unknown trade side: {}", s)),
        }
    }
}

/// 매수/매도 주문 요청 본문.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOrder {
    /// 기업명
    pub company_name: String,
    /// 수량 (최소 1)
    pub quantity: u32,
    /// 주문 시점의 현재가
    pub price: Decimal,
}

impl TradeOrder {
    /// 새 주문 생성. 수량이 0이면 1로 보정합니다.
    pub fn new(company_name: impl Into<String>, quantity: u32, price: Decimal) -> Self {
        Self {
            company_name: company_name.into(),
            quantity: quantity.max(1),
            price,
        }
    }

    /// 총 주문 금액.
    pub fn total_cost(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// 체결 결과 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    /// 체결 성공
    Success,
    /// 체결 실패
    Fail,
}

/// 사용자별 체결 결과 메시지.
///
/// 한 번 소비되고 캐시되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    /// 결과 상태
    pub status: TradeStatus,
    /// 서버 메시지
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TradeResult {
    /// 수신 페이로드 파싱.
    ///
    /// # Errors
    /// 알 수 없는 상태값이나 잘못된 JSON이면 `ClientError::MalformedMessage`.
    pub fn decode(body: &str) -> ClientResult<Self> {
        serde_json::from_str(body)
            .map_err(|e| ClientError::MalformedMessage(format!("체결 결과 형식 오류: {}", e)))
    }

    /// 성공 여부.
    pub fn is_success(&self) -> bool {
        self.status == TradeStatus::Success
    }
}
