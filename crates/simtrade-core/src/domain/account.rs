//! 계좌, 랭킹, 기업 정보 응답 구조체.
//!
//! 서버 응답은 대부분 `{"results": ...}` 봉투로 감싸져 있고,
//! 섹터 테마만 `{"data": ...}` 봉투를 사용합니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `results` 봉투.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultsEnvelope<T> {
    /// 응답 본문
    pub results: Option<T>,
}

/// `data` 봉투.
#[derive(Debug, Clone, Deserialize)]
pub struct DataEnvelope<T> {
    /// 응답 본문
    pub data: Option<T>,
}

/// 사용자 요약 정보.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    /// 사용자 이름
    #[serde(default)]
    pub username: Option<String>,
    /// 보유 현금
    #[serde(default)]
    pub money: Decimal,
}

/// 보유 종목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// 기업명
    #[serde(default)]
    pub company_name: Option<String>,
    /// 기업명 (일부 응답은 `name` 사용)
    #[serde(default)]
    pub name: Option<String>,
    /// 보유 수량
    #[serde(default)]
    pub quantity: i64,
    /// 평균 매수가
    #[serde(default)]
    pub average_price: Decimal,
    /// 현재가
    #[serde(default)]
    pub current_price: Decimal,
}

impl Position {
    /// 표시용 기업명.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.company_name.as_deref())
            .unwrap_or("")
    }

    /// 이 포지션이 해당 기업의 것인지 확인.
    pub fn is_for(&self, company_name: &str) -> bool {
        self.company_name.as_deref() == Some(company_name) || self.name.as_deref() == Some(company_name)
    }

    /// 평가 손익.
    pub fn profit(&self) -> Decimal {
        (self.current_price - self.average_price) * Decimal::from(self.quantity)
    }
}

/// 포트폴리오.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    /// 사용자 정보
    #[serde(default)]
    pub user: Option<UserSummary>,
    /// 보유 종목
    #[serde(default)]
    pub positions: Vec<Position>,
}

impl Portfolio {
    /// 해당 기업의 포지션 (`companyName` 또는 `name`으로 매칭).
    pub fn position_for(&self, company_name: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.is_for(company_name))
    }

    /// 해당 기업의 보유 수량. 없으면 0.
    pub fn quantity_of(&self, company_name: &str) -> i64 {
        self.position_for(company_name)
            .map(|p| p.quantity)
            .unwrap_or(0)
    }

    /// 보유 현금.
    pub fn cash(&self) -> Decimal {
        self.user.as_ref().map(|u| u.money).unwrap_or_default()
    }

    /// 총 주식 평가액.
    pub fn stock_value(&self) -> Decimal {
        self.positions
            .iter()
            .map(|p| p.current_price * Decimal::from(p.quantity))
            .sum()
    }

    /// 총 자산 (현금 + 주식).
    pub fn total_assets(&self) -> Decimal {
        self.stock_value() + self.cash()
    }
}

/// 랭킹 항목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    /// 사용자 이름
    #[serde(default)]
    pub username: String,
    /// 총 자산
    #[serde(default)]
    pub total_assets: Decimal,
}

/// 섹터 테마.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorTheme {
    /// 테마 이름
    #[serde(default)]
    pub theme_name: Option<String>,
    /// 섹터
    #[serde(default)]
    pub sector: Option<String>,
    /// 등락률 (%)
    #[serde(default)]
    pub change_rate: Decimal,
    /// 주도주
    #[serde(default)]
    pub leading_stock: Option<String>,
}

impl SectorTheme {
    /// 표시 이름 (테마 이름 우선).
    pub fn display_name(&self) -> &str {
        self.theme_name
            .as_deref()
            .or(self.sector.as_deref())
            .unwrap_or("")
    }
}

/// 기업 리스크 지표.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskMetrics {
    /// 리스크 등급
    pub level: String,
    /// 점수 (0~100)
    pub score: u32,
    /// 변동성 등급
    pub volatility: String,
}

impl Default for RiskMetrics {
    fn default() -> Self {
        Self {
            level: "MEDIUM".to_string(),
            score: 50,
            volatility: "MEDIUM".to_string(),
        }
    }
}

/// 차트 포인트.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    /// 시각 (서버 원본 문자열)
    pub time: String,
    /// 가격
    pub price: Decimal,
}

impl ChartPoint {
    /// `HH:MM` 표시용 시각.
    pub fn short_time(&self) -> &str {
        self.time.get(11..16).unwrap_or(&self.time)
    }
}

/// 기업 상세 정보.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDetail {
    /// 기업명
    pub company_name: String,
    /// 종목 코드
    #[serde(default)]
    pub code: Option<String>,
    /// 현재가
    #[serde(default)]
    pub current_price: Decimal,
    /// 섹터
    #[serde(default)]
    pub sector: Option<String>,
    /// 총 발행 주식 수
    #[serde(default)]
    pub total_shares: u64,
    /// 기업 설명
    #[serde(default)]
    pub description: Option<String>,
    /// 리스크 지표
    #[serde(default)]
    pub risk_metrics: RiskMetrics,
    /// 가격 차트
    #[serde(default)]
    pub chart: Vec<ChartPoint>,
    /// 기타 필드
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CompanyDetail {
    /// 표시용 티커 (코드 → 섹터 대문자 → "STOCK").
    pub fn ticker(&self) -> String {
        self.code
            .clone()
            .or_else(|| self.sector.as_ref().map(|s| s.to_uppercase()))
            .unwrap_or_else(|| "STOCK".to_string())
    }

    /// 차트 시작가 대비 변동 (금액, 등락률 %).
    pub fn change_since_open(&self) -> Option<(Decimal, Decimal)> {
        let start = self.chart.first()?.price;
        if start.is_zero() {
            return None;
        }
        let change = self.current_price - start;
        Some((change, change / start * Decimal::ONE_HUNDRED))
    }
}
