//! 시세 데이터 구조체.
//!
//! 서버는 시세 브로드캐스트를 두 가지 형태로 보냅니다:
//! - 레코드 배열 `[{...}, ...]`
//! - `results` 필드를 가진 봉투 `{"results": [{...}, ...]}`
//!
//! [`PriceFeedMessage::decode`]가 채널 경계에서 수신 페이로드를 알려진 형태로 분류합니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClientError, ClientResult};

/// 기업별 시세 레코드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRecord {
    /// 기업명 (종목 식별자로 사용)
    pub company_name: String,
    /// 현재가 (`null`이면 0)
    #[serde(deserialize_with = "null_as_zero")]
    pub current_price: Decimal,
    /// 등락률 (%)
    #[serde(default, deserialize_with = "null_as_zero")]
    pub change_rate: Decimal,
    /// 섹터
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    /// 서버가 추가로 보내는 필드 (스키마가 고정되지 않음)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PriceRecord {
    /// 새 시세 레코드 생성.
    pub fn new(
        company_name: impl Into<String>,
        current_price: Decimal,
        change_rate: Decimal,
    ) -> Self {
        Self {
            company_name: company_name.into(),
            current_price,
            change_rate,
            sector: None,
            extra: Map::new(),
        }
    }

    /// 섹터 설정.
    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    /// 전일 대비 변동 금액.
    ///
    /// 현재가와 등락률로 역산합니다: `price - price / (1 + rate / 100)`.
    pub fn change_value(&self) -> Decimal {
        let base = Decimal::ONE + self.change_rate / Decimal::ONE_HUNDRED;
        if base.is_zero() {
            return Decimal::ZERO;
        }
        self.current_price - self.current_price / base
    }
}

/// 명시적 `null`을 0으로 읽습니다. 한 레코드의 빈 값이 브로드캐스트 전체를 폐기하지 않도록 합니다.
fn null_as_zero<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Decimal>::deserialize(deserializer)?.unwrap_or_default())
}

/// 스냅샷 출처.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotSource {
    /// 아직 수신된 데이터 없음
    #[default]
    Empty,
    /// 실시간 브로드캐스트
    Broadcast,
    /// REST 재조회
    Refetch,
}

/// 클라이언트가 보유한 전체 시세 스냅샷.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSnapshot {
    /// 기업별 레코드 (서버가 보낸 순서 유지)
    pub records: Vec<PriceRecord>,
    /// 마지막 갱신 시각
    pub updated_at: Option<DateTime<Utc>>,
    /// 마지막 갱신 출처
    pub source: SnapshotSource,
}

impl PriceSnapshot {
    /// 새 스냅샷 생성.
    pub fn new(records: Vec<PriceRecord>, source: SnapshotSource) -> Self {
        Self {
            records,
            updated_at: Some(Utc::now()),
            source,
        }
    }

    /// 레코드 수.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 비어있는지 확인.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 기업명으로 레코드 조회.
    pub fn find(&self, company_name: &str) -> Option<&PriceRecord> {
        self.records.iter().find(|r| r.company_name == company_name)
    }
}

/// 시세 브로드캐스트 메시지 분류.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceFeedMessage {
    /// 전체 레코드 배열
    Full(Vec<PriceRecord>),
    /// `results` 봉투
    Enveloped(Vec<PriceRecord>),
    /// 알 수 없는 형태 (폐기 대상)
    Unrecognized,
}

impl PriceFeedMessage {
    /// 수신 페이로드를 분류합니다.
    ///
    /// # Errors
    /// JSON이 아니거나 레코드 형태가 맞지 않으면 `ClientError::MalformedMessage`.
    pub fn decode(body: &str) -> ClientResult<Self> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| ClientError::MalformedMessage(format!("JSON 파싱 실패: {}", e)))?;

        match value {
            Value::Array(_) => Ok(Self::Full(Self::records_from(value)?)),
            Value::Object(mut object) => match object.remove("results") {
                Some(results @ Value::Array(_)) => Ok(Self::Enveloped(Self::records_from(results)?)),
                _ => Ok(Self::Unrecognized),
            },
            _ => Ok(Self::Unrecognized),
        }
    }

    /// 스냅샷을 교체할 레코드 반환. 알 수 없는 형태면 `None`.
    pub fn into_records(self) -> Option<Vec<PriceRecord>> {
        match self {
            Self::Full(records) | Self::Enveloped(records) => Some(records),
            Self::Unrecognized => None,
        }
    }

    fn records_from(value: Value) -> ClientResult<Vec<PriceRecord>> {
        serde_json::from_value(value)
            .map_err(|e| ClientError::MalformedMessage(format!("시세 레코드 형식 오류: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decode_full_list() {
        let msg = PriceFeedMessage::decode(
            r#"[{"companyName":"A","currentPrice":100,"changeRate":1.5,"sector":"IT"}]"#,
        )
        .unwrap();

        let records = match msg {
            PriceFeedMessage::Full(records) => records,
            other => panic!("unexpected: {:?}", other),
        };
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].company_name, "A");
        assert_eq!(records[0].current_price, dec!(100));
        assert_eq!(records[0].change_rate, dec!(1.5));
        assert_eq!(records[0].sector.as_deref(), Some("IT"));
    }

    #[test]
    fn test_decode_envelope_keeps_extra_fields() {
        let msg = PriceFeedMessage::decode(
            r#"{"results":[{"companyName":"B","currentPrice":200,"changeRate":-2,"code":"B001"}]}"#,
        )
        .unwrap();

        let records = match msg {
            PriceFeedMessage::Enveloped(records) => records,
            other => panic!("unexpected: {:?}", other),
        };
        assert_eq!(records[0].change_rate, dec!(-2));
        assert_eq!(records[0].extra.get("code"), Some(&Value::from("B001")));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = PriceFeedMessage::decode("not json").unwrap_err();
        assert!(matches!(err, ClientError::MalformedMessage(_)));

        let err = PriceFeedMessage::decode(r#"[{"price":1}]"#).unwrap_err();
        assert!(matches!(err, ClientError::MalformedMessage(_)));
    }

    #[test]
    fn test_decode_null_prices_as_zero() {
        let records = PriceFeedMessage::decode(
            r#"[{"companyName":"A","currentPrice":"100","changeRate":null},
                {"companyName":"B","currentPrice":null,"changeRate":2.5}]"#,
        )
        .unwrap()
        .into_records()
        .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].current_price, dec!(100));
        assert_eq!(records[0].change_rate, Decimal::ZERO);
        assert_eq!(records[1].current_price, Decimal::ZERO);
        assert_eq!(records[1].change_rate, dec!(2.5));
    }

    #[test]
    fn test_decode_missing_price_is_still_malformed() {
        let err = PriceFeedMessage::decode(r#"[{"companyName":"A"}]"#).unwrap_err();
        assert!(matches!(err, ClientError::MalformedMessage(_)));
    }

    #[test]
    fn test_decode_unrecognized_shapes() {
        assert_eq!(
            PriceFeedMessage::decode(r#"{"status":"ok"}"#).unwrap(),
            PriceFeedMessage::Unrecognized
        );
        assert_eq!(
            PriceFeedMessage::decode(r#"{"results":null}"#).unwrap(),
            PriceFeedMessage::Unrecognized
        );
        assert_eq!(PriceFeedMessage::decode("42").unwrap(), PriceFeedMessage::Unrecognized);
        assert!(PriceFeedMessage::Unrecognized.into_records().is_none());
    }

    #[test]
    fn test_empty_results_is_a_valid_replacement() {
        let records = PriceFeedMessage::decode(r#"{"results":[]}"#)
            .unwrap()
            .into_records()
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_change_value() {
        let record = PriceRecord::new("A", dec!(110), dec!(10));
        assert_eq!(record.change_value(), dec!(10));

        let record = PriceRecord::new("B", dec!(100), dec!(-100));
        assert_eq!(record.change_value(), Decimal::ZERO);
    }

    #[test]
    fn test_snapshot_find() {
        let snapshot = PriceSnapshot::new(
            vec![
                PriceRecord::new("A", dec!(1), dec!(0)),
                PriceRecord::new("B", dec!(2), dec!(0)).with_sector("Bio"),
            ],
            SnapshotSource::Refetch,
        );
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.find("B").unwrap().current_price, dec!(2));
        assert!(snapshot.find("C").is_none());
    }
}
