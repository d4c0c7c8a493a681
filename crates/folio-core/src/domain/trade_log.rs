//! 거래 로그 문서.
//!
//! 주문 시도 결과(성공/실패)를 추가 전용(append-only)으로 기록합니다.
//! 항목은 생성 후 절대 수정되지 않으며, 문서 전체가
//! read-modify-write 방식으로 저장됩니다 (`store` 모듈 참조).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::holdings::{ChangeRecord, TradeAction};

/// 주문 시도 결과 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    /// HTTP 2xx이면서 거래소 응답 코드가 성공인 경우
    Success,
    /// 그 외 모든 경우 (API 에러, 네트워크 실패, 로컬 검증 실패)
    Failed,
}

/// 단일 주문 시도 기록.
///
/// 성공/실패와 무관하게 시도 1건당 정확히 1개 생성됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeLogEntry {
    /// 기록 시각
    pub timestamp: DateTime<Utc>,
    /// 기록 시각에서 파생된 식별자 (`trade_<millis>`)
    pub trade_id: String,
    /// 코인 이름 (대문자)
    pub coin: String,
    /// 매매 방향
    pub action: TradeAction,
    /// 주문 수량
    pub size: Decimal,
    /// 변동 전 수량
    pub old_quantity: Decimal,
    /// 변동 후 수량
    pub new_quantity: Decimal,
    /// 거래소 원본 응답 (전송에 도달한 경우)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_response: Option<serde_json::Value>,
    /// 오류 설명 (전송 전 실패 또는 네트워크 실패)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 결과 상태
    pub status: TradeStatus,
}

impl TradeLogEntry {
    /// 변동 레코드로부터 기본 필드를 채운 항목 생성.
    ///
    /// `exchange_response`/`error`/`status`는 호출자가 시도 결과에 따라 채웁니다.
    pub fn from_change(change: &ChangeRecord, now: DateTime<Utc>) -> Self {
        Self {
            timestamp: now,
            trade_id: format!("trade_{}", now.timestamp_millis()),
            coin: change.coin.clone(),
            action: change.action,
            size: change.size,
            old_quantity: change.old_quantity,
            new_quantity: change.new_quantity,
            exchange_response: None,
            error: None,
            status: TradeStatus::Failed,
        }
    }

    /// 거래소 응답을 첨부하고 상태를 설정.
    pub fn with_response(mut self, response: serde_json::Value, success: bool) -> Self {
        self.exchange_response = Some(response);
        self.status = if success {
            TradeStatus::Success
        } else {
            TradeStatus::Failed
        };
        self
    }

    /// 오류 설명을 첨부 (상태는 failed 유지).
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.status = TradeStatus::Failed;
        self
    }
}

/// 거래 로그 문서 전체.
///
/// 영속 스키마: `{"createdAt", "lastUpdated", "entries": [...]}`.
///
/// # 동시성 주의
///
/// 문서 전체를 읽고-수정하고-다시 쓰는 구조이므로
/// 여러 프로세스가 같은 문서를 공유하면 갱신이 유실될 수 있습니다.
/// 단일 프로세스 사용을 전제로 합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeLogDocument {
    /// 문서 최초 생성 시각
    pub created_at: DateTime<Utc>,
    /// 마지막 항목 추가 시각
    pub last_updated: DateTime<Utc>,
    /// 시도 기록 (시간순)
    pub entries: Vec<TradeLogEntry>,
}

impl TradeLogDocument {
    /// 빈 로그 문서 생성.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            last_updated: now,
            entries: Vec::new(),
        }
    }

    /// 항목 추가 및 갱신 시각 반영.
    pub fn append(&mut self, entry: TradeLogEntry) {
        self.last_updated = entry.timestamp;
        self.entries.push(entry);
    }

    /// 최근 `limit`개 항목 (오래된 것부터).
    ///
    /// `limit == 0`이면 전체를 반환합니다.
    pub fn recent(&self, limit: usize) -> &[TradeLogEntry] {
        if limit == 0 || limit >= self.entries.len() {
            &self.entries
        } else {
            &self.entries[self.entries.len() - limit..]
        }
    }
}

impl Default for TradeLogDocument {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn change() -> ChangeRecord {
        ChangeRecord {
            coin: "BTC".to_string(),
            old_quantity: dec!(1.0),
            new_quantity: dec!(1.5),
            delta: dec!(0.5),
            action: TradeAction::Buy,
            size: dec!(0.5),
        }
    }

    #[test]
    fn entry_carries_change_fields_and_derived_id() {
        let now = Utc::now();
        let entry = TradeLogEntry::from_change(&change(), now);
        assert_eq!(entry.trade_id, format!("trade_{}", now.timestamp_millis()));
        assert_eq!(entry.coin, "BTC");
        assert_eq!(entry.size, dec!(0.5));
        assert_eq!(entry.status, TradeStatus::Failed);
    }

    #[test]
    fn append_advances_last_updated() {
        let created = Utc::now();
        let mut doc = TradeLogDocument::new(created);

        let entry = TradeLogEntry::from_change(&change(), Utc::now())
            .with_response(serde_json::json!({"code": "00000"}), true);
        let ts = entry.timestamp;
        doc.append(entry);

        assert_eq!(doc.entries.len(), 1);
        assert_eq!(doc.created_at, created);
        assert_eq!(doc.last_updated, ts);
        assert_eq!(doc.entries[0].status, TradeStatus::Success);
    }

    #[test]
    fn recent_returns_tail() {
        let mut doc = TradeLogDocument::new(Utc::now());
        for _ in 0..5 {
            doc.append(TradeLogEntry::from_change(&change(), Utc::now()));
        }
        assert_eq!(doc.recent(2).len(), 2);
        assert_eq!(doc.recent(0).len(), 5);
        assert_eq!(doc.recent(10).len(), 5);
    }

    #[test]
    fn document_round_trips_with_camel_case_schema() {
        let mut doc = TradeLogDocument::new(Utc::now());
        doc.append(TradeLogEntry::from_change(&change(), Utc::now()).with_error("timeout"));

        let value = serde_json::to_value(&doc).unwrap();
        assert!(value.get("createdAt").is_some());
        assert!(value.get("lastUpdated").is_some());
        assert_eq!(value["entries"][0]["oldQuantity"], serde_json::json!(1.0));

        let parsed: TradeLogDocument = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].error.as_deref(), Some("timeout"));
    }
}
