//! 스냅샷 비교 → 시장가 주문 → 거래 로그 기록 파이프라인.
//!
//! # 한 번의 리밸런싱 패스
//!
//! 1. 기준 스냅샷 로드 — 없으면 첫 실행: 현재 스냅샷을 기준으로 저장하고
//!    주문 없이 종료 (빈 기준과 비교하면 전체 보유분을 매수해버림)
//! 2. 기준과 현재의 변동 계산 ([`folio_core::diff`])
//! 3. 변동마다 시장가 주문 1건 — 개별 실패는 다음 변동을 막지 않음
//! 4. 시도 1건이 끝나는 즉시 로그 항목 1개를 거래 로그 문서에 영속 —
//!    다음 변동 처리 전에 기록되므로 패스가 중간에 중단되어도
//!    이미 거래소에 도달한 주문의 기록은 남음
//! 5. 현재 스냅샷을 새 기준으로 저장
//!
//! 기준은 주문 성공 여부와 무관하게 항상 전진합니다. 실패한 주문을
//! 다음 패스에서 같은 변동으로 재시도하면 이중 체결 위험이 있기 때문에,
//! 실패는 로그로 보고하고 운영자 판단에 맡깁니다.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use folio_core::domain::holdings::{diff, ChangeRecord, HoldingsSnapshot, TradeAction};
use folio_core::domain::trade_log::{TradeLogDocument, TradeLogEntry, TradeStatus};
use folio_core::store::{DocumentStore, StoreError};
use folio_exchange::{BitgetClient, MarginMode, Side};

/// 기준 스냅샷 문서 키.
pub const BASELINE_DOC_KEY: &str = "assets_history";

/// 거래 로그 문서 키.
pub const TRADE_LOG_DOC_KEY: &str = "trading_log";

/// 리밸런싱 파이프라인 에러.
///
/// 개별 주문 실패는 에러가 아니라 로그 항목으로 기록됩니다.
/// 여기 담기는 것은 파이프라인 자체를 멈추는 영속화 실패뿐입니다.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// 문서 스토어 읽기/쓰기 실패
    #[error(transparent)]
    Store(#[from] StoreError),

    /// 문서 직렬화/역직렬화 실패
    #[error("문서 변환 실패: {0}")]
    Codec(String),
}

/// 리밸런싱 패스 결과 요약.
#[derive(Debug)]
pub struct ReconcileReport {
    /// 기준 스냅샷이 없어 주문 없이 기준만 저장한 경우
    pub first_run: bool,
    /// 감지된 변동 (코인 이름 오름차순)
    pub changes: Vec<ChangeRecord>,
    /// 변동마다 1개씩 생성된 로그 항목
    pub entries: Vec<TradeLogEntry>,
}

impl ReconcileReport {
    fn empty(first_run: bool) -> Self {
        Self {
            first_run,
            changes: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// 성공한 주문 수.
    pub fn succeeded(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == TradeStatus::Success)
            .count()
    }

    /// 실패한 주문 수.
    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }
}

/// 포트폴리오 리밸런싱 실행기.
pub struct PortfolioReconciler {
    client: Arc<BitgetClient>,
    store: Arc<dyn DocumentStore>,
    margin_mode: MarginMode,
    leverage: String,
}

impl PortfolioReconciler {
    /// 교차 마진, 레버리지 1배 기본값으로 생성.
    pub fn new(client: Arc<BitgetClient>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            client,
            store,
            margin_mode: MarginMode::Crossed,
            leverage: "1".to_string(),
        }
    }

    /// 마진 모드 변경.
    pub fn with_margin_mode(mut self, margin_mode: MarginMode) -> Self {
        self.margin_mode = margin_mode;
        self
    }

    /// 레버리지 변경.
    pub fn with_leverage(mut self, leverage: impl Into<String>) -> Self {
        self.leverage = leverage.into();
        self
    }

    /// 현재 스냅샷에 대한 리밸런싱 패스 1회 실행.
    ///
    /// # Errors
    ///
    /// 기준/로그 문서의 읽기·쓰기 실패만 에러입니다.
    /// 주문 실패(네트워크, API 거부, 심볼 미해석)는 로그 항목으로 기록되고
    /// 패스는 계속 진행됩니다.
    pub async fn reconcile(
        &self,
        current: &HoldingsSnapshot,
    ) -> Result<ReconcileReport, ReconcileError> {
        let Some(baseline) = self.load_baseline()? else {
            info!("기준 스냅샷 없음, 현재 보유분을 기준으로 저장 (주문 없음)");
            self.persist_baseline(current)?;
            return Ok(ReconcileReport::empty(true));
        };

        let changes = diff(&baseline, current);
        if changes.is_empty() {
            info!("변동 없음");
            // 노이즈 수준 차이는 기준에 흡수
            self.persist_baseline(current)?;
            return Ok(ReconcileReport::empty(false));
        }
        info!(changes = changes.len(), "변동 감지, 주문 전송 시작");

        if !self.client.directory().is_loaded().await {
            self.client.directory().load_or_refresh().await;
        }

        let mut entries = Vec::with_capacity(changes.len());
        for change in &changes {
            let entry = self.execute_change(change).await;
            // 다음 변동을 처리하기 전에 이번 시도를 즉시 영속
            self.append_log(std::slice::from_ref(&entry))?;
            entries.push(entry);
        }

        self.persist_baseline(current)?;

        let report = ReconcileReport {
            first_run: false,
            changes,
            entries,
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "리밸런싱 패스 완료"
        );
        Ok(report)
    }

    /// 변동 1건을 시장가 주문으로 전송하고 로그 항목으로 변환.
    async fn execute_change(&self, change: &ChangeRecord) -> TradeLogEntry {
        let entry = TradeLogEntry::from_change(change, Utc::now());
        let side = match change.action {
            TradeAction::Buy => Side::Buy,
            TradeAction::Sell => Side::Sell,
        };
        info!(coin = %change.coin, action = %change.action, size = %change.size, "주문 시도");

        match self
            .client
            .place_market_order(&change.coin, side, change.size, self.margin_mode, &self.leverage)
            .await
        {
            Ok(response) => {
                let success = response.is_success();
                if success {
                    info!(coin = %change.coin, "주문 성공");
                } else {
                    warn!(
                        coin = %change.coin,
                        code = %response.envelope.code,
                        msg = %response.envelope.msg,
                        "주문 거부됨"
                    );
                }
                entry.with_response(response.to_value(), success)
            }
            Err(e) => {
                warn!(coin = %change.coin, error = %e, "주문 전송 실패");
                entry.with_error(e.to_string())
            }
        }
    }

    /// 거래 로그 문서 로드. 없으면 빈 문서.
    ///
    /// # Errors
    ///
    /// 스토어 읽기 실패 또는 문서 스키마 불일치.
    pub fn load_trade_log(&self) -> Result<TradeLogDocument, ReconcileError> {
        match self.store.get(TRADE_LOG_DOC_KEY)? {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| ReconcileError::Codec(format!("거래 로그 해석 실패: {e}"))),
            None => Ok(TradeLogDocument::new(Utc::now())),
        }
    }

    fn append_log(&self, entries: &[TradeLogEntry]) -> Result<(), ReconcileError> {
        // 손상된 로그가 주문 기록을 막아서는 안 됨 — 새 문서로 강등
        let mut doc = match self.load_trade_log() {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "거래 로그 손상, 새 문서로 대체");
                TradeLogDocument::new(Utc::now())
            }
        };
        for entry in entries {
            doc.append(entry.clone());
        }
        let value = serde_json::to_value(&doc)
            .map_err(|e| ReconcileError::Codec(format!("거래 로그 직렬화 실패: {e}")))?;
        self.store.put(TRADE_LOG_DOC_KEY, &value)?;
        Ok(())
    }

    fn load_baseline(&self) -> Result<Option<HoldingsSnapshot>, ReconcileError> {
        match self.store.get(BASELINE_DOC_KEY)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| ReconcileError::Codec(format!("기준 스냅샷 해석 실패: {e}"))),
            None => Ok(None),
        }
    }

    fn persist_baseline(&self, snapshot: &HoldingsSnapshot) -> Result<(), ReconcileError> {
        let value = serde_json::to_value(snapshot)
            .map_err(|e| ReconcileError::Codec(format!("기준 스냅샷 직렬화 실패: {e}")))?;
        self.store.put(BASELINE_DOC_KEY, &value)?;
        Ok(())
    }
}

impl std::fmt::Debug for PortfolioReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioReconciler")
            .field("margin_mode", &self.margin_mode)
            .field("leverage", &self.leverage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::domain::holdings::HoldingEntry;
    use folio_core::store::MemoryStore;
    use folio_exchange::{BitgetConfig, ContractDirectory};
    use mockito::Matcher;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn snapshot(entries: &[(&str, Decimal)]) -> HoldingsSnapshot {
        HoldingsSnapshot::new(
            entries
                .iter()
                .map(|(name, qty)| HoldingEntry::new(*name, *qty))
                .collect(),
        )
    }

    fn reconciler(base_url: &str, store: Arc<MemoryStore>) -> PortfolioReconciler {
        let directory = Arc::new(ContractDirectory::new(
            base_url,
            "USDT-FUTURES",
            store.clone(),
        ));
        let config = BitgetConfig::new("key", "secret", "pass", false).with_base_url(base_url);
        let client = Arc::new(BitgetClient::new(config, directory));
        PortfolioReconciler::new(client, store)
    }

    fn seed_baseline(store: &MemoryStore, snapshot: &HoldingsSnapshot) {
        store
            .put(BASELINE_DOC_KEY, &serde_json::to_value(snapshot).unwrap())
            .unwrap();
    }

    fn order_success_body() -> String {
        json!({"code": "00000", "msg": "success", "data": {"orderId": "1"}}).to_string()
    }

    #[tokio::test]
    async fn first_run_seeds_baseline_without_orders() {
        let store = Arc::new(MemoryStore::new());
        // 도달 불가 주소 — 주문이 전송되면 테스트가 실패했을 것
        let reconciler = reconciler("http://127.0.0.1:1", store.clone());
        let current = snapshot(&[("BTC", dec!(1.0)), ("ETH", dec!(2.0))]);

        let report = reconciler.reconcile(&current).await.unwrap();

        assert!(report.first_run);
        assert!(report.entries.is_empty());
        assert_eq!(
            store.get(BASELINE_DOC_KEY).unwrap(),
            Some(serde_json::to_value(&current).unwrap())
        );
        // 주문이 없었으므로 로그 문서도 생기지 않음
        assert!(store.get(TRADE_LOG_DOC_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn no_changes_advances_baseline_quietly() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = reconciler("http://127.0.0.1:1", store.clone());
        let current = snapshot(&[("BTC", dec!(1.0))]);
        seed_baseline(&store, &current);

        let report = reconciler.reconcile(&current).await.unwrap();

        assert!(!report.first_run);
        assert!(report.changes.is_empty());
        assert!(store.get(TRADE_LOG_DOC_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn detected_changes_place_orders_and_log() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/mix/market/contracts")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"code": "00000", "msg": "success", "data": []}).to_string())
            .create_async()
            .await;
        let order_mock = server
            .mock("POST", "/api/v2/mix/order/place-order")
            .with_status(200)
            .with_body(order_success_body())
            .expect(2)
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::new());
        let reconciler = reconciler(&server.url(), store.clone());
        seed_baseline(&store, &snapshot(&[("BTC", dec!(1.0)), ("ETH", dec!(3.0))]));
        let current = snapshot(&[("BTC", dec!(1.5)), ("ETH", dec!(2.0))]);

        let report = reconciler.reconcile(&current).await.unwrap();

        assert_eq!(report.changes.len(), 2);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 0);
        order_mock.assert_async().await;

        // 로그 문서에 시도 1건당 항목 1개
        let log: TradeLogDocument =
            serde_json::from_value(store.get(TRADE_LOG_DOC_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(log.entries.len(), 2);
        assert_eq!(log.entries[0].coin, "BTC");
        assert_eq!(log.entries[0].status, TradeStatus::Success);
        assert!(log.entries[0].exchange_response.is_some());
        assert_eq!(log.entries[1].coin, "ETH");
        assert_eq!(log.entries[1].action, TradeAction::Sell);

        // 기준 전진
        assert_eq!(
            store.get(BASELINE_DOC_KEY).unwrap(),
            Some(serde_json::to_value(&current).unwrap())
        );
    }

    #[tokio::test]
    async fn partial_failure_logs_both_and_advances_baseline() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v2/mix/order/place-order")
            .with_status(200)
            .with_body(order_success_body())
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::new());
        let reconciler = reconciler(&server.url(), store.clone());
        // BTC는 별칭으로 해석됨, ZZZQ는 어느 단계에서도 해석 불가
        seed_baseline(&store, &snapshot(&[("BTC", dec!(1.0))]));
        let current = snapshot(&[("BTC", dec!(1.5)), ("ZZZQ", dec!(10))]);

        let report = reconciler.reconcile(&current).await.unwrap();

        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);

        let log: TradeLogDocument =
            serde_json::from_value(store.get(TRADE_LOG_DOC_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(log.entries[0].coin, "BTC");
        assert_eq!(log.entries[0].status, TradeStatus::Success);
        assert_eq!(log.entries[1].coin, "ZZZQ");
        assert_eq!(log.entries[1].status, TradeStatus::Failed);
        assert!(log.entries[1].error.is_some());

        // 실패가 있어도 기준은 전진 (이중 체결 방지)
        assert_eq!(
            store.get(BASELINE_DOC_KEY).unwrap(),
            Some(serde_json::to_value(&current).unwrap())
        );
    }

    /// 문서 키별 put 횟수를 세는 스토어 (영속 시점 검증용).
    struct CountingStore {
        inner: MemoryStore,
        log_writes: std::sync::atomic::AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                log_writes: std::sync::atomic::AtomicUsize::new(0),
            }
        }

        fn log_writes(&self) -> usize {
            self.log_writes.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    impl folio_core::store::DocumentStore for CountingStore {
        fn get(&self, key: &str) -> Result<Option<serde_json::Value>, folio_core::store::StoreError> {
            self.inner.get(key)
        }

        fn put(
            &self,
            key: &str,
            document: &serde_json::Value,
        ) -> Result<(), folio_core::store::StoreError> {
            if key == TRADE_LOG_DOC_KEY {
                self.log_writes
                    .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
            self.inner.put(key, document)
        }
    }

    #[tokio::test]
    async fn each_attempt_is_persisted_before_the_next_record() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v2/mix/order/place-order")
            .with_status(200)
            .with_body(order_success_body())
            .expect(2)
            .create_async()
            .await;

        let store = Arc::new(CountingStore::new());
        let directory = Arc::new(ContractDirectory::new(
            server.url(),
            "USDT-FUTURES",
            store.clone(),
        ));
        let config =
            BitgetConfig::new("key", "secret", "pass", false).with_base_url(server.url());
        let client = Arc::new(BitgetClient::new(config, directory));
        let reconciler = PortfolioReconciler::new(client, store.clone());

        store
            .put(
                BASELINE_DOC_KEY,
                &serde_json::to_value(snapshot(&[("BTC", dec!(1.0)), ("ETH", dec!(3.0))]))
                    .unwrap(),
            )
            .unwrap();
        let current = snapshot(&[("BTC", dec!(1.5)), ("ETH", dec!(2.0))]);

        let report = reconciler.reconcile(&current).await.unwrap();

        // 시도 1건이 끝날 때마다 로그 문서가 다시 쓰여야 함 (일괄 아님)
        assert_eq!(report.entries.len(), 2);
        assert_eq!(store.log_writes(), 2);

        let log: TradeLogDocument =
            serde_json::from_value(store.get(TRADE_LOG_DOC_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(log.entries.len(), 2);
    }

    #[tokio::test]
    async fn api_rejection_of_one_record_does_not_abort_the_batch() {
        let mut server = mockito::Server::new_async().await;
        // BTC 주문은 거래소가 거부, ETH 주문은 성공
        server
            .mock("POST", "/api/v2/mix/order/place-order")
            .match_body(Matcher::PartialJson(json!({"symbol": "BTCUSDT"})))
            .with_status(400)
            .with_body(json!({"code": "40001", "msg": "param error", "data": null}).to_string())
            .expect(1)
            .create_async()
            .await;
        server
            .mock("POST", "/api/v2/mix/order/place-order")
            .match_body(Matcher::PartialJson(json!({"symbol": "ETHUSDT"})))
            .with_status(200)
            .with_body(order_success_body())
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::new());
        let reconciler = reconciler(&server.url(), store.clone());
        seed_baseline(&store, &snapshot(&[("BTC", dec!(1.0)), ("ETH", dec!(1.0))]));
        let current = snapshot(&[("BTC", dec!(1.5)), ("ETH", dec!(2.0))]);

        let report = reconciler.reconcile(&current).await.unwrap();

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);

        let log: TradeLogDocument =
            serde_json::from_value(store.get(TRADE_LOG_DOC_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(log.entries.len(), 2);
        // 거부된 시도는 거래소 응답을 그대로 보존
        assert_eq!(log.entries[0].coin, "BTC");
        assert_eq!(log.entries[0].status, TradeStatus::Failed);
        let response = log.entries[0].exchange_response.as_ref().unwrap();
        assert_eq!(response["response"]["code"], "40001");
        assert_eq!(log.entries[1].status, TradeStatus::Success);
    }

    #[tokio::test]
    async fn log_appends_across_passes_preserving_created_at() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v2/mix/order/place-order")
            .with_status(200)
            .with_body(order_success_body())
            .expect(2)
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::new());
        let reconciler = reconciler(&server.url(), store.clone());

        seed_baseline(&store, &snapshot(&[("BTC", dec!(1.0))]));
        reconciler
            .reconcile(&snapshot(&[("BTC", dec!(2.0))]))
            .await
            .unwrap();
        let first: TradeLogDocument =
            serde_json::from_value(store.get(TRADE_LOG_DOC_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(first.entries.len(), 1);

        reconciler
            .reconcile(&snapshot(&[("BTC", dec!(3.0))]))
            .await
            .unwrap();
        let second: TradeLogDocument =
            serde_json::from_value(store.get(TRADE_LOG_DOC_KEY).unwrap().unwrap()).unwrap();

        assert_eq!(second.entries.len(), 2);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.last_updated >= first.last_updated);
    }

    #[tokio::test]
    async fn corrupt_baseline_is_a_hard_error() {
        let store = Arc::new(MemoryStore::new());
        store.put(BASELINE_DOC_KEY, &json!("garbage")).unwrap();
        let reconciler = reconciler("http://127.0.0.1:1", store.clone());

        let err = reconciler
            .reconcile(&snapshot(&[("BTC", dec!(1.0))]))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Codec(_)));
    }
}
