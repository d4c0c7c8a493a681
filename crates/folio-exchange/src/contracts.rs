//! 계약 디렉터리.
//!
//! USDT 마진 무기한 계약의 심볼 → 메타데이터 테이블을 소유합니다.
//! 테이블은 거래소 전체 목록 조회로 채워지며, 24시간 TTL 문서 캐시로 영속됩니다.
//!
//! # 캐시 수명
//!
//! - `load_or_refresh`: 영속 스냅샷이 24시간 미만이면 그대로 채택, 아니면 갱신.
//! - `refresh`: 전체 테이블을 원자적으로 교체 (부분 병합 없음).
//!   실패 시 기존 테이블을 유지합니다.
//! - 캐시 문서가 없거나 손상되어도 에러를 전파하지 않습니다 —
//!   강제 갱신으로 강등되고, 갱신마저 실패하면 빈 디렉터리로 남습니다.
//!   호출자는 빈 디렉터리를 허용해야 합니다 (`resolve` 모듈의 별칭 폴백 참조).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use folio_core::store::DocumentStore;

use crate::client::ApiEnvelope;
use crate::error::ExchangeError;

/// 캐시 만료 기준 (초). `now - cachedAt >= TTL`이면 만료.
pub const CACHE_TTL_SECS: i64 = 86_400;

/// 계약 캐시 문서 키.
pub const CACHE_DOC_KEY: &str = "contract_cache";

/// 계약 목록 조회 경로.
const CONTRACTS_PATH: &str = "/api/v2/mix/market/contracts";

/// 읽기 전용 엔드포인트 I/O 타임아웃.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// 캐시 스냅샷 만료 여부.
///
/// 86399초 시점은 신선, 정확히 86400초부터 만료입니다.
pub fn is_stale(cached_at_epoch_secs: i64, now_epoch_secs: i64) -> bool {
    now_epoch_secs - cached_at_epoch_secs >= CACHE_TTL_SECS
}

// =============================================================================
// 계약 메타데이터
// =============================================================================

/// 단일 무기한 계약의 메타데이터.
///
/// 조회 후 불변이며 갱신 시 테이블 전체가 통째로 교체됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractInfo {
    /// 거래소 심볼 (고유 키, 예: BTCUSDT)
    pub symbol: String,
    /// 기초 자산 (예: BTC)
    pub base_coin: String,
    /// 호가 통화 (예: USDT)
    pub quote_coin: String,
    /// 최소 주문 수량
    pub min_trade_num: Decimal,
    /// 수량 소수 자릿수
    pub volume_place: u32,
    /// 가격 소수 자릿수
    pub price_place: u32,
    /// 최소 레버리지
    pub min_lever: Decimal,
    /// 최대 레버리지
    pub max_lever: Decimal,
    /// 최소 주문 금액 (USDT)
    pub min_trade_usdt: Decimal,
    /// 최대 주문 금액 (USDT)
    pub max_trade_usdt: Decimal,
    /// 지원 마진 코인
    pub support_margin_coins: Vec<String>,
}

/// 거래소 원본 계약 응답 (모든 수치가 문자열).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContract {
    symbol: String,
    base_coin: String,
    quote_coin: String,
    #[serde(default)]
    min_trade_num: String,
    #[serde(default)]
    volume_place: String,
    #[serde(default)]
    price_place: String,
    #[serde(default)]
    min_lever: String,
    #[serde(default)]
    max_lever: String,
    #[serde(default, rename = "minTradeUSDT")]
    min_trade_usdt: String,
    #[serde(default, rename = "maxTradeUSDT")]
    max_trade_usdt: String,
    #[serde(default)]
    support_margin_coins: Vec<String>,
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, String> {
    if raw.is_empty() {
        return Ok(Decimal::ZERO);
    }
    raw.parse()
        .map_err(|e| format!("{field} 파싱 실패 ({raw:?}): {e}"))
}

fn parse_place(field: &str, raw: &str) -> Result<u32, String> {
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse()
        .map_err(|e| format!("{field} 파싱 실패 ({raw:?}): {e}"))
}

impl TryFrom<RawContract> for ContractInfo {
    type Error = String;

    fn try_from(raw: RawContract) -> Result<Self, Self::Error> {
        Ok(Self {
            symbol: raw.symbol.to_uppercase(),
            base_coin: raw.base_coin.to_uppercase(),
            quote_coin: raw.quote_coin.to_uppercase(),
            min_trade_num: parse_decimal("minTradeNum", &raw.min_trade_num)?,
            volume_place: parse_place("volumePlace", &raw.volume_place)?,
            price_place: parse_place("pricePlace", &raw.price_place)?,
            min_lever: parse_decimal("minLever", &raw.min_lever)?,
            max_lever: parse_decimal("maxLever", &raw.max_lever)?,
            min_trade_usdt: parse_decimal("minTradeUSDT", &raw.min_trade_usdt)?,
            max_trade_usdt: parse_decimal("maxTradeUSDT", &raw.max_trade_usdt)?,
            support_margin_coins: raw.support_margin_coins,
        })
    }
}

/// 영속 캐시 문서: `{"cachedAt": epoch초, "contracts": {심볼: 계약}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCacheSnapshot {
    /// 스냅샷 생성 시각 (epoch 초)
    pub cached_at: i64,
    /// 심볼 → 계약 메타데이터
    pub contracts: BTreeMap<String, ContractInfo>,
}

// =============================================================================
// ContractDirectory
// =============================================================================

#[derive(Debug, Default)]
struct DirectoryState {
    contracts: BTreeMap<String, ContractInfo>,
    loaded: bool,
    cached_at: i64,
}

/// 계약 메타데이터 테이블 + TTL 캐시 + 퍼지 검색.
///
/// 프로세스 전역 싱글턴이 아니라 호출자가 소유하는 값입니다.
/// `SymbolResolver`와 `BitgetClient`에 `Arc`로 공유됩니다.
pub struct ContractDirectory {
    http: Client,
    base_url: String,
    product_type: String,
    store: Arc<dyn DocumentStore>,
    state: RwLock<DirectoryState>,
}

impl ContractDirectory {
    /// 빈 디렉터리 생성.
    ///
    /// `load_or_refresh` 또는 `refresh`를 호출하기 전까지는 비어 있습니다.
    pub fn new(
        base_url: impl Into<String>,
        product_type: impl Into<String>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            product_type: product_type.into(),
            store,
            state: RwLock::new(DirectoryState::default()),
        }
    }

    /// 영속 캐시를 채택하거나, 만료/부재/손상 시 갱신.
    ///
    /// 어떤 경우에도 에러를 전파하지 않습니다. 갱신까지 실패하면
    /// 디렉터리는 빈 상태로 남고 실패는 로그로만 보고됩니다.
    pub async fn load_or_refresh(&self) {
        match self.load_persisted() {
            Ok(Some(snapshot)) if !is_stale(snapshot.cached_at, Utc::now().timestamp()) => {
                let count = snapshot.contracts.len();
                self.adopt(snapshot).await;
                info!(contracts = count, "영속 계약 캐시 채택");
                return;
            }
            Ok(Some(_)) => debug!("계약 캐시 만료, 갱신 수행"),
            Ok(None) => debug!("계약 캐시 없음, 갱신 수행"),
            Err(e) => warn!(error = %e, "계약 캐시 읽기 실패, 강제 갱신으로 강등"),
        }
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "계약 목록 갱신 실패, 디렉터리는 이전 상태 유지");
        }
    }

    /// 거래소에서 전체 계약 목록을 받아 테이블을 통째로 교체.
    ///
    /// 성공 시 새 스냅샷을 현재 시각으로 영속하고 loaded로 표시합니다.
    ///
    /// # Errors
    ///
    /// - `ExchangeError::Transport`: 네트워크 실패
    /// - `ExchangeError::Api`: HTTP 비성공 또는 응답 코드 실패 — 기존 테이블 유지
    /// - `ExchangeError::Parse`: 응답 본문 해석 불가
    pub async fn refresh(&self) -> Result<usize, ExchangeError> {
        let url = format!(
            "{}{}?productType={}",
            self.base_url, CONTRACTS_PATH, self.product_type
        );
        let response = self
            .http
            .get(&url)
            .timeout(READ_TIMEOUT)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        let envelope: ApiEnvelope = serde_json::from_str(&text)
            .map_err(|e| ExchangeError::Parse(format!("계약 목록 응답 해석 실패: {e}")))?;

        if !status.is_success() || !envelope.is_success() {
            return Err(ExchangeError::Api {
                code: envelope.code,
                message: envelope.msg,
            });
        }

        let raw: Vec<RawContract> = serde_json::from_value(envelope.data)
            .map_err(|e| ExchangeError::Parse(format!("계약 목록 data 해석 실패: {e}")))?;

        let mut contracts = BTreeMap::new();
        for item in raw {
            match ContractInfo::try_from(item) {
                Ok(contract) => {
                    contracts.insert(contract.symbol.clone(), contract);
                }
                Err(reason) => warn!(reason = %reason, "계약 항목 건너뜀"),
            }
        }

        let snapshot = ContractCacheSnapshot {
            cached_at: Utc::now().timestamp(),
            contracts,
        };
        if let Err(e) = self.persist(&snapshot) {
            warn!(error = %e, "계약 캐시 저장 실패 (메모리 테이블은 갱신됨)");
        }
        let count = snapshot.contracts.len();
        self.adopt(snapshot).await;
        info!(contracts = count, "계약 디렉터리 갱신 완료");
        Ok(count)
    }

    /// 퍼지 검색.
    ///
    /// 심볼/기초 자산/호가 통화에 대한 대소문자 무시 부분 일치.
    /// 랭크(낮을수록 우선): 0 심볼 완전 일치, 1 기초 자산 완전 일치,
    /// 2 심볼 접두 일치, 3 기초 자산 접두 일치, 4 기타 포함.
    /// 같은 랭크 안에서는 심볼 사전순(안정 정렬)입니다.
    /// 디렉터리가 비었거나 일치가 없으면 빈 벡터를 반환합니다.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<ContractInfo> {
        let q = query.trim().to_uppercase();
        if q.is_empty() || limit == 0 {
            return Vec::new();
        }

        let state = self.state.read().await;
        let mut hits: Vec<(u8, &ContractInfo)> = Vec::new();
        for contract in state.contracts.values() {
            let rank = if contract.symbol == q {
                0
            } else if contract.base_coin == q {
                1
            } else if contract.symbol.starts_with(&q) {
                2
            } else if contract.base_coin.starts_with(&q) {
                3
            } else if contract.symbol.contains(&q)
                || contract.base_coin.contains(&q)
                || contract.quote_coin.contains(&q)
            {
                4
            } else {
                continue;
            };
            hits.push((rank, contract));
        }
        hits.sort_by_key(|(rank, _)| *rank);
        hits.into_iter()
            .take(limit)
            .map(|(_, contract)| contract.clone())
            .collect()
    }

    /// 심볼 완전 일치 조회. 없으면 `None` (에러 아님).
    pub async fn get(&self, symbol: &str) -> Option<ContractInfo> {
        let key = symbol.trim().to_uppercase();
        self.state.read().await.contracts.get(&key).cloned()
    }

    /// 테이블이 채워졌는지 여부.
    pub async fn is_loaded(&self) -> bool {
        self.state.read().await.loaded
    }

    /// 현재 테이블 크기.
    pub async fn contract_count(&self) -> usize {
        self.state.read().await.contracts.len()
    }

    /// 스냅샷을 현재 테이블로 교체 (원자적).
    pub(crate) async fn adopt(&self, snapshot: ContractCacheSnapshot) {
        let mut state = self.state.write().await;
        state.contracts = snapshot.contracts;
        state.cached_at = snapshot.cached_at;
        state.loaded = true;
    }

    fn load_persisted(&self) -> Result<Option<ContractCacheSnapshot>, ExchangeError> {
        let value = self
            .store
            .get(CACHE_DOC_KEY)
            .map_err(|e| ExchangeError::CacheRead(e.to_string()))?;
        match value {
            None => Ok(None),
            Some(v) => serde_json::from_value(v)
                .map(Some)
                .map_err(|e| ExchangeError::CacheRead(format!("캐시 문서 해석 실패: {e}"))),
        }
    }

    fn persist(&self, snapshot: &ContractCacheSnapshot) -> Result<(), ExchangeError> {
        let value = serde_json::to_value(snapshot)
            .map_err(|e| ExchangeError::Parse(format!("캐시 직렬화 실패: {e}")))?;
        self.store
            .put(CACHE_DOC_KEY, &value)
            .map_err(|e| ExchangeError::CacheRead(e.to_string()))
    }
}

impl std::fmt::Debug for ContractDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractDirectory")
            .field("base_url", &self.base_url)
            .field("product_type", &self.product_type)
            .finish()
    }
}

/// 테스트 공용 헬퍼 (crate 내부 테스트 전용).
#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use rust_decimal_macros::dec;

    pub(crate) fn contract(symbol: &str, base: &str) -> ContractInfo {
        ContractInfo {
            symbol: symbol.to_string(),
            base_coin: base.to_string(),
            quote_coin: "USDT".to_string(),
            min_trade_num: dec!(0.001),
            volume_place: 3,
            price_place: 1,
            min_lever: dec!(1),
            max_lever: dec!(125),
            min_trade_usdt: dec!(5),
            max_trade_usdt: dec!(1000000),
            support_margin_coins: vec!["USDT".to_string()],
        }
    }

    pub(crate) fn snapshot_of(contracts: &[ContractInfo], cached_at: i64) -> ContractCacheSnapshot {
        ContractCacheSnapshot {
            cached_at,
            contracts: contracts
                .iter()
                .map(|c| (c.symbol.clone(), c.clone()))
                .collect(),
        }
    }
}
