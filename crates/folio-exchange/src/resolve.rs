//! 심볼 해석.
//!
//! 사용자 입력(코인 이름 또는 심볼)을 거래소 canonical 심볼로 변환합니다.
//!
//! # 해석 순서 (먼저 일치하는 단계가 이김)
//!
//! 1. 계약 디렉터리 완전 일치 (입력은 trim + 대문자 정규화)
//! 2. 레거시 별칭 테이블 (구버전 설정 호환용 정적 매핑)
//! 3. 입력이 호가 통화 접미사로 끝나면 이미 완성된 심볼로 간주 — 디렉터리
//!    검증 없이도 그대로 통과 (관대한 폴백)
//! 4. 디렉터리 퍼지 검색 상위 1건
//! 5. `입력 + 접미사`가 디렉터리에 존재하면 채택
//! 6. 실패: `UnresolvedSymbol`
//!
//! 이 다단계 폴백 덕분에 네트워크 조회 전(별칭 경로)에도,
//! 조회 후(실시간 계약 데이터)에도 동작합니다. 엄격한 검증이 필요한
//! 호출자는 3단계의 관대한 경로에 도달하기 전에 디렉터리 로드를 보장해야 합니다.

use std::sync::Arc;

use tracing::debug;

use crate::contracts::ContractDirectory;
use crate::error::ExchangeError;

/// 호가 통화 접미사.
pub const QUOTE_SUFFIX: &str = "USDT";

/// 레거시 별칭 테이블.
///
/// 계약 디렉터리가 비어 있어도 동작해야 하는 주요 코인 매핑.
const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("BTC", "BTCUSDT"),
    ("ETH", "ETHUSDT"),
    ("BNB", "BNBUSDT"),
    ("ADA", "ADAUSDT"),
    ("SOL", "SOLUSDT"),
    ("DOGE", "DOGEUSDT"),
    ("XRP", "XRPUSDT"),
    ("LTC", "LTCUSDT"),
    ("DOT", "DOTUSDT"),
    ("MATIC", "MATICUSDT"),
    ("LINK", "LINKUSDT"),
];

/// 코인/별칭 → canonical 심볼 변환기.
#[derive(Debug, Clone)]
pub struct SymbolResolver {
    directory: Arc<ContractDirectory>,
}

impl SymbolResolver {
    /// 디렉터리를 공유하는 해석기 생성.
    pub fn new(directory: Arc<ContractDirectory>) -> Self {
        Self { directory }
    }

    /// 별칭 테이블의 키 목록 (진단용).
    pub fn alias_keys() -> Vec<String> {
        LEGACY_ALIASES
            .iter()
            .map(|(key, _)| (*key).to_string())
            .collect()
    }

    /// 입력을 canonical 심볼로 해석.
    ///
    /// # Errors
    ///
    /// 모든 단계가 실패하면 `ExchangeError::UnresolvedSymbol`.
    /// 에러에는 시도한 입력과 알려진 별칭 키 목록이 담깁니다.
    pub async fn resolve(&self, coin_or_symbol: &str) -> Result<String, ExchangeError> {
        let input = coin_or_symbol.trim().to_uppercase();
        if input.is_empty() {
            return Err(self.unresolved(input));
        }

        // 1. 디렉터리 완전 일치
        if self.directory.get(&input).await.is_some() {
            return Ok(input);
        }

        // 2. 레거시 별칭
        if let Some((_, symbol)) = LEGACY_ALIASES.iter().find(|(key, _)| *key == input) {
            debug!(%input, symbol, "레거시 별칭으로 해석");
            return Ok((*symbol).to_string());
        }

        // 3. 접미사로 끝나면 완성된 심볼로 간주 (디렉터리 미검증 통과 허용)
        if input.ends_with(QUOTE_SUFFIX) {
            if !self.directory.is_loaded().await {
                debug!(%input, "디렉터리 미로드 상태에서 심볼을 검증 없이 통과");
            }
            return Ok(input);
        }

        // 4. 퍼지 검색 상위 1건
        if let Some(hit) = self.directory.search(&input, 1).await.into_iter().next() {
            debug!(%input, symbol = %hit.symbol, "퍼지 검색으로 해석");
            return Ok(hit.symbol);
        }

        // 5. 접미사를 붙여 구성한 심볼이 디렉터리에 있으면 채택
        let candidate = format!("{input}{QUOTE_SUFFIX}");
        if self.directory.get(&candidate).await.is_some() {
            return Ok(candidate);
        }

        Err(self.unresolved(input))
    }

    fn unresolved(&self, input: String) -> ExchangeError {
        ExchangeError::UnresolvedSymbol {
            input,
            known_aliases: Self::alias_keys(),
        }
    }
}
