//! 거래소 연동 에러 타입.

use rust_decimal::Decimal;
use thiserror::Error;

/// 거래소 연동 에러.
///
/// # 분류
///
/// - `Transport`: HTTP 계층 도달 불가. 주문/갱신 실패로 처리하며 캐시/로그는 건드리지 않음.
/// - `Api`: HTTP는 성공했으나 거래소 응답 코드가 실패. 자동 재시도하지 않음.
/// - `UnresolvedSymbol` / `BelowMinimumSize` / `InvalidQuantity`:
///   네트워크 호출 전에 발생하는 로컬 검증 실패.
/// - `CacheRead`: 캐시 문서 손상/읽기 실패. 강제 갱신으로 강등되며 치명적이지 않음.
/// - `Parse`: 거래소 응답 본문을 해석할 수 없음.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// 네트워크/HTTP 계층 실패
    #[error("네트워크 오류: {0}")]
    Transport(String),

    /// 거래소 API 에러 (HTTP 성공, 응답 코드 실패)
    #[error("거래소 API 오류 [{code}]: {message}")]
    Api { code: String, message: String },

    /// 응답 본문 파싱 실패
    #[error("응답 파싱 실패: {0}")]
    Parse(String),

    /// 심볼 해석 실패 (디렉터리/별칭/폴백 모두 불일치)
    #[error("심볼을 해석할 수 없음: {input} (지원 별칭: {known_aliases:?})")]
    UnresolvedSymbol {
        input: String,
        known_aliases: Vec<String>,
    },

    /// 계약 최소 주문 수량 미달
    #[error("최소 주문 수량 미달 [{symbol}]: {size} < {min_trade_num}")]
    BelowMinimumSize {
        symbol: String,
        size: Decimal,
        min_trade_num: Decimal,
    },

    /// 잘못된 수량/가격 입력
    #[error("잘못된 수량 형식: {0}")]
    InvalidQuantity(String),

    /// 캐시 문서 읽기 실패 (강제 갱신으로 강등됨)
    #[error("캐시 읽기 실패: {0}")]
    CacheRead(String),
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        ExchangeError::Transport(err.to_string())
    }
}
