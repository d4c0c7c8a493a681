//! Bitget USDT 선물 REST 연동.
//!
//! 이 crate는 다음을 제공합니다:
//! - 요청 서명 (`sign`): canonical 메시지 + HMAC-SHA256 + base64
//! - 계약 디렉터리 (`contracts`): 심볼 → 계약 메타데이터 테이블,
//!   24시간 TTL 캐시, 퍼지 검색
//! - 심볼 해석 (`resolve`): 코인/별칭 → 거래소 심볼 다단계 폴백
//! - 서명된 주문/레버리지/마진/시세 요청 (`client`)
//!
//! # 실행 모델
//!
//! 모든 연산은 `async fn`이지만 호출자는 순차적으로 await합니다.
//! 하나의 리밸런싱 패스 안에서 주문이 동시에 전송되는 일은 없습니다.

pub mod client;
pub mod contracts;
pub mod error;
pub mod resolve;
pub mod sign;

// 주요 타입 재내보내기
pub use client::{
    parse_quantity, ApiEnvelope, BitgetClient, BitgetConfig, CloseOrderType, Force, MarginMode,
    RestResponse, Side, TickerFailure, TickerQuote, TickerResult, API_SUCCESS_CODE,
};
pub use contracts::{
    ContractCacheSnapshot, ContractDirectory, ContractInfo, CACHE_DOC_KEY, CACHE_TTL_SECS,
};
pub use error::ExchangeError;
pub use resolve::{SymbolResolver, QUOTE_SUFFIX};
pub use sign::sign;
