//! 포트폴리오 봇 공용 도메인.
//!
//! 이 crate는 다음을 제공합니다:
//! - 보유 자산 스냅샷과 스냅샷 간 변동 계산 (`domain::holdings`)
//! - 추가 전용 거래 로그 문서 타입 (`domain::trade_log`)
//! - JSON 문서 단위 영속화 추상화 (`store`)
//!
//! 거래소 의존적인 코드는 이 crate에 두지 않습니다.
//! 거래소 연동은 `folio-exchange`, 리밸런싱 실행은 `folio-execution`을 사용하세요.

pub mod domain;
pub mod store;

// 주요 타입 재내보내기
pub use domain::holdings::{
    diff, ChangeRecord, HoldingEntry, HoldingsSnapshot, TradeAction, DUST_THRESHOLD,
};
pub use domain::trade_log::{TradeLogDocument, TradeLogEntry, TradeStatus};
pub use store::{DocumentStore, JsonFileStore, MemoryStore, StoreError};
