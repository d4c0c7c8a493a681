//! 도메인 타입 정의.
//!
//! 보유 자산 스냅샷, 변동 레코드, 거래 로그 등
//! 거래소 중립적인 타입들을 제공합니다.

pub mod holdings;
pub mod trade_log;
