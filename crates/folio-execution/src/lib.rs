//! 포트폴리오 리밸런싱 실행.
//!
//! 기준 스냅샷(직전 리밸런싱 시점의 보유 자산)과 현재 스냅샷을 비교하여
//! 변동분을 시장가 주문으로 전송하고, 시도 결과를 거래 로그에 기록합니다.

pub mod reconciler;

pub use reconciler::{
    PortfolioReconciler, ReconcileError, ReconcileReport, BASELINE_DOC_KEY, TRADE_LOG_DOC_KEY,
};
