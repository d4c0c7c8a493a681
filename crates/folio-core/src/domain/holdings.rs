//! 보유 자산 스냅샷 및 변동 계산.
//!
//! 두 시점의 보유 자산 스냅샷(이전/현재)을 비교하여
//! 매수/매도 액션으로 변환 가능한 변동 레코드(ChangeSet)를 만듭니다.
//!
//! # 설계 원칙
//!
//! - 스냅샷은 읽기 전용 입력이며 비교 과정에서 절대 변경되지 않습니다.
//! - 코인 이름은 대소문자 구분 없이 동일한 자산으로 취급합니다.
//! - 한쪽 스냅샷에만 존재하는 코인은 반대쪽 수량을 0으로 간주합니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 변동 감지 하한선 (dust threshold) = 1e-6.
///
/// 이 값 이하의 수량 차이는 부동소수점 노이즈로 간주하여 변동으로 보고하지 않습니다.
pub const DUST_THRESHOLD: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

// =============================================================================
// 스냅샷
// =============================================================================

/// 단일 보유 자산 항목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingEntry {
    /// 코인 이름 (예: BTC). 비교 시 대문자로 정규화됩니다.
    pub name: String,
    /// 보유 수량 (음수 불가)
    pub quantity: Decimal,
}

impl HoldingEntry {
    /// 새 항목 생성.
    pub fn new(name: impl Into<String>, quantity: Decimal) -> Self {
        Self {
            name: name.into(),
            quantity,
        }
    }
}

/// 보유 자산 스냅샷.
///
/// 영속 문서 스키마 `{"crypto": [{"name", "quantity"}, ...]}`와 1:1 대응합니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HoldingsSnapshot {
    /// 보유 코인 목록
    #[serde(default)]
    pub crypto: Vec<HoldingEntry>,
}

impl HoldingsSnapshot {
    /// 항목 목록으로 스냅샷 생성.
    pub fn new(crypto: Vec<HoldingEntry>) -> Self {
        Self { crypto }
    }

    /// 대문자 코인 이름 → 수량 인덱스.
    ///
    /// 같은 코인이 중복 기재된 경우 수량을 합산합니다.
    fn index(&self) -> BTreeMap<String, Decimal> {
        let mut map = BTreeMap::new();
        for entry in &self.crypto {
            let key = entry.name.trim().to_uppercase();
            *map.entry(key).or_insert(Decimal::ZERO) += entry.quantity;
        }
        map
    }
}

// =============================================================================
// 변동 레코드
// =============================================================================

/// 매매 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    /// 매수 (수량 증가)
    Buy,
    /// 매도 (수량 감소)
    Sell,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "buy"),
            TradeAction::Sell => write!(f, "sell"),
        }
    }
}

/// 단일 코인의 수량 변동.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    /// 코인 이름 (대문자)
    pub coin: String,
    /// 이전 수량
    pub old_quantity: Decimal,
    /// 현재 수량
    pub new_quantity: Decimal,
    /// 변동량 (new - old)
    pub delta: Decimal,
    /// 파생 액션 (delta > 0 → buy, delta < 0 → sell)
    pub action: TradeAction,
    /// 주문 수량 = |delta|
    pub size: Decimal,
}

/// 두 스냅샷 간 변동 계산.
///
/// 이전/현재 스냅샷의 모든 코인을 합집합으로 순회하며,
/// `|delta| > DUST_THRESHOLD`인 코인만 변동 레코드로 만듭니다.
/// 결과는 코인 이름 오름차순으로 정렬되어 결정적입니다.
///
/// # Examples
///
/// ```
/// use folio_core::domain::holdings::{diff, HoldingEntry, HoldingsSnapshot, TradeAction};
/// use rust_decimal::Decimal;
///
/// let prev = HoldingsSnapshot::new(vec![HoldingEntry::new("BTC", Decimal::ONE)]);
/// let curr = HoldingsSnapshot::new(vec![HoldingEntry::new("BTC", Decimal::TWO)]);
/// let changes = diff(&prev, &curr);
/// assert_eq!(changes.len(), 1);
/// assert_eq!(changes[0].action, TradeAction::Buy);
/// ```
pub fn diff(previous: &HoldingsSnapshot, current: &HoldingsSnapshot) -> Vec<ChangeRecord> {
    let prev_index = previous.index();
    let curr_index = current.index();

    let mut coins: Vec<&String> = prev_index.keys().chain(curr_index.keys()).collect();
    coins.sort();
    coins.dedup();

    let mut changes = Vec::new();
    for coin in coins {
        let old_quantity = prev_index.get(coin).copied().unwrap_or(Decimal::ZERO);
        let new_quantity = curr_index.get(coin).copied().unwrap_or(Decimal::ZERO);
        let delta = new_quantity - old_quantity;
        if delta.abs() <= DUST_THRESHOLD {
            continue;
        }
        let action = if delta > Decimal::ZERO {
            TradeAction::Buy
        } else {
            TradeAction::Sell
        };
        changes.push(ChangeRecord {
            coin: coin.clone(),
            old_quantity,
            new_quantity,
            delta,
            action,
            size: delta.abs(),
        });
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(entries: &[(&str, Decimal)]) -> HoldingsSnapshot {
        HoldingsSnapshot::new(
            entries
                .iter()
                .map(|(name, qty)| HoldingEntry::new(*name, *qty))
                .collect(),
        )
    }

    #[test]
    fn buy_and_sell_derived_from_delta_sign() {
        let prev = snapshot(&[("BTC", dec!(1.0)), ("ETH", dec!(3.0))]);
        let curr = snapshot(&[("BTC", dec!(1.5)), ("ETH", dec!(2.0))]);

        let changes = diff(&prev, &curr);
        assert_eq!(changes.len(), 2);

        assert_eq!(changes[0].coin, "BTC");
        assert_eq!(changes[0].action, TradeAction::Buy);
        assert_eq!(changes[0].size, dec!(0.5));
        assert_eq!(changes[0].delta, dec!(0.5));

        assert_eq!(changes[1].coin, "ETH");
        assert_eq!(changes[1].action, TradeAction::Sell);
        assert_eq!(changes[1].size, dec!(1.0));
    }

    #[test]
    fn missing_coin_treated_as_zero() {
        let prev = snapshot(&[("BTC", dec!(1.0))]);
        let curr = snapshot(&[("BTC", dec!(1.0)), ("SOL", dec!(4.0))]);

        let changes = diff(&prev, &curr);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].coin, "SOL");
        assert_eq!(changes[0].old_quantity, Decimal::ZERO);
        assert_eq!(changes[0].new_quantity, dec!(4.0));
        assert_eq!(changes[0].action, TradeAction::Buy);

        // 반대 방향: 사라진 코인은 전량 매도로 보고
        let removed = diff(&curr, &prev);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].action, TradeAction::Sell);
        assert_eq!(removed[0].new_quantity, Decimal::ZERO);
    }

    #[test]
    fn dust_delta_is_suppressed() {
        // |1.0000001 - 1.0000000| = 1e-7 <= 1e-6 → 변동 없음
        let prev = snapshot(&[("BTC", dec!(1.0000001))]);
        let curr = snapshot(&[("BTC", dec!(1.0000000))]);
        assert!(diff(&prev, &curr).is_empty());

        // 정확히 1e-6도 노이즈로 취급 (임계값 포함)
        let prev = snapshot(&[("BTC", dec!(1.000001))]);
        let curr = snapshot(&[("BTC", dec!(1.000000))]);
        assert!(diff(&prev, &curr).is_empty());

        // 1e-6 초과는 실제 변동
        let prev = snapshot(&[("BTC", dec!(1.000002))]);
        let curr = snapshot(&[("BTC", dec!(1.000000))]);
        assert_eq!(diff(&prev, &curr).len(), 1);
    }

    #[test]
    fn diff_is_anti_symmetric() {
        let prev = snapshot(&[("BTC", dec!(1.0)), ("ETH", dec!(2.0)), ("SOL", dec!(5.0))]);
        let curr = snapshot(&[("BTC", dec!(1.5)), ("ETH", dec!(0.5)), ("DOGE", dec!(100))]);

        let forward = diff(&prev, &curr);
        let backward = diff(&curr, &prev);
        assert_eq!(forward.len(), backward.len());

        for (f, b) in forward.iter().zip(backward.iter()) {
            assert_eq!(f.coin, b.coin);
            assert_eq!(f.delta, -b.delta);
            assert_eq!(f.size, b.size);
            assert_ne!(f.action, b.action);
        }
    }

    #[test]
    fn coin_names_merge_case_insensitively() {
        let prev = snapshot(&[("btc", dec!(1.0))]);
        let curr = snapshot(&[("BTC", dec!(2.0))]);

        let changes = diff(&prev, &curr);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].coin, "BTC");
        assert_eq!(changes[0].delta, dec!(1.0));
    }

    #[test]
    fn identical_snapshots_produce_empty_changeset() {
        let snap = snapshot(&[("BTC", dec!(1.0)), ("ETH", dec!(2.0))]);
        assert!(diff(&snap, &snap).is_empty());
    }
}
