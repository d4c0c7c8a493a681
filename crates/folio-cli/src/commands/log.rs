//! 거래 로그 조회 커맨드.

use anyhow::{Context, Result};
use chrono::Utc;

use folio_core::domain::trade_log::TradeLogDocument;
use folio_execution::TRADE_LOG_DOC_KEY;

use super::AppContext;

/// 거래 로그 초기화 (빈 문서로 교체).
pub fn clear(ctx: &AppContext) -> Result<()> {
    let doc = TradeLogDocument::new(Utc::now());
    let value = serde_json::to_value(&doc).context("거래 로그 직렬화 실패")?;
    ctx.store
        .put(TRADE_LOG_DOC_KEY, &value)
        .context("거래 로그 쓰기 실패")?;
    println!("\n🧹 거래 로그를 초기화했습니다.");
    Ok(())
}

/// 최근 거래 로그 항목 출력 (`limit == 0`이면 전체).
pub fn run(ctx: &AppContext, limit: usize) -> Result<()> {
    let Some(value) = ctx
        .store
        .get(TRADE_LOG_DOC_KEY)
        .context("거래 로그 읽기 실패")?
    else {
        println!("\n거래 로그가 아직 없습니다.");
        return Ok(());
    };
    let doc: TradeLogDocument =
        serde_json::from_value(value).context("거래 로그 문서 해석 실패")?;

    let entries = doc.recent(limit);
    println!(
        "\n📜 거래 로그 (전체 {}건 중 {}건, 생성 {})",
        doc.entries.len(),
        entries.len(),
        doc.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("{:─<96}", "");
    for entry in entries {
        let status = match entry.status {
            folio_core::domain::trade_log::TradeStatus::Success => "✅",
            folio_core::domain::trade_log::TradeStatus::Failed => "❌",
        };
        print!(
            "{status} {} {:<8} {:<4} {:>14}  {} → {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.coin,
            entry.action,
            entry.size,
            entry.old_quantity,
            entry.new_quantity
        );
        if let Some(error) = &entry.error {
            print!("  ({error})");
        }
        println!();
    }
    Ok(())
}
