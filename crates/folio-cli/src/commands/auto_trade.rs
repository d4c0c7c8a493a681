//! 자동 리밸런싱 커맨드.
//!
//! 현재 보유 자산 문서(`assets`)를 읽어 기준 스냅샷과 비교하고,
//! 변동분을 시장가 주문으로 전송합니다.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use folio_core::domain::holdings::HoldingsSnapshot;
use folio_core::domain::trade_log::TradeStatus;
use folio_execution::PortfolioReconciler;
use folio_exchange::MarginMode;

use super::AppContext;

/// 현재 보유 자산 문서 키 (`<데이터 디렉터리>/assets.json`).
pub const ASSETS_DOC_KEY: &str = "assets";

/// 리밸런싱 패스 1회 실행.
pub async fn run(ctx: &AppContext, margin_mode: MarginMode, leverage: &str) -> Result<()> {
    let Some(value) = ctx
        .store
        .get(ASSETS_DOC_KEY)
        .context("보유 자산 문서 읽기 실패")?
    else {
        bail!("보유 자산 문서가 없습니다 (데이터 디렉터리에 assets.json 필요)");
    };
    let current: HoldingsSnapshot =
        serde_json::from_value(value).context("보유 자산 문서 해석 실패")?;
    info!(coins = current.crypto.len(), "보유 자산 문서 로드");

    let reconciler = PortfolioReconciler::new(ctx.client.clone(), Arc::clone(&ctx.store))
        .with_margin_mode(margin_mode)
        .with_leverage(leverage);

    println!("\n🔁 자동 리밸런싱 시작 ({}개 자산)", current.crypto.len());
    let report = reconciler.reconcile(&current).await?;

    if report.first_run {
        println!("첫 실행: 현재 보유분을 기준으로 저장했습니다. 주문 없음.");
        return Ok(());
    }
    if report.changes.is_empty() {
        println!("변동 없음.");
        return Ok(());
    }

    println!("\n변동 {}건:", report.changes.len());
    for (change, entry) in report.changes.iter().zip(report.entries.iter()) {
        let status = match entry.status {
            TradeStatus::Success => "✅",
            TradeStatus::Failed => "❌",
        };
        print!(
            "{status} {} {} {}  ({} → {})",
            change.coin, change.action, change.size, change.old_quantity, change.new_quantity
        );
        if let Some(error) = &entry.error {
            print!("  {error}");
        }
        println!();
    }
    println!(
        "\n완료: 성공 {} / 실패 {}",
        report.succeeded(),
        report.failed()
    );

    if report.failed() > 0 {
        bail!("{}건의 주문이 실패했습니다 (거래 로그 참조)", report.failed());
    }
    Ok(())
}
