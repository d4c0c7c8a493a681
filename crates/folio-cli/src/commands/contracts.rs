//! 계약 디렉터리 조회/갱신 커맨드.

use anyhow::Result;
use tracing::info;

use super::AppContext;

/// 계약 목록 조회 (선택적 검색어, 강제 갱신).
pub async fn run(ctx: &AppContext, search: Option<String>, limit: usize, refresh: bool) -> Result<()> {
    let directory = ctx.client.directory();
    if refresh {
        let count = directory.refresh().await?;
        info!(contracts = count, "계약 디렉터리 강제 갱신");
        println!("🔄 계약 목록 갱신 완료: {count}건");
    } else {
        directory.load_or_refresh().await;
    }

    if !directory.is_loaded().await {
        anyhow::bail!("계약 디렉터리를 불러올 수 없습니다 (네트워크/캐시 모두 실패)");
    }

    let contracts = match &search {
        Some(query) => directory.search(query, limit).await,
        // 검색어가 없으면 전체 건수만 출력
        None => {
            println!("\n📒 계약 {}건 로드됨 (검색: --search <이름>)", directory.contract_count().await);
            return Ok(());
        }
    };

    if contracts.is_empty() {
        println!("\n검색 결과 없음: {}", search.unwrap_or_default());
        return Ok(());
    }

    println!("\n📒 계약 검색 결과");
    println!("{:─<84}", "");
    println!(
        "{:<16} {:<8} {:<8} {:>12} {:>8} {:>8} {:>10}",
        "심볼", "기초", "호가", "최소수량", "수량자리", "가격자리", "최대레버"
    );
    for contract in contracts {
        println!(
            "{:<16} {:<8} {:<8} {:>12} {:>8} {:>8} {:>10}",
            contract.symbol,
            contract.base_coin,
            contract.quote_coin,
            contract.min_trade_num,
            contract.volume_place,
            contract.price_place,
            contract.max_lever
        );
    }
    Ok(())
}
