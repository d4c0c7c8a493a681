//! 시세 조회 커맨드.

use anyhow::Result;

use super::AppContext;

/// 쉼표로 구분된 코인 목록의 시세 출력.
///
/// 개별 코인 실패는 해당 줄에만 표시되고 종료 코드에 영향을 주지 않습니다.
pub async fn run(ctx: &AppContext, coins: &str) -> Result<()> {
    let coins: Vec<String> = coins
        .split(',')
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect();
    if coins.is_empty() {
        anyhow::bail!("조회할 코인이 없습니다 (예: --coins BTC,ETH)");
    }

    ctx.client.directory().load_or_refresh().await;
    let prices = ctx.client.get_multiple_prices(&coins).await;

    println!("\n📈 시세");
    println!("{:─<72}", "");
    for coin in &coins {
        match prices.get(coin) {
            Some(Ok(quote)) => {
                println!(
                    "{:<10} {:<14} 현재가 {:>16}  24h {:>8.2}%  거래량 {}",
                    coin,
                    quote.symbol,
                    quote.price,
                    quote.price_change_percent_24h,
                    quote.volume_24h
                );
            }
            Some(Err(failure)) => {
                println!("{coin:<10} ❌ {failure}");
            }
            None => println!("{coin:<10} ❌ 결과 없음"),
        }
    }
    Ok(())
}
