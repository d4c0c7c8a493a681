//! 수동 주문 커맨드 (시장가 / 지정가 / 평창).

use anyhow::{bail, Result};
use rust_decimal::Decimal;
use tracing::info;

use folio_exchange::{
    parse_quantity, CloseOrderType, Force, MarginMode, RestResponse, Side,
};

use super::AppContext;

/// 주문 응답을 출력하고 실패 시 에러로 전환.
fn report(response: &RestResponse) -> Result<()> {
    if response.is_success() {
        println!("\n✅ 주문 접수 완료");
        if let Some(order_id) = response.envelope.data.get("orderId") {
            println!("주문 ID: {order_id}");
        }
        Ok(())
    } else {
        println!("\n❌ 주문 거부됨 (HTTP {})", response.status_code);
        println!("코드: {}", response.envelope.code);
        println!("메시지: {}", response.envelope.msg);
        bail!("주문 실패 [{}]: {}", response.envelope.code, response.envelope.msg)
    }
}

/// 시장가 주문 실행.
pub async fn run_market(
    ctx: &AppContext,
    coin: &str,
    side: Side,
    size: &str,
    margin_mode: MarginMode,
    leverage: &str,
) -> Result<()> {
    let size = parse_quantity(size)?;
    ctx.client.directory().load_or_refresh().await;

    info!(coin, %side, %size, "시장가 주문");
    println!("\n📤 시장가 주문: {coin} {side} {size}");

    let response = ctx
        .client
        .place_market_order(coin, side, size, margin_mode, leverage)
        .await?;
    report(&response)
}

/// 지정가 주문 실행.
#[allow(clippy::too_many_arguments)]
pub async fn run_limit(
    ctx: &AppContext,
    coin: &str,
    side: Side,
    size: &str,
    price: &str,
    margin_mode: MarginMode,
    force: Force,
) -> Result<()> {
    let size = parse_quantity(size)?;
    let price = parse_quantity(price)?;
    ctx.client.directory().load_or_refresh().await;

    info!(coin, %side, %size, %price, "지정가 주문");
    println!("\n📤 지정가 주문: {coin} {side} {size} @ {price}");

    let response = ctx
        .client
        .place_limit_order(coin, side, size, price, margin_mode, force)
        .await?;
    report(&response)
}

/// 포지션 평창 실행.
pub async fn run_close(
    ctx: &AppContext,
    coin: &str,
    side: Side,
    size: &str,
    order_type: CloseOrderType,
    price: Option<String>,
) -> Result<()> {
    let size = parse_quantity(size)?;
    let price: Option<Decimal> = match price {
        Some(raw) => Some(parse_quantity(&raw)?),
        None => None,
    };
    ctx.client.directory().load_or_refresh().await;

    info!(coin, %side, %size, %order_type, "평창 주문");
    println!("\n📤 평창 주문: {coin} {side} {size} ({order_type})");

    let response = ctx
        .client
        .close_position(coin, side, size, order_type, price)
        .await?;
    report(&response)
}
