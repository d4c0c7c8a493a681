//! Bitget 포트폴리오 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 시장가 매수
//! folio market -c BTC -s buy -q 0.01
//!
//! # 지정가 매도 (post-only)
//! folio limit -c ETH -s sell -q 1.5 -p 3500 --force post_only
//!
//! # 롱 포지션 시장가 평창
//! folio close -c BTC -s sell -q 0.01
//!
//! # 시세 조회
//! folio price --coins BTC,ETH,SOL
//!
//! # 보유 자산 문서 기반 자동 리밸런싱
//! folio auto-trade
//!
//! # 계약 검색 / 거래 로그
//! folio contracts --search BTC
//! folio log --limit 20
//! ```
//!
//! 자격 증명은 환경변수(또는 `.env`)로 전달합니다:
//! `BITGET_API_KEY`, `BITGET_SECRET_KEY`, `BITGET_PASSPHRASE`,
//! 그리고 선택적으로 `BITGET_SANDBOX=true`.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use folio_exchange::{CloseOrderType, Force, MarginMode, Side};

mod commands;

use commands::{auto_trade, build_context, contracts, log, order, price, require_credentials};

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Bitget USDT 선물 포트폴리오 CLI - 수동 주문, 시세, 자동 리밸런싱", long_about = None)]
#[command(version)]
struct Cli {
    /// 문서(캐시/로그/기준 스냅샷) 저장 디렉터리
    #[arg(long, global = true, default_value = "data")]
    data_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 시장가 주문
    Market {
        /// 코인 이름 또는 심볼 (예: BTC, BTCUSDT)
        #[arg(short, long)]
        coin: String,

        /// 매매 방향 (buy, sell)
        #[arg(short, long)]
        side: Side,

        /// 주문 수량
        #[arg(short = 'q', long)]
        size: String,

        /// 마진 모드 (crossed, isolated)
        #[arg(short, long, default_value = "crossed")]
        margin_mode: MarginMode,

        /// 레버리지 배율
        #[arg(short, long, default_value = "1")]
        leverage: String,
    },

    /// 지정가 주문
    Limit {
        /// 코인 이름 또는 심볼
        #[arg(short, long)]
        coin: String,

        /// 매매 방향 (buy, sell)
        #[arg(short, long)]
        side: Side,

        /// 주문 수량
        #[arg(short = 'q', long)]
        size: String,

        /// 지정가
        #[arg(short, long)]
        price: String,

        /// 마진 모드 (crossed, isolated)
        #[arg(short, long, default_value = "crossed")]
        margin_mode: MarginMode,

        /// 주문 유효 기간 (gtc, ioc, fok, post_only)
        #[arg(short, long, default_value = "gtc")]
        force: Force,
    },

    /// 포지션 평창
    Close {
        /// 코인 이름 또는 심볼
        #[arg(short, long)]
        coin: String,

        /// 평창 방향 (롱 평창: sell, 숏 평창: buy)
        #[arg(short, long)]
        side: Side,

        /// 평창 수량
        #[arg(short = 'q', long)]
        size: String,

        /// 주문 유형 (market, limit)
        #[arg(short = 't', long, default_value = "market")]
        order_type: CloseOrderType,

        /// 지정가 (limit 유형에만 필수)
        #[arg(short, long)]
        price: Option<String>,
    },

    /// 시세 조회
    Price {
        /// 코인 목록 (쉼표 구분, 예: BTC,ETH,SOL)
        #[arg(long)]
        coins: String,
    },

    /// 보유 자산 문서 기반 자동 리밸런싱
    AutoTrade {
        /// 마진 모드 (crossed, isolated)
        #[arg(short, long, default_value = "crossed")]
        margin_mode: MarginMode,

        /// 레버리지 배율
        #[arg(short, long, default_value = "1")]
        leverage: String,
    },

    /// 계약 디렉터리 조회/갱신
    Contracts {
        /// 검색어 (심볼 또는 코인 이름 일부)
        #[arg(short, long)]
        search: Option<String>,

        /// 최대 결과 수
        #[arg(long, default_value = "10")]
        limit: usize,

        /// 캐시를 무시하고 강제 갱신
        #[arg(long)]
        refresh: bool,
    },

    /// 거래 로그 조회
    Log {
        /// 최근 N건 (0 = 전체)
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// 로그 문서 초기화
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (없어도 에러 안남)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let ctx = build_context(&cli.data_dir)?;

    match cli.command {
        Commands::Market {
            coin,
            side,
            size,
            margin_mode,
            leverage,
        } => {
            require_credentials()?;
            order::run_market(&ctx, &coin, side, &size, margin_mode, &leverage).await?;
        }

        Commands::Limit {
            coin,
            side,
            size,
            price,
            margin_mode,
            force,
        } => {
            require_credentials()?;
            order::run_limit(&ctx, &coin, side, &size, &price, margin_mode, force).await?;
        }

        Commands::Close {
            coin,
            side,
            size,
            order_type,
            price,
        } => {
            require_credentials()?;
            order::run_close(&ctx, &coin, side, &size, order_type, price).await?;
        }

        Commands::Price { coins } => {
            price::run(&ctx, &coins).await?;
        }

        Commands::AutoTrade {
            margin_mode,
            leverage,
        } => {
            require_credentials()?;
            auto_trade::run(&ctx, margin_mode, &leverage).await?;
        }

        Commands::Contracts {
            search,
            limit,
            refresh,
        } => {
            contracts::run(&ctx, search, limit, refresh).await?;
        }

        Commands::Log { limit, clear } => {
            if clear {
                log::clear(&ctx)?;
            } else {
                log::run(&ctx, limit)?;
            }
        }
    }

    Ok(())
}
