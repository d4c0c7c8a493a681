//! Bitget USDT 선물 서명 클라이언트.
//!
//! 주문/레버리지/마진 모드 변경과 시세 조회를 담당합니다.
//!
//! # 응답 규약
//!
//! 모든 연산은 `{statusCode, envelope}` 형태의 [`RestResponse`]를 반환합니다.
//! HTTP 비2xx는 이 계층에서 실패가 아니라 검사 가능한 정상 결과입니다.
//! `Err`는 네트워크 도달 실패, 응답 해석 불가, 그리고 전송 전에 걸러지는
//! 로컬 검증 실패(심볼 해석, 최소 수량, 수량 형식)에만 사용됩니다.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::contracts::{ContractDirectory, ContractInfo};
use crate::error::ExchangeError;
use crate::resolve::SymbolResolver;
use crate::sign::sign;

/// 거래소 애플리케이션 성공 코드.
pub const API_SUCCESS_CODE: &str = "00000";

/// 실서버 기본 URL.
pub const LIVE_BASE_URL: &str = "https://api.bitget.com";

const ORDER_PATH: &str = "/api/v2/mix/order/place-order";
const SET_LEVERAGE_PATH: &str = "/api/v2/mix/account/set-leverage";
const SET_MARGIN_MODE_PATH: &str = "/api/v2/mix/account/set-margin-mode";
const TICKER_PATH: &str = "/api/v2/mix/market/ticker";

/// 읽기 전용 엔드포인트 I/O 타임아웃. 주문 호출에는 적용하지 않습니다 —
/// 주문은 거래소가 응답할 때까지 블로킹됩니다.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// 설정
// =============================================================================

/// 클라이언트 자격 증명 및 환경 설정.
#[derive(Clone)]
pub struct BitgetConfig {
    pub api_key: String,
    pub secret_key: String,
    pub passphrase: String,
    /// 테스트 환경 여부 (productType이 SUSDT-FUTURES로 바뀜)
    pub sandbox: bool,
    /// 기본 URL (테스트에서 목 서버로 교체 가능)
    pub base_url: String,
}

impl std::fmt::Debug for BitgetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitgetConfig")
            .field("api_key", &"***")
            .field("secret_key", &"***")
            .field("passphrase", &"***")
            .field("sandbox", &self.sandbox)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl BitgetConfig {
    /// 실서버 URL을 사용하는 설정 생성.
    pub fn new(
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
        passphrase: impl Into<String>,
        sandbox: bool,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            passphrase: passphrase.into(),
            sandbox,
            base_url: LIVE_BASE_URL.to_string(),
        }
    }

    /// 기본 URL 교체 (테스트용 목 서버 등).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 환경에 맞는 productType.
    pub fn product_type(&self) -> &'static str {
        if self.sandbox {
            "SUSDT-FUTURES"
        } else {
            "USDT-FUTURES"
        }
    }
}

// =============================================================================
// 응답 타입
// =============================================================================

/// 거래소 공통 응답 envelope `{code, msg, data}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Value,
}

impl ApiEnvelope {
    /// 애플리케이션 수준 성공 여부 (HTTP 상태와 무관).
    pub fn is_success(&self) -> bool {
        self.code == API_SUCCESS_CODE
    }
}

/// HTTP 상태와 envelope을 함께 담는 검사 가능한 결과.
#[derive(Debug, Clone, Serialize)]
pub struct RestResponse {
    pub status_code: u16,
    pub envelope: ApiEnvelope,
}

impl RestResponse {
    /// HTTP 2xx이면서 응답 코드도 성공인 경우.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code) && self.envelope.is_success()
    }

    /// 로그 기록용 JSON 표현.
    pub fn to_value(&self) -> Value {
        json!({
            "statusCode": self.status_code,
            "response": {
                "code": self.envelope.code,
                "msg": self.envelope.msg,
                "data": self.envelope.data,
            },
        })
    }
}

// =============================================================================
// 주문 파라미터
// =============================================================================

/// 매매 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(format!("지원하지 않는 방향: {other} (buy/sell)")),
        }
    }
}

/// 마진 모드.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginMode {
    /// 교차 (포지션 간 증거금 공유)
    Crossed,
    /// 격리 (포지션별 증거금 분리)
    Isolated,
}

impl std::fmt::Display for MarginMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarginMode::Crossed => write!(f, "crossed"),
            MarginMode::Isolated => write!(f, "isolated"),
        }
    }
}

impl FromStr for MarginMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "crossed" => Ok(MarginMode::Crossed),
            "isolated" => Ok(MarginMode::Isolated),
            other => Err(format!("지원하지 않는 마진 모드: {other} (crossed/isolated)")),
        }
    }
}

/// 지정가 주문 유효 기간.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Force {
    Gtc,
    Ioc,
    Fok,
    PostOnly,
}

impl std::fmt::Display for Force {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Force::Gtc => write!(f, "gtc"),
            Force::Ioc => write!(f, "ioc"),
            Force::Fok => write!(f, "fok"),
            Force::PostOnly => write!(f, "post_only"),
        }
    }
}

impl FromStr for Force {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gtc" => Ok(Force::Gtc),
            "ioc" => Ok(Force::Ioc),
            "fok" => Ok(Force::Fok),
            "post_only" => Ok(Force::PostOnly),
            other => Err(format!(
                "지원하지 않는 유효 기간: {other} (gtc/ioc/fok/post_only)"
            )),
        }
    }
}

/// 평창 주문 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOrderType {
    Market,
    Limit,
}

impl std::fmt::Display for CloseOrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseOrderType::Market => write!(f, "market"),
            CloseOrderType::Limit => write!(f, "limit"),
        }
    }
}

impl FromStr for CloseOrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "market" => Ok(CloseOrderType::Market),
            "limit" => Ok(CloseOrderType::Limit),
            other => Err(format!("지원하지 않는 주문 유형: {other} (market/limit)")),
        }
    }
}

// =============================================================================
// 시세 타입
// =============================================================================

/// 정규화된 시세 조회 결과.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerQuote {
    pub symbol: String,
    pub price: Decimal,
    pub price_change_24h: Decimal,
    pub price_change_percent_24h: Decimal,
    pub volume_24h: Decimal,
    pub timestamp: String,
}

/// 시세 조회 실패 (네트워크/API/해석 모두 이 형태로 강등).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TickerFailure {
    pub message: String,
    pub code: Option<String>,
}

/// 시세 조회 결과. 조회 경로는 절대 패닉하거나 예외를 전파하지 않습니다.
pub type TickerResult = Result<TickerQuote, TickerFailure>;

/// 거래소 원본 ticker 응답 항목.
#[derive(Debug, Deserialize)]
struct RawTicker {
    #[serde(default, rename = "lastPr")]
    last_pr: String,
    #[serde(default, rename = "chgUTC")]
    chg_utc: String,
    #[serde(default, rename = "chgUtcRate")]
    chg_utc_rate: String,
    #[serde(default, rename = "baseVolume")]
    base_volume: String,
    #[serde(default)]
    ts: String,
}

fn decimal_or_zero(raw: &str) -> Decimal {
    raw.parse().unwrap_or(Decimal::ZERO)
}

// =============================================================================
// 수량 헬퍼
// =============================================================================

/// 수량/가격 문자열 파싱.
///
/// # Errors
///
/// 숫자가 아니거나 0 이하이면 `ExchangeError::InvalidQuantity`.
pub fn parse_quantity(raw: &str) -> Result<Decimal, ExchangeError> {
    let value: Decimal = raw
        .trim()
        .parse()
        .map_err(|_| ExchangeError::InvalidQuantity(format!("숫자가 아님: {raw:?}")))?;
    if value <= Decimal::ZERO {
        return Err(ExchangeError::InvalidQuantity(format!(
            "0보다 커야 함: {raw:?}"
        )));
    }
    Ok(value)
}

/// 계약 정밀도에 맞춘 수량 문자열 렌더링.
///
/// 계약 정보가 있으면 `volumePlace` 자리로 절사하고 최소 수량을 검증합니다.
/// 거래소는 선언된 정밀도를 벗어난 수량 문자열을 거부하므로
/// 여기서 만든 문자열이 그대로 전송되어야 합니다.
fn render_size(
    symbol: &str,
    size: Decimal,
    contract: Option<&ContractInfo>,
) -> Result<String, ExchangeError> {
    if size <= Decimal::ZERO {
        return Err(ExchangeError::InvalidQuantity(format!(
            "주문 수량은 0보다 커야 함: {size}"
        )));
    }
    match contract {
        Some(info) => {
            let truncated = size.trunc_with_scale(info.volume_place);
            if truncated < info.min_trade_num {
                return Err(ExchangeError::BelowMinimumSize {
                    symbol: symbol.to_string(),
                    size: truncated,
                    min_trade_num: info.min_trade_num,
                });
            }
            Ok(truncated.normalize().to_string())
        }
        None => Ok(size.normalize().to_string()),
    }
}

/// 계약 정밀도에 맞춘 가격 문자열 렌더링.
fn render_price(price: Decimal, contract: Option<&ContractInfo>) -> String {
    match contract {
        Some(info) => price.trunc_with_scale(info.price_place).normalize().to_string(),
        None => price.normalize().to_string(),
    }
}

/// 호출마다 유일한 멱등 토큰 생성 (시각 + 무작위 접미사).
///
/// 같은 밀리초에 생성된 주문끼리도 충돌하지 않습니다.
fn client_oid(kind: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{kind}_{millis}_{}", &suffix[..8])
}

// =============================================================================
// BitgetClient
// =============================================================================

/// 서명된 주문/계정/시세 요청을 조립하고 전송하는 클라이언트.
pub struct BitgetClient {
    http: Client,
    config: BitgetConfig,
    directory: Arc<ContractDirectory>,
    resolver: SymbolResolver,
}

impl BitgetClient {
    /// 디렉터리를 공유하는 클라이언트 생성.
    pub fn new(config: BitgetConfig, directory: Arc<ContractDirectory>) -> Self {
        Self {
            http: Client::new(),
            config,
            resolver: SymbolResolver::new(directory.clone()),
            directory,
        }
    }

    /// 공유 계약 디렉터리.
    pub fn directory(&self) -> &Arc<ContractDirectory> {
        &self.directory
    }

    /// 심볼 해석기.
    pub fn resolver(&self) -> &SymbolResolver {
        &self.resolver
    }

    /// 서명된 POST 전송.
    ///
    /// 본문은 여기서 한 번만 직렬화되며, 서명에 쓴 바이트가 그대로 전송됩니다.
    async fn signed_post(&self, path: &str, body: &Value) -> Result<RestResponse, ExchangeError> {
        let body_text = body.to_string();
        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = sign(&self.config.secret_key, &timestamp, "POST", path, &body_text);

        let response = self
            .http
            .post(format!("{}{}", self.config.base_url, path))
            .header("ACCESS-KEY", &self.config.api_key)
            .header("ACCESS-SIGN", signature)
            .header("ACCESS-PASSPHRASE", &self.config.passphrase)
            .header("ACCESS-TIMESTAMP", timestamp)
            .header("locale", "en-US")
            .header("Content-Type", "application/json")
            .body(body_text)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        let status_code = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        debug!(path, status_code, body = %text, "거래소 응답");

        let envelope: ApiEnvelope = serde_json::from_str(&text)
            .map_err(|e| ExchangeError::Parse(format!("{path} 응답 해석 실패: {e}")))?;
        Ok(RestResponse {
            status_code,
            envelope,
        })
    }

    // =========================================================================
    // 주문
    // =========================================================================

    /// 시장가 주문.
    ///
    /// 심볼을 엄격하게 해석한 뒤 (실패 시 `UnresolvedSymbol`)
    /// 디렉터리의 계약 정보와 함께 계약 인지 변형에 위임합니다.
    pub async fn place_market_order(
        &self,
        coin: &str,
        side: Side,
        size: Decimal,
        margin_mode: MarginMode,
        leverage: &str,
    ) -> Result<RestResponse, ExchangeError> {
        let symbol = self.resolver.resolve(coin).await?;
        let contract = self.directory.get(&symbol).await;
        self.place_market_order_with_contract(
            &symbol,
            side,
            size,
            contract.as_ref(),
            margin_mode,
            leverage,
        )
        .await
    }

    /// 이미 해석된 심볼로 시장가 주문 (심볼 해석 생략).
    ///
    /// 격리 마진이면 마진 모드 변경을, 레버리지가 "1"이 아니면 레버리지 변경을
    /// best-effort 사전 요청으로 수행합니다. 사전 요청 실패는 경고 로그로만
    /// 보고되고 본 주문은 계속 진행됩니다.
    ///
    /// 계약 정보가 주어지면 수량을 `volumePlace` 정밀도로 절사하고
    /// `minTradeNum` 미달 시 `BelowMinimumSize`로 실패합니다.
    pub async fn place_market_order_with_contract(
        &self,
        symbol: &str,
        side: Side,
        size: Decimal,
        contract: Option<&ContractInfo>,
        margin_mode: MarginMode,
        leverage: &str,
    ) -> Result<RestResponse, ExchangeError> {
        let rendered = render_size(symbol, size, contract)?;

        if margin_mode == MarginMode::Isolated {
            match self.set_margin_mode(symbol, margin_mode).await {
                Ok(response) if !response.is_success() => {
                    warn!(%symbol, code = %response.envelope.code, "마진 모드 변경 거부됨");
                }
                Err(e) => warn!(%symbol, error = %e, "마진 모드 변경 실패"),
                Ok(_) => {}
            }
        }
        if leverage != "1" {
            match self.set_leverage(symbol, leverage).await {
                Ok(response) if !response.is_success() => {
                    warn!(%symbol, code = %response.envelope.code, "레버리지 변경 거부됨");
                }
                Err(e) => warn!(%symbol, error = %e, "레버리지 변경 실패"),
                Ok(_) => {}
            }
        }
        let body = json!({
            "symbol": symbol,
            "productType": self.config.product_type(),
            "marginMode": margin_mode.to_string(),
            "marginCoin": "USDT",
            "size": rendered,
            "side": side.to_string(),
            "tradeSide": "open",
            "orderType": "market",
            "clientOid": client_oid("market"),
        });
        self.signed_post(ORDER_PATH, &body).await
    }

    /// 지정가 주문 (항상 `tradeSide=open`).
    pub async fn place_limit_order(
        &self,
        coin: &str,
        side: Side,
        size: Decimal,
        price: Decimal,
        margin_mode: MarginMode,
        force: Force,
    ) -> Result<RestResponse, ExchangeError> {
        let symbol = self.resolver.resolve(coin).await?;
        let contract = self.directory.get(&symbol).await;
        let rendered_size = render_size(&symbol, size, contract.as_ref())?;
        let rendered_price = render_price(price, contract.as_ref());

        let body = json!({
            "symbol": symbol,
            "productType": self.config.product_type(),
            "marginMode": margin_mode.to_string(),
            "marginCoin": "USDT",
            "size": rendered_size,
            "price": rendered_price,
            "side": side.to_string(),
            "tradeSide": "open",
            "orderType": "limit",
            "force": force.to_string(),
            "clientOid": client_oid("limit"),
        });
        self.signed_post(ORDER_PATH, &body).await
    }

    /// 평창 주문 (`tradeSide=close`, 교차 마진 고정).
    ///
    /// 지정가일 때만 가격이 필수이며 `force=gtc`로 전송됩니다.
    pub async fn close_position(
        &self,
        coin: &str,
        side: Side,
        size: Decimal,
        order_type: CloseOrderType,
        price: Option<Decimal>,
    ) -> Result<RestResponse, ExchangeError> {
        let symbol = self.resolver.resolve(coin).await?;
        let contract = self.directory.get(&symbol).await;
        let rendered_size = render_size(&symbol, size, contract.as_ref())?;

        let mut body = json!({
            "symbol": symbol,
            "productType": self.config.product_type(),
            "marginMode": MarginMode::Crossed.to_string(),
            "marginCoin": "USDT",
            "size": rendered_size,
            "side": side.to_string(),
            "tradeSide": "close",
            "orderType": order_type.to_string(),
            "clientOid": client_oid("close"),
        });
        if order_type == CloseOrderType::Limit {
            let price = price.ok_or_else(|| {
                ExchangeError::InvalidQuantity("지정가 평창에는 가격이 필요함".to_string())
            })?;
            body["price"] = Value::String(render_price(price, contract.as_ref()));
            body["force"] = Value::String(Force::Gtc.to_string());
        }
        self.signed_post(ORDER_PATH, &body).await
    }

    // =========================================================================
    // 계정 사전 설정
    // =========================================================================

    /// 레버리지 변경.
    pub async fn set_leverage(
        &self,
        symbol: &str,
        leverage: &str,
    ) -> Result<RestResponse, ExchangeError> {
        let body = json!({
            "symbol": symbol,
            "productType": self.config.product_type(),
            "marginCoin": "USDT",
            "leverage": leverage,
        });
        self.signed_post(SET_LEVERAGE_PATH, &body).await
    }

    /// 마진 모드 변경.
    pub async fn set_margin_mode(
        &self,
        symbol: &str,
        margin_mode: MarginMode,
    ) -> Result<RestResponse, ExchangeError> {
        let body = json!({
            "symbol": symbol,
            "productType": self.config.product_type(),
            "marginCoin": "USDT",
            "marginMode": margin_mode.to_string(),
        });
        self.signed_post(SET_MARGIN_MODE_PATH, &body).await
    }

    // =========================================================================
    // 시세
    // =========================================================================

    /// 최신 시세 조회.
    ///
    /// 주문 경로와 달리 심볼 해석 실패를 삼키고 대문자 원본 입력으로
    /// 조회를 시도합니다 (읽기 경로는 추측을 허용, 쓰기 경로는 불허).
    /// 모든 실패는 `TickerFailure`로 강등되며 절대 전파되지 않습니다.
    pub async fn get_ticker_price(&self, coin: &str) -> TickerResult {
        let symbol = match self.resolver.resolve(coin).await {
            Ok(symbol) => symbol,
            Err(e) => {
                debug!(coin, error = %e, "시세 조회: 해석 실패, 원본 입력으로 폴백");
                coin.trim().to_uppercase()
            }
        };

        let url = format!(
            "{}{}?symbol={}&productType={}",
            self.config.base_url,
            TICKER_PATH,
            symbol,
            self.config.product_type()
        );
        let response = self
            .http
            .get(&url)
            .timeout(READ_TIMEOUT)
            .send()
            .await
            .map_err(|e| TickerFailure {
                message: format!("네트워크 요청 실패: {e}"),
                code: None,
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| TickerFailure {
            message: format!("네트워크 요청 실패: {e}"),
            code: None,
        })?;
        let envelope: ApiEnvelope = serde_json::from_str(&text).map_err(|e| TickerFailure {
            message: format!("응답 해석 실패: {e}"),
            code: None,
        })?;

        if !status.is_success() || !envelope.is_success() {
            return Err(TickerFailure {
                message: if envelope.msg.is_empty() {
                    "가격 조회 실패".to_string()
                } else {
                    envelope.msg
                },
                code: Some(envelope.code),
            });
        }

        let tickers: Vec<RawTicker> =
            serde_json::from_value(envelope.data).map_err(|e| TickerFailure {
                message: format!("ticker data 해석 실패: {e}"),
                code: None,
            })?;
        let ticker = tickers.into_iter().next().ok_or_else(|| TickerFailure {
            message: format!("{symbol} 시세 없음"),
            code: None,
        })?;

        Ok(TickerQuote {
            symbol,
            price: decimal_or_zero(&ticker.last_pr),
            price_change_24h: decimal_or_zero(&ticker.chg_utc),
            price_change_percent_24h: decimal_or_zero(&ticker.chg_utc_rate)
                * Decimal::ONE_HUNDRED,
            volume_24h: decimal_or_zero(&ticker.base_volume),
            timestamp: ticker.ts,
        })
    }

    /// 여러 코인의 시세를 순차 조회.
    ///
    /// 결과는 대문자 코인 이름으로 키가 잡히며, 개별 실패는
    /// 해당 키의 `Err` 값으로 남고 나머지 조회를 막지 않습니다.
    pub async fn get_multiple_prices(&self, coins: &[String]) -> HashMap<String, TickerResult> {
        let mut prices = HashMap::new();
        for coin in coins {
            let result = self.get_ticker_price(coin).await;
            prices.insert(coin.trim().to_uppercase(), result);
        }
        prices
    }
}

impl std::fmt::Debug for BitgetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitgetClient")
            .field("config", &self.config)
            .finish()
    }
}
