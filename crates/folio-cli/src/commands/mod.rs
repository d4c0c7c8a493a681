//! CLI 서브커맨드 구현.

pub mod auto_trade;
pub mod contracts;
pub mod log;
pub mod order;
pub mod price;

use std::env;
use std::sync::Arc;

use anyhow::{bail, Result};

use folio_core::store::{DocumentStore, JsonFileStore};
use folio_exchange::{BitgetClient, BitgetConfig, ContractDirectory};

/// 서브커맨드가 공유하는 클라이언트/스토어 묶음.
pub struct AppContext {
    pub client: Arc<BitgetClient>,
    pub store: Arc<dyn DocumentStore>,
}

/// 환경변수와 데이터 디렉터리로 컨텍스트 구성.
///
/// 자격 증명은 여기서 검증하지 않습니다 — 시세/계약 조회는
/// 서명이 필요 없으므로 빈 키로도 동작합니다. 주문 경로는
/// [`require_credentials`]로 먼저 확인하세요.
pub fn build_context(data_dir: &str) -> Result<AppContext> {
    let api_key = env::var("BITGET_API_KEY").unwrap_or_default();
    let secret_key = env::var("BITGET_SECRET_KEY").unwrap_or_default();
    let passphrase = env::var("BITGET_PASSPHRASE").unwrap_or_default();
    let sandbox = matches!(
        env::var("BITGET_SANDBOX").as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE")
    );

    let mut config = BitgetConfig::new(api_key, secret_key, passphrase, sandbox);
    if let Ok(base_url) = env::var("BITGET_BASE_URL") {
        config = config.with_base_url(base_url);
    }

    let store: Arc<dyn DocumentStore> = Arc::new(JsonFileStore::new(data_dir));
    let directory = Arc::new(ContractDirectory::new(
        config.base_url.clone(),
        config.product_type(),
        store.clone(),
    ));
    let client = Arc::new(BitgetClient::new(config, directory));

    Ok(AppContext { client, store })
}

/// 주문 경로에 필요한 자격 증명 확인.
pub fn require_credentials() -> Result<()> {
    for key in ["BITGET_API_KEY", "BITGET_SECRET_KEY", "BITGET_PASSPHRASE"] {
        if env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true) {
            bail!("환경변수 {key}가 설정되지 않았습니다 (.env 파일 참조)");
        }
    }
    Ok(())
}
