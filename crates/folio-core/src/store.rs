//! 문서 단위 영속화 추상화.
//!
//! 계약 캐시, 거래 로그, 기준 스냅샷은 모두 "이름 있는 JSON 문서"로 저장됩니다.
//! `DocumentStore` trait은 get/put 두 연산만 노출하여
//! 파일 기반 구현을 추후 트랜잭션 스토어로 교체할 수 있게 합니다.
//!
//! # 동시성 주의
//!
//! 기본 구현(`JsonFileStore`)은 잠금 없이 문서 전체를 덮어쓰므로
//! 여러 프로세스가 같은 디렉터리를 공유하면 갱신이 유실될 수 있습니다.
//! 단일 프로세스, 단일 인스턴스 사용을 전제로 합니다.

use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

/// 문서 스토어 에러.
#[derive(Debug, Error)]
pub enum StoreError {
    /// 문서 읽기 실패 (I/O 또는 손상된 JSON)
    #[error("문서 읽기 실패 [{key}]: {reason}")]
    Read { key: String, reason: String },

    /// 문서 쓰기 실패
    #[error("문서 쓰기 실패 [{key}]: {reason}")]
    Write { key: String, reason: String },
}

/// 이름 있는 JSON 문서의 get/put 인터페이스.
///
/// 키는 확장자 없는 문서 이름입니다 (예: `contract_cache`, `trading_log`).
pub trait DocumentStore: Send + Sync {
    /// 문서 조회. 존재하지 않으면 `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// 문서 저장 (기존 문서는 전체 덮어쓰기).
    fn put(&self, key: &str, document: &Value) -> Result<(), StoreError>;
}

// =============================================================================
// JsonFileStore
// =============================================================================

/// 디렉터리 아래 `<key>.json` 파일 하나당 문서 하나를 저장하는 스토어.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    base_dir: PathBuf,
}

impl JsonFileStore {
    /// 지정한 디렉터리를 사용하는 스토어 생성.
    ///
    /// 디렉터리는 첫 `put` 호출 시 생성됩니다.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{key}.json"))
    }
}

impl DocumentStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(|e| StoreError::Read {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let value = serde_json::from_str(&text).map_err(|e| StoreError::Read {
            key: key.to_string(),
            reason: format!("JSON 파싱 실패: {e}"),
        })?;
        Ok(Some(value))
    }

    fn put(&self, key: &str, document: &Value) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.base_dir).map_err(|e| StoreError::Write {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let text = serde_json::to_string_pretty(document).map_err(|e| StoreError::Write {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(self.path_for(key), text).map_err(|e| StoreError::Write {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// 테스트용 인메모리 스토어.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    /// 빈 스토어 생성.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let documents = self.documents.lock().map_err(|e| StoreError::Read {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(documents.get(key).cloned())
    }

    fn put(&self, key: &str, document: &Value) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().map_err(|e| StoreError::Write {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        documents.insert(key.to_string(), document.clone());
        Ok(())
    }
}
