//! Bitget 요청 서명.
//!
//! canonical 메시지 = `timestamp + 대문자 HTTP 메서드 + 경로(쿼리 포함) + 본문`.
//! 본문은 실제 전송되는 바이트와 동일해야 합니다 — 본문이 없으면 빈 문자열이며
//! `"{}"`가 아닙니다. 직렬화(키 순서, 구분자, 공백)가 바뀌면 서명이 무효가 되므로
//! 서명에 쓴 본문 문자열을 그대로 전송해야 합니다.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 서명 생성.
///
/// 동일한 입력은 항상 동일한 서명을 반환합니다 (부수 효과 없음).
///
/// # Arguments
///
/// * `secret_key` - API 시크릿 (UTF-8 바이트가 HMAC 키로 사용됨)
/// * `timestamp_millis` - epoch 밀리초 문자열
/// * `method` - HTTP 메서드 (대문자로 정규화됨)
/// * `request_path` - 쿼리 문자열을 포함한 요청 경로
/// * `body` - 전송 본문 그대로 (없으면 빈 문자열)
pub fn sign(
    secret_key: &str,
    timestamp_millis: &str,
    method: &str,
    request_path: &str,
    body: &str,
) -> String {
    let message = format!(
        "{}{}{}{}",
        timestamp_millis,
        method.to_uppercase(),
        request_path,
        body
    );
    // HMAC은 임의 길이 키를 허용하므로 실패하지 않음
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}
