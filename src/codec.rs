//! Obfuscation Codec
//!
//! 호스팅 서버에 평문 JSON이 그대로 노출되지 않도록 하는 가역 변환입니다.
//! UTF-8 바이트를 고정 키로 XOR 한 뒤 base64 로 인코딩합니다.
//!
//! 암호화가 아닙니다. 기밀성을 보장하지 않으며, 키는 바이너리에 그대로 들어 있습니다.
//! 블롭을 우연히 열어본 사람이 내용을 바로 읽지 못하게 하는 정도의 장치입니다.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// 반복 XOR 키
const XOR_KEY: &[u8] = b"tutor-vault-v1";

/// 한 번에 변환하는 바이트 수 (32KB)
const CHUNK_SIZE: usize = 32 * 1024;

fn xor_in_place(bytes: &mut [u8], offset: usize) {
    for (i, b) in bytes.iter_mut().enumerate() {
        *b ^= XOR_KEY[(offset + i) % XOR_KEY.len()];
    }
}

/// 평문 → 난독화 문자열
pub fn obfuscate(plaintext: &str) -> String {
    let mut bytes = plaintext.as_bytes().to_vec();
    for (index, chunk) in bytes.chunks_mut(CHUNK_SIZE).enumerate() {
        xor_in_place(chunk, index * CHUNK_SIZE);
    }
    BASE64.encode(bytes)
}

/// 난독화 문자열 → 평문
///
/// 난독화되지 않은 레거시 페이로드가 섞여 있으므로, 디코딩에 실패하면
/// 입력을 그대로 돌려줍니다.
pub fn deobfuscate(encoded: &str) -> String {
    try_deobfuscate(encoded).unwrap_or_else(|| encoded.to_string())
}

fn try_deobfuscate(encoded: &str) -> Option<String> {
    let mut bytes = BASE64.decode(encoded.trim()).ok()?;
    for (index, chunk) in bytes.chunks_mut(CHUNK_SIZE).enumerate() {
        xor_in_place(chunk, index * CHUNK_SIZE);
    }
    String::from_utf8(bytes).ok()
}
