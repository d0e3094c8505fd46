use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;

/// `len` random bytes, hex encoded (so the result has `2 * len` chars).
pub fn random_hex_id(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn base64_encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn base64_decode(s: &str) -> Result<Vec<u8>, String> {
    STANDARD
        .decode(s.trim().as_bytes())
        .map_err(|e| format!("base64 decode failed: {e}"))
}
