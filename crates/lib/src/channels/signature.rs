//! `X-Line-Signature` verification: base64(HMAC-SHA256(channel secret, raw body)).

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature on every webhook POST.
pub const SIGNATURE_HEADER: &str = "X-Line-Signature";

/// Sign a body with the channel secret and return the base64-encoded digest.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length; new_from_slice cannot fail for Hmac<Sha256>.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(body);
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// True when `signature` equals the signature of `body` under `secret`.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let expected = sign_body(secret, body);
    !expected.is_empty() && constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
