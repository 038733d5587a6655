use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the base64 HMAC-SHA256 of the raw webhook body.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Compute the signature header value for `payload` under `secret`.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length
        Err(_) => return String::new(),
    };
    mac.update(payload);
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Returns `true` only when `signature` is valid base64 and matches the HMAC of `payload`.
/// The digest comparison runs in constant time.
pub fn verify(secret: &str, signature: &str, payload: &[u8]) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, secret: &str, signature: &str, payload: &[u8]) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HmacSignatureVerifier;

impl SignatureVerifier for HmacSignatureVerifier {
    fn verify(&self, secret: &str, signature: &str, payload: &[u8]) -> bool {
        verify(secret, signature, payload)
    }
}
