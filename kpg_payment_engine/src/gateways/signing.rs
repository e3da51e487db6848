//! Request signing shared by the gateway adapters.
//!
//! Every gateway signs the same way: the request fields are sorted by key, empty values are dropped, the rest are
//! joined as `key=value` pairs separated by `&`, and the result is HMAC-SHA256'd with the merchant key and base64
//! encoded.
use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use kpg_common::Secret;
use sha2::Sha256;

use crate::gateways::GatewayError;

type HmacSha256 = Hmac<Sha256>;

pub type SigningFields = BTreeMap<String, String>;

pub fn calculate_hmac(key: &Secret<String>, data: &[u8]) -> Result<String, GatewayError> {
    let mut mac =
        HmacSha256::new_from_slice(key.reveal().as_bytes()).map_err(|e| GatewayError::Signing(e.to_string()))?;
    mac.update(data);
    let result = mac.finalize().into_bytes();
    Ok(base64::encode(result))
}

/// `a=1&b=2&c=3` over the non-empty fields, in key order.
pub fn canonical_string(fields: &SigningFields) -> String {
    fields
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<String>>()
        .join("&")
}

pub fn sign_fields(fields: &SigningFields, key: &Secret<String>) -> Result<String, GatewayError> {
    calculate_hmac(key, canonical_string(fields).as_bytes())
}

/// Builds [`SigningFields`] from a list of `(key, value)` pairs.
pub fn fields<K: ToString, V: ToString>(pairs: &[(K, V)]) -> SigningFields {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

pub fn random_nonce() -> String {
    use rand::{distributions::Alphanumeric, thread_rng, Rng};
    thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect()
}
