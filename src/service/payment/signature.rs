//! Robokassa signature scheme: a digest over colon-joined fields with `Shp_` parameters
//! appended as `key=value`, sorted by key.

use md5::Md5;
use sha2::{Digest, Sha256, Sha512};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    #[default]
    Md5,
    Sha256,
    Sha512,
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            _ => Err(format!("Unknown hash algorithm: {}", s)),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Md5 => write!(f, "md5"),
            HashAlgorithm::Sha256 => write!(f, "sha256"),
            HashAlgorithm::Sha512 => write!(f, "sha512"),
        }
    }
}

impl HashAlgorithm {
    pub fn hex_digest(&self, input: &str) -> String {
        match self {
            HashAlgorithm::Md5 => hex::encode_upper(Md5::digest(input.as_bytes())),
            HashAlgorithm::Sha256 => hex::encode_upper(Sha256::digest(input.as_bytes())),
            HashAlgorithm::Sha512 => hex::encode_upper(Sha512::digest(input.as_bytes())),
        }
    }
}

pub const CUSTOM_PARAM_PREFIX: &str = "Shp_";

/// `Shp_` parameters as `Shp_key=value`, sorted by key.
pub fn custom_params_segment(custom: &[(String, String)]) -> Vec<String> {
    let mut params: Vec<&(String, String)> = custom.iter().collect();
    params.sort_by(|a, b| a.0.cmp(&b.0));
    params.iter().map(|(key, value)| format!("{}={}", key, value)).collect()
}

/// `OutSum:InvId:Password2[:Shp_...]`, the string Robokassa signs on the result callback.
pub fn result_signature_base(out_sum: &str, inv_id: &str, password2: &str, custom: &[(String, String)]) -> String {
    let mut parts = vec![out_sum.to_string(), inv_id.to_string(), password2.to_string()];
    parts.extend(custom_params_segment(custom));
    parts.join(":")
}

/// `MerchantLogin:OutSum:InvId:Password1[:Shp_...]`, signed when the payment link is built.
pub fn checkout_signature_base(
    merchant_login: &str,
    out_sum: &str,
    inv_id: &str,
    password1: &str,
    custom: &[(String, String)],
) -> String {
    let mut parts = vec![
        merchant_login.to_string(),
        out_sum.to_string(),
        inv_id.to_string(),
        password1.to_string(),
    ];
    parts.extend(custom_params_segment(custom));
    parts.join(":")
}

pub fn result_signature(
    algorithm: HashAlgorithm,
    out_sum: &str,
    inv_id: &str,
    password2: &str,
    custom: &[(String, String)],
) -> String {
    algorithm.hex_digest(&result_signature_base(out_sum, inv_id, password2, custom))
}

pub fn checkout_signature(
    algorithm: HashAlgorithm,
    merchant_login: &str,
    out_sum: &str,
    inv_id: &str,
    password1: &str,
    custom: &[(String, String)],
) -> String {
    algorithm.hex_digest(&checkout_signature_base(
        merchant_login,
        out_sum,
        inv_id,
        password1,
        custom,
    ))
}

/// Case-insensitive comparison that does not exit early on the first differing byte.
pub fn signatures_match(expected: &str, presented: &str) -> bool {
    constant_time_eq(
        expected.to_ascii_uppercase().as_bytes(),
        presented.trim().to_ascii_uppercase().as_bytes(),
    )
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
