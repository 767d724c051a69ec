use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hex SHA-256, the form refresh tokens and reset links are stored in.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare a presented token against a stored hash without early exit.
pub fn matches_hash(token: &str, stored_hash: &str) -> bool {
    let computed = hash_token(token);
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

pub fn generate_opaque_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// Six decimal digits, zero padded.
pub fn generate_numeric_code() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{n:06}")
}
