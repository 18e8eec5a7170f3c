// src/token.rs
//! Ownership tokens.
//!
//! A token is a bearer secret scoped to one poll. Only its SHA-256 digest is
//! stored; the plaintext is handed to the creator once.
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const TOKEN_BYTES: usize = 32;

/// Freshly issued token: plaintext for the caller, hash for storage.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub plaintext: String,
    pub hash: Vec<u8>,
}

pub fn issue() -> IssuedToken {
    let mut secret = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut secret);

    let plaintext = hex::encode(secret);
    let hash = hash(&plaintext);

    IssuedToken { plaintext, hash }
}

pub fn hash(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

pub fn verify(plaintext: &str, stored_hash: &[u8]) -> bool {
    hash(plaintext).ct_eq(stored_hash).into()
}
