//! Bearer credentials of the form `datacollab_<lookup>_<secret>`.
//!
//! The lookup half is stored in clear and indexed so validation finds the
//! row in one query; only an Argon2id hash of the whole token is kept.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::Rng;

use crate::error::{Error, Result};

const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
const ARGON2_ITERATIONS: u32 = 1;
const ARGON2_PARALLELISM: u32 = 4;
const ARGON2_OUTPUT_LEN: usize = 32;

const TOKEN_PREFIX: &str = "datacollab";
const LOOKUP_BYTES: usize = 4;
const SECRET_BYTES: usize = 12;

/// A freshly minted token. `raw` is shown to its holder once and never stored.
#[derive(Debug, Clone)]
pub struct GeneratedToken {
    pub raw: String,
    pub lookup: String,
    pub hash: String,
}

/// The two halves of a well-formed raw token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedToken<'a> {
    pub lookup: &'a str,
    pub secret: &'a str,
}

pub struct TokenGenerator {
    argon2: Argon2<'static>,
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGenerator {
    #[must_use]
    pub fn new() -> Self {
        let params = Params::new(
            ARGON2_MEMORY_KIB,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(ARGON2_OUTPUT_LEN),
        )
        .unwrap_or_default();

        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    pub fn generate(&self) -> Result<GeneratedToken> {
        let lookup = random_hex(LOOKUP_BYTES);
        let raw = format!("{TOKEN_PREFIX}_{lookup}_{}", random_hex(SECRET_BYTES));
        let hash = self.hash(&raw)?;
        Ok(GeneratedToken { raw, lookup, hash })
    }

    pub fn hash(&self, token: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(token.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::TokenHash(e.to_string()))
    }

    /// Returns false on a mismatch; errors only when `hash` is unreadable.
    pub fn verify(&self, token: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| Error::TokenHash(e.to_string()))?;

        match self.argon2.verify_password(token.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::TokenHash(e.to_string())),
        }
    }
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill(bytes.as_mut_slice());
    hex::encode(bytes)
}

fn is_hex_of(part: &str, bytes: usize) -> bool {
    part.len() == bytes * 2 && part.bytes().all(|b| b.is_ascii_hexdigit())
}

pub fn parse_token(token: &str) -> Result<ParsedToken<'_>> {
    let rest = token
        .strip_prefix(TOKEN_PREFIX)
        .and_then(|rest| rest.strip_prefix('_'))
        .ok_or(Error::InvalidTokenFormat)?;
    let (lookup, secret) = rest.split_once('_').ok_or(Error::InvalidTokenFormat)?;

    if !is_hex_of(lookup, LOOKUP_BYTES) || !is_hex_of(secret, SECRET_BYTES) {
        return Err(Error::InvalidTokenFormat);
    }
    Ok(ParsedToken { lookup, secret })
}
