//! Bearer tokens.
//!
//! A token's plaintext is 16 random bytes, hex encoded. Only its SHA-256
//! digest is ever stored or compared; lookups go through the digest and the
//! token's scope, with an expiry predicate evaluated by the store.

use chrono::{TimeDelta, Utc};
use sha2::{Digest, Sha256};
use shared::api::TOKEN_PLAINTEXT_LEN;

use crate::{
    models::{Token, TokenScope, User},
    repos::{StoreError, UserRepo},
};

/// Lifetime of an account activation token.
pub const ACTIVATION_TTL: TimeDelta = TimeDelta::days(3);

/// Lifetime of an authentication token.
pub const AUTHENTICATION_TTL: TimeDelta = TimeDelta::hours(24);

/// Creates a fresh token for `user_id`, valid for `ttl`.
pub fn generate(user_id: i64, ttl: TimeDelta, scope: TokenScope) -> Token {
    let bytes: [u8; 16] = rand::random();
    let plaintext = hex::encode(bytes);

    Token {
        hash: digest(&plaintext),
        plaintext,
        user_id,
        expiry: Utc::now() + ttl,
        scope,
    }
}

pub fn digest(plaintext: &str) -> [u8; 32] {
    Sha256::digest(plaintext.as_bytes()).into()
}

/// Whether `plaintext` has the shape of a token this service issues.
pub fn is_well_formed(plaintext: &str) -> bool {
    plaintext.len() == TOKEN_PLAINTEXT_LEN
        && plaintext
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Finds the user owning an unexpired `scope` token with this plaintext.
///
/// Malformed plaintexts resolve to `None` without a lookup.
pub async fn resolve(
    users: &dyn UserRepo,
    scope: TokenScope,
    plaintext: &str,
) -> Result<Option<User>, StoreError> {
    if !is_well_formed(plaintext) {
        return Ok(None);
    }

    users.find_for_token(scope, &digest(plaintext)).await
}
