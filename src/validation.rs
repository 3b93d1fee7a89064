use crate::error::{AppError, AppResult};

// =============================================================================
// Validation Constants
// =============================================================================

/// Exact length of a token plaintext.
///
/// 26 base32 characters carry the same 130 bits as 16 random bytes encoded
/// without padding.
pub const TOKEN_PLAINTEXT_LENGTH: usize = 26;

/// RFC 4648 base32 alphabet, the only characters a token plaintext may contain.
pub const TOKEN_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Validate the structure of a bearer token plaintext.
///
/// Rules:
/// - Must not be empty
/// - Must be exactly 26 bytes long
/// - Must only contain base32 characters (`A-Z`, `2-7`)
///
/// This runs before any lookup so malformed input never reaches the
/// collaborator. Callers exposing the result to clients must not reveal which
/// rule failed.
pub fn validate_token_plaintext(token: &str) -> AppResult<()> {
    if token.is_empty() {
        return Err(AppError::BadRequest("token must be provided".to_string()));
    }

    if token.len() != TOKEN_PLAINTEXT_LENGTH {
        return Err(AppError::BadRequest(format!(
            "token must be {TOKEN_PLAINTEXT_LENGTH} bytes long"
        )));
    }

    if !token.bytes().all(|b| TOKEN_ALPHABET.contains(&b)) {
        return Err(AppError::BadRequest(
            "token must only contain base32 characters".to_string(),
        ));
    }

    Ok(())
}

/// Parse a positive resource id from a path parameter.
///
/// Anything that is not a positive integer is reported as not found, the same
/// as an id that does not exist.
pub fn parse_id_param(raw: &str) -> AppResult<i64> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(AppError::NotFound),
    }
}
