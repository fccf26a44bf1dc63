//! Session token generation
//!
//! Tokens are 128-bit random values encoded as lowercase hex. They are
//! opaque to clients and never derived from the identity.

/// Length of a session token in bytes (before hex encoding)
pub const TOKEN_LENGTH: usize = 16;

/// Generate a random session token (32 hex chars)
///
/// # Panics
/// Panics if the system random number generator fails (extremely rare).
/// Use `try_generate_token` if you need to handle this case.
pub fn generate_token() -> String {
    try_generate_token().expect("RNG failed - system entropy source unavailable")
}

/// Try to generate a session token, returning an error if RNG fails
pub fn try_generate_token() -> Result<String, getrandom::Error> {
    let mut bytes = [0u8; TOKEN_LENGTH];
    getrandom::getrandom(&mut bytes)?;
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_format() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LENGTH * 2);
        assert!(token.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tokens_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
    }
}
