//! Random token and recovery-code generation.

use lodge_core::{AppError, AppResult};

/// Generates a 256-bit random token as 64 hex characters.
pub(crate) fn generate_token() -> AppResult<String> {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes)
        .map_err(|error| AppError::Internal(format!("failed to generate token: {error}")))?;
    Ok(to_hex(&bytes))
}

/// Computes the SHA-256 hex digest of a token for storage.
#[must_use]
pub(crate) fn hash_token(raw_token: &str) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    to_hex(&hasher.finalize())
}

/// Generates one recovery code in `xxxx-xxxx-xxxx-xxxx-xxxx` form.
///
/// Twenty hex characters carry exactly 80 bits of entropy.
pub(crate) fn generate_recovery_code() -> AppResult<String> {
    let mut bytes = [0u8; 10];
    getrandom::fill(&mut bytes)
        .map_err(|error| AppError::Internal(format!("failed to generate recovery code: {error}")))?;

    let hex = to_hex(&bytes);
    let groups: Vec<&str> = hex
        .as_bytes()
        .chunks(4)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or(""))
        .collect();
    Ok(groups.join("-"))
}

/// Strips separators so codes match however the user typed them.
#[must_use]
pub(crate) fn normalise_recovery_code(code: &str) -> String {
    code.chars()
        .filter(|ch| *ch != '-' && !ch.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(
        String::with_capacity(bytes.len() * 2),
        |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        },
    )
}
