//! TOTP provider implementation using the `totp-rs` crate.

use lodge_application::TotpProvider;
use lodge_core::{AppError, AppResult};
use totp_rs::{Algorithm, Secret, TOTP};

/// RFC 6238 TOTP: SHA-1, 6 digits, 30-second step, ±1 step skew.
#[derive(Clone)]
pub struct TotpRsProvider {
    issuer: String,
}

impl TotpRsProvider {
    /// Creates a provider; `issuer` labels entries in authenticator apps.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    fn totp_for(&self, secret_bytes: Vec<u8>, account_name: String) -> AppResult<TOTP> {
        TOTP::new(
            Algorithm::SHA1,
            6,
            1, // skew: ±1 time step, matching deployed clients
            30,
            secret_bytes,
            Some(self.issuer.clone()),
            account_name,
        )
        .map_err(|error| AppError::Internal(format!("failed to create TOTP instance: {error}")))
    }
}

impl TotpProvider for TotpRsProvider {
    fn generate_secret(&self, account_name: &str) -> AppResult<(Vec<u8>, String, String)> {
        let secret = Secret::generate_secret();
        let secret_bytes = secret.to_bytes().map_err(|error| {
            AppError::Internal(format!("failed to generate TOTP secret: {error}"))
        })?;

        let totp = self.totp_for(secret_bytes.clone(), account_name.to_owned())?;
        let base32 = secret.to_encoded().to_string();
        let otpauth_uri = totp.get_url();

        Ok((secret_bytes, base32, otpauth_uri))
    }

    fn verify_code(&self, secret_bytes: &[u8], code: &str) -> AppResult<bool> {
        let totp = self.totp_for(secret_bytes.to_vec(), String::new())?;
        totp.check_current(code)
            .map_err(|error| AppError::Internal(format!("failed to verify TOTP code: {error}")))
    }
}
