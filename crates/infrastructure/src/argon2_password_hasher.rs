//! Argon2id password hasher with configurable parameters and drift
//! detection.

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordVerifier, Version};
use lodge_application::PasswordHasher as PasswordHasherPort;
use lodge_core::{AppError, AppResult};

/// Tunable Argon2id parameters, normally sourced from the environment.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Config {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Iteration count.
    pub iterations: u32,
    /// Lane count.
    pub parallelism: u32,
    /// Output length in bytes.
    pub output_length: usize,
}

impl Default for Argon2Config {
    fn default() -> Self {
        // OWASP Password Storage baseline: m=19456, t=2, p=1.
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
            output_length: 32,
        }
    }
}

/// Argon2id hasher.
///
/// Every produced hash self-describes its parameters, so
/// [`PasswordHasherPort::needs_rehash`] can detect configuration drift and
/// the login path can transparently upgrade old hashes. A dummy hash is
/// pre-generated at construction and verified against for unknown
/// accounts, keeping unknown-email and wrong-password timings aligned.
#[derive(Clone)]
pub struct Argon2PasswordHasher {
    argon2: Argon2<'static>,
    config: Argon2Config,
    dummy_hash: String,
}

impl Argon2PasswordHasher {
    /// Creates a hasher from explicit parameters.
    pub fn new(config: Argon2Config) -> AppResult<Self> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            Some(config.output_length),
        )
        .map_err(|error| AppError::Validation(format!("invalid argon2 parameters: {error}")))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
        let dummy_hash = argon2::PasswordHasher::hash_password(
            &argon2,
            b"lodge-dummy-password-for-timing",
            &salt,
        )
        .map_err(|error| AppError::Internal(format!("failed to pre-generate dummy hash: {error}")))?
        .to_string();

        Ok(Self {
            argon2,
            config,
            dummy_hash,
        })
    }
}

impl PasswordHasherPort for Argon2PasswordHasher {
    fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);

        let hash = argon2::PasswordHasher::hash_password(&self.argon2, password.as_bytes(), &salt)
            .map_err(|error| AppError::Internal(format!("failed to hash password: {error}")))?;

        Ok(hash.to_string())
    }

    fn verify_password(&self, password: &str, hash: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(hash).map_err(|error| {
            AppError::Internal(format!("failed to parse password hash: {error}"))
        })?;

        match self
            .argon2
            .verify_password(password.as_bytes(), &parsed_hash)
        {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(error) => Err(AppError::Internal(format!(
                "password verification failed: {error}"
            ))),
        }
    }

    fn needs_rehash(&self, hash: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(hash).map_err(|error| {
            AppError::Internal(format!("failed to parse password hash: {error}"))
        })?;

        let stored = Params::try_from(&parsed_hash).map_err(|error| {
            AppError::Internal(format!("failed to read stored hash parameters: {error}"))
        })?;

        Ok(stored.m_cost() != self.config.memory_kib
            || stored.t_cost() != self.config.iterations
            || stored.p_cost() != self.config.parallelism)
    }

    fn verify_dummy(&self, password: &str) {
        let _ = self.verify_password(password, &self.dummy_hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodge_application::PasswordHasher as PasswordHasherPort;

    fn hasher() -> Argon2PasswordHasher {
        // Cheap parameters keep the test fast; drift detection only
        // compares, it never re-derives.
        let result = Argon2PasswordHasher::new(Argon2Config {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
            output_length: 32,
        });
        match result {
            Ok(hasher) => hasher,
            Err(error) => panic!("hasher construction failed: {error}"),
        }
    }

    #[test]
    fn hash_and_verify_round_trip() -> AppResult<()> {
        let hasher = hasher();
        let hash = hasher.hash_password("my-secret-password")?;
        assert!(hasher.verify_password("my-secret-password", &hash)?);
        assert!(!hasher.verify_password("wrong-password", &hash)?);
        Ok(())
    }

    #[test]
    fn fresh_hash_does_not_need_rehash() -> AppResult<()> {
        let hasher = hasher();
        let hash = hasher.hash_password("password-one")?;
        assert!(!hasher.needs_rehash(&hash)?);
        Ok(())
    }

    #[test]
    fn parameter_drift_is_detected() -> AppResult<()> {
        let old = hasher();
        let hash = old.hash_password("password-one")?;

        let upgraded = Argon2PasswordHasher::new(Argon2Config {
            memory_kib: 2048,
            iterations: 1,
            parallelism: 1,
            output_length: 32,
        })?;
        assert!(upgraded.needs_rehash(&hash)?);
        // The old hash still verifies; only the parameters are stale.
        assert!(upgraded.verify_password("password-one", &hash)?);
        Ok(())
    }
}
