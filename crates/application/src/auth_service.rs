//! Authentication ports and application service.
//!
//! Owns the credential lifecycle: registration, login, access/refresh token
//! issuance and rotation, email verification, MFA enrolment and challenge
//! verification, password-gated sensitive actions, and account deletion
//! with re-registration tombstones. Responses never reveal whether an
//! email exists; the login-attempts audit trail distinguishes outcomes
//! internally.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use lodge_core::{AppError, AppResult};
use lodge_domain::{User, UserId, UserProfile};

use crate::permission_service::PermissionInvalidator;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// User row as seen by the auth flows.
#[derive(Debug, Clone)]
pub struct UserRecord {
    /// Unique user identifier.
    pub id: UserId,
    /// Canonical lowercased email.
    pub email: String,
    /// Username with original casing.
    pub username: String,
    /// Whether the email address has been verified.
    pub email_verified: bool,
    /// Argon2id password hash.
    pub password_hash: String,
    /// Whether TOTP MFA is enabled.
    pub mfa_enabled: bool,
    /// Encrypted TOTP secret, if enrolled.
    pub totp_secret_enc: Option<Vec<u8>>,
    /// Profile fields.
    pub profile: UserProfile,
    /// Account creation time.
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// Projects the record into the public domain shape.
    #[must_use]
    pub fn to_user(&self) -> User {
        User {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            email_verified: self.email_verified,
            mfa_enabled: self.mfa_enabled,
            profile: self.profile.clone(),
            created_at: self.created_at,
        }
    }
}

/// Inputs for the atomic registration insert.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Canonical lowercased email.
    pub email: String,
    /// Username with original casing.
    pub username: String,
    /// Lowercased uniqueness key for the username.
    pub username_lower: String,
    /// Argon2id password hash.
    pub password_hash: String,
}

/// A stored (hashed) recovery code.
#[derive(Debug, Clone)]
pub struct RecoveryCodeRecord {
    /// Row identifier.
    pub id: uuid::Uuid,
    /// Argon2id hash of the hyphen-stripped code.
    pub code_hash: String,
    /// When the code was consumed, if ever.
    pub used_at: Option<DateTime<Utc>>,
}

/// Identifier kinds a deletion tombstone can cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TombstoneKind {
    /// HMAC of the normalised email address.
    Email,
    /// HMAC of the lowercased username.
    Username,
}

impl TombstoneKind {
    /// Returns the storage string for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Username => "username",
        }
    }
}

/// One tombstone to write during account deletion.
#[derive(Debug, Clone)]
pub struct TombstoneEntry {
    /// Which identifier the HMAC covers.
    pub kind: TombstoneKind,
    /// Hex HMAC-SHA256 of the normalised identifier.
    pub identifier_hmac: String,
}

/// Outcome of presenting a refresh token for rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotateStatus {
    /// The token was live; it has been replaced by the new id.
    Rotated {
        /// Owner of the token family.
        user_id: UserId,
    },
    /// The token does not exist (never issued, or expired out).
    NotFound,
    /// The token was already consumed once: the family is compromised.
    Reused {
        /// Owner of the compromised family, when still known.
        user_id: Option<UserId>,
    },
}

// ---------------------------------------------------------------------------
// Repository ports
// ---------------------------------------------------------------------------

/// Repository port for user persistence.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Finds a user by canonical email.
    async fn find_by_email(&self, email: &str) -> AppResult<Option<UserRecord>>;

    /// Finds a user by the lowercased username key.
    async fn find_by_username(&self, username_lower: &str) -> AppResult<Option<UserRecord>>;

    /// Finds a user by id.
    async fn find_by_id(&self, user_id: UserId) -> AppResult<Option<UserRecord>>;

    /// Inserts the user and their pending email-verification row in one
    /// transaction. Unique violations surface as [`AppError::Conflict`].
    async fn create_with_verification(
        &self,
        new_user: &NewUser,
        token_hash: &str,
        token_expires_at: DateTime<Utc>,
    ) -> AppResult<UserId>;

    /// Replaces the stored password hash.
    async fn update_password_hash(&self, user_id: UserId, password_hash: &str) -> AppResult<()>;

    /// Marks the email address verified.
    async fn mark_email_verified(&self, user_id: UserId) -> AppResult<()>;

    /// Stores the encrypted secret, persists the hashed recovery codes, and
    /// flips the MFA flag in one transaction.
    async fn enable_mfa(
        &self,
        user_id: UserId,
        totp_secret_enc: &[u8],
        recovery_code_hashes: &[String],
    ) -> AppResult<()>;

    /// Clears the secret, recovery codes, and MFA flag in one transaction.
    async fn disable_mfa(&self, user_id: UserId) -> AppResult<()>;

    /// Updates profile fields.
    async fn update_profile(&self, user_id: UserId, profile: &UserProfile) -> AppResult<()>;

    /// Inserts the given tombstones and deletes the user row in one
    /// transaction.
    async fn delete_with_tombstones(
        &self,
        user_id: UserId,
        tombstones: &[TombstoneEntry],
    ) -> AppResult<()>;
}

/// Repository port for email-verification tokens.
#[async_trait]
pub trait VerificationTokenRepository: Send + Sync {
    /// Atomically consumes an unexpired, unconsumed token and returns its
    /// owner. Reuse and expiry are indistinguishable: both yield `None`.
    async fn consume_valid(&self, token_hash: &str) -> AppResult<Option<UserId>>;

    /// Replaces the user's verification token unless one was created inside
    /// the cooldown window. Returns whether the replacement happened.
    async fn replace_after_cooldown(
        &self,
        user_id: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        cooldown: Duration,
    ) -> AppResult<bool>;
}

/// Repository port for hashed MFA recovery codes.
#[async_trait]
pub trait RecoveryCodeRepository: Send + Sync {
    /// Lists every stored code for the user, used or not.
    async fn list(&self, user_id: UserId) -> AppResult<Vec<RecoveryCodeRecord>>;

    /// Marks one code as consumed.
    async fn mark_used(&self, code_id: uuid::Uuid) -> AppResult<()>;

    /// Replaces the user's full code set in one transaction.
    async fn replace_all(&self, user_id: UserId, code_hashes: &[String]) -> AppResult<()>;
}

/// Repository port for deletion tombstones.
#[async_trait]
pub trait TombstoneRepository: Send + Sync {
    /// True when a live tombstone exists for the identifier HMAC.
    async fn exists(&self, kind: TombstoneKind, identifier_hmac: &str) -> AppResult<bool>;

    /// Deletes tombstones older than the cutoff; returns how many.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}

/// Repository port for the login-attempts audit table.
#[async_trait]
pub trait LoginAttemptRepository: Send + Sync {
    /// Records one attempt.
    async fn record(
        &self,
        email: &str,
        user_id: Option<UserId>,
        success: bool,
        reason: &str,
    ) -> AppResult<()>;

    /// Deletes attempts older than the cutoff; returns how many.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}

// ---------------------------------------------------------------------------
// Coordination-store ports
// ---------------------------------------------------------------------------

/// Store port for rotating refresh-token families.
///
/// All three operations are atomic with respect to each other; `rotate`
/// in particular must observe exactly-once consumption per token id.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Registers a freshly issued token id for the user.
    async fn create(&self, user_id: UserId, token: &str, ttl: Duration) -> AppResult<()>;

    /// Consumes `old_token` and installs `new_token` in its place,
    /// sweeping expired ids from the user's set as a side effect.
    async fn rotate(
        &self,
        old_token: &str,
        new_token: &str,
        ttl: Duration,
    ) -> AppResult<RotateStatus>;

    /// Deletes every live token id of the user; returns how many.
    async fn revoke_all(&self, user_id: UserId) -> AppResult<u64>;
}

/// Store port for short-lived MFA login tickets.
#[async_trait]
pub trait MfaTicketStore: Send + Sync {
    /// Stores a ticket for the user.
    async fn store(&self, ticket: &str, user_id: UserId, ttl: Duration) -> AppResult<()>;

    /// Atomically consumes a ticket, returning its owner at most once.
    async fn consume(&self, ticket: &str) -> AppResult<Option<UserId>>;
}

/// Store port for MFA secrets awaiting confirmation.
#[async_trait]
pub trait PendingMfaStore: Send + Sync {
    /// Stores a pending encrypted secret and resets the attempt counter.
    async fn store(&self, user_id: UserId, secret_enc: &[u8], ttl: Duration) -> AppResult<()>;

    /// Atomically removes and returns the pending secret.
    async fn take(&self, user_id: UserId) -> AppResult<Option<Vec<u8>>>;

    /// Re-stores the secret after a failed confirmation so retry works.
    async fn restore(&self, user_id: UserId, secret_enc: &[u8], ttl: Duration) -> AppResult<()>;

    /// Increments and returns the failed-confirmation counter.
    async fn increment_attempts(&self, user_id: UserId, ttl: Duration) -> AppResult<u32>;

    /// Drops the pending secret and the attempt counter.
    async fn clear(&self, user_id: UserId) -> AppResult<()>;
}

// ---------------------------------------------------------------------------
// Crypto and delivery ports
// ---------------------------------------------------------------------------

/// Port for password hashing.
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    /// Hashes a plaintext password with Argon2id under current parameters.
    fn hash_password(&self, password: &str) -> AppResult<String>;

    /// Verifies a plaintext password against a stored hash.
    fn verify_password(&self, password: &str, hash: &str) -> AppResult<bool>;

    /// True when the hash was produced with parameters that differ from
    /// the current configuration and should be rewritten after a
    /// successful verification.
    fn needs_rehash(&self, hash: &str) -> AppResult<bool>;

    /// Runs a verification against a pre-generated dummy hash so unknown
    /// emails cost the same as wrong passwords.
    fn verify_dummy(&self, password: &str);
}

/// Port for stateless access-token issuance and validation.
pub trait AccessTokenIssuer: Send + Sync {
    /// Issues a signed access token for the user.
    fn issue(&self, user_id: UserId) -> AppResult<String>;

    /// Validates a token and returns its subject.
    ///
    /// Expired tokens yield [`AppError::TokenExpired`]; everything else
    /// invalid yields [`AppError::Unauthorized`].
    fn validate(&self, token: &str) -> AppResult<UserId>;
}

/// Port for TOTP operations.
pub trait TotpProvider: Send + Sync {
    /// Generates a new secret; returns `(secret_bytes, base32, otpauth_uri)`.
    fn generate_secret(&self, account_name: &str) -> AppResult<(Vec<u8>, String, String)>;

    /// Verifies a code against a secret with ±1 step tolerance.
    fn verify_code(&self, secret_bytes: &[u8], code: &str) -> AppResult<bool>;
}

/// Port for encrypting TOTP secrets at rest.
pub trait SecretEncryptor: Send + Sync {
    /// Encrypts a secret for storage.
    fn encrypt(&self, plaintext: &[u8]) -> AppResult<Vec<u8>>;

    /// Decrypts a stored secret.
    fn decrypt(&self, ciphertext: &[u8]) -> AppResult<Vec<u8>>;
}

/// Port for keyed identifier hashing (deletion tombstones).
pub trait IdentityHasher: Send + Sync {
    /// Returns the hex HMAC-SHA256 of the normalised identifier.
    fn hash_identifier(&self, identifier: &str) -> String;
}

/// Port for sending emails.
#[async_trait]
pub trait EmailService: Send + Sync {
    /// Sends a plain-text email.
    async fn send_email(&self, to: &str, subject: &str, text_body: &str) -> AppResult<()>;
}

/// Port consulted for disposable-email domains during registration.
pub trait DisposableEmailPolicy: Send + Sync {
    /// True when the domain is on the blocklist. Returns `false` whenever
    /// the blocklist is disabled or has not loaded.
    fn is_blocked(&self, domain: &str) -> bool;
}

/// Port exposing the server owner for deletion refusal and permission
/// short-circuits.
#[async_trait]
pub trait ServerOwnerSource: Send + Sync {
    /// The designated owner account of this deployment.
    async fn owner_id(&self) -> AppResult<UserId>;
}

// ---------------------------------------------------------------------------
// Responses and configuration
// ---------------------------------------------------------------------------

/// An access + refresh token pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    /// Signed JWT access token.
    pub access_token: String,
    /// Opaque rotating refresh token.
    pub refresh_token: String,
}

/// What a successful password login yields.
#[derive(Debug)]
pub enum LoginOutcome {
    /// Fully authenticated; tokens issued.
    Tokens {
        /// The issued token pair.
        tokens: TokenPair,
        /// The authenticated user.
        user: User,
    },
    /// Password accepted but an MFA code must follow.
    MfaChallenge {
        /// Ticket binding this login to the MFA verify step.
        ticket: String,
    },
}

/// TOTP enrolment data returned for authenticator setup.
#[derive(Debug, Clone)]
pub struct MfaEnrollment {
    /// Base32-encoded secret for manual entry.
    pub secret_base32: String,
    /// `otpauth://` URI for QR display.
    pub otpauth_uri: String,
}

/// Tunables for the auth flows.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Refresh token lifetime.
    pub refresh_token_ttl: Duration,
    /// Email-verification token lifetime.
    pub verification_token_ttl: Duration,
    /// Minimum gap between verification emails per user.
    pub verification_cooldown: Duration,
    /// MFA login ticket lifetime.
    pub mfa_ticket_ttl: Duration,
    /// Pending (unconfirmed) MFA secret lifetime.
    pub pending_mfa_ttl: Duration,
    /// Failed MFA confirmation attempts before enrolment locks.
    pub mfa_confirm_attempt_cap: u32,
    /// Whether deletion also tombstones the username.
    pub tombstone_usernames: bool,
    /// Public base URL used in verification links.
    pub server_url: String,
    /// Server display name used in email subjects and TOTP issuer.
    pub server_name: String,
}

/// Number of recovery codes issued per enrolment or regeneration.
pub const RECOVERY_CODE_COUNT: usize = 10;

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Application service for the credential lifecycle.
#[derive(Clone)]
pub struct AuthService {
    pub(crate) users: Arc<dyn UserRepository>,
    pub(crate) verifications: Arc<dyn VerificationTokenRepository>,
    pub(crate) recovery_codes: Arc<dyn RecoveryCodeRepository>,
    pub(crate) tombstones: Arc<dyn TombstoneRepository>,
    pub(crate) login_attempts: Arc<dyn LoginAttemptRepository>,
    pub(crate) refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub(crate) mfa_tickets: Arc<dyn MfaTicketStore>,
    pub(crate) pending_mfa: Arc<dyn PendingMfaStore>,
    pub(crate) password_hasher: Arc<dyn PasswordHasher>,
    pub(crate) access_tokens: Arc<dyn AccessTokenIssuer>,
    pub(crate) totp: Arc<dyn TotpProvider>,
    pub(crate) secret_encryptor: Arc<dyn SecretEncryptor>,
    pub(crate) identity_hasher: Arc<dyn IdentityHasher>,
    pub(crate) email: Arc<dyn EmailService>,
    pub(crate) disposable_emails: Arc<dyn DisposableEmailPolicy>,
    pub(crate) server_owner: Arc<dyn ServerOwnerSource>,
    pub(crate) permission_invalidator: Arc<dyn PermissionInvalidator>,
    pub(crate) config: AuthConfig,
}

/// Constructor dependencies for [`AuthService`], grouped to keep the
/// signature readable.
pub struct AuthServiceDeps {
    /// User persistence.
    pub users: Arc<dyn UserRepository>,
    /// Verification-token persistence.
    pub verifications: Arc<dyn VerificationTokenRepository>,
    /// Recovery-code persistence.
    pub recovery_codes: Arc<dyn RecoveryCodeRepository>,
    /// Tombstone persistence.
    pub tombstones: Arc<dyn TombstoneRepository>,
    /// Login-attempt audit persistence.
    pub login_attempts: Arc<dyn LoginAttemptRepository>,
    /// Refresh token family store.
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    /// MFA ticket store.
    pub mfa_tickets: Arc<dyn MfaTicketStore>,
    /// Pending MFA secret store.
    pub pending_mfa: Arc<dyn PendingMfaStore>,
    /// Password hashing.
    pub password_hasher: Arc<dyn PasswordHasher>,
    /// Access token issuance.
    pub access_tokens: Arc<dyn AccessTokenIssuer>,
    /// TOTP operations.
    pub totp: Arc<dyn TotpProvider>,
    /// Secret-at-rest encryption.
    pub secret_encryptor: Arc<dyn SecretEncryptor>,
    /// Tombstone identifier hashing.
    pub identity_hasher: Arc<dyn IdentityHasher>,
    /// Email delivery.
    pub email: Arc<dyn EmailService>,
    /// Disposable-email policy.
    pub disposable_emails: Arc<dyn DisposableEmailPolicy>,
    /// Server owner lookup.
    pub server_owner: Arc<dyn ServerOwnerSource>,
    /// Permission cache invalidation on account deletion.
    pub permission_invalidator: Arc<dyn PermissionInvalidator>,
}

impl AuthService {
    /// Creates a new auth service.
    #[must_use]
    pub fn new(deps: AuthServiceDeps, config: AuthConfig) -> Self {
        Self {
            users: deps.users,
            verifications: deps.verifications,
            recovery_codes: deps.recovery_codes,
            tombstones: deps.tombstones,
            login_attempts: deps.login_attempts,
            refresh_tokens: deps.refresh_tokens,
            mfa_tickets: deps.mfa_tickets,
            pending_mfa: deps.pending_mfa,
            password_hasher: deps.password_hasher,
            access_tokens: deps.access_tokens,
            totp: deps.totp,
            secret_encryptor: deps.secret_encryptor,
            identity_hasher: deps.identity_hasher,
            email: deps.email,
            disposable_emails: deps.disposable_emails,
            server_owner: deps.server_owner,
            permission_invalidator: deps.permission_invalidator,
            config,
        }
    }

    /// Returns a user by id, if it exists.
    pub async fn find_user(&self, user_id: UserId) -> AppResult<Option<User>> {
        Ok(self
            .users
            .find_by_id(user_id)
            .await?
            .map(|record| record.to_user()))
    }

    /// Updates the caller's profile fields.
    pub async fn update_profile(&self, user_id: UserId, profile: &UserProfile) -> AppResult<()> {
        self.users.update_profile(user_id, profile).await
    }

    /// Validates a bearer access token and returns its subject.
    pub fn validate_access_token(&self, token: &str) -> AppResult<UserId> {
        self.access_tokens.validate(token)
    }

    /// Checks the caller's password, as used by sensitive-action gates.
    pub async fn verify_password(&self, user_id: UserId, password: &str) -> AppResult<()> {
        let user = self.require_user(user_id).await?;
        let valid = self
            .password_hasher
            .verify_password(password, &user.password_hash)?;
        if !valid {
            return Err(AppError::InvalidCredentials);
        }
        Ok(())
    }

    pub(crate) async fn require_user(&self, user_id: UserId) -> AppResult<UserRecord> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("user not found".to_owned()))
    }

    pub(crate) async fn issue_token_pair(&self, user_id: UserId) -> AppResult<TokenPair> {
        let access_token = self.access_tokens.issue(user_id)?;
        let refresh_token = token_crypto::generate_token()?;
        self.refresh_tokens
            .create(user_id, &refresh_token, self.config.refresh_token_ttl)
            .await?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }
}

mod deletion;
mod email_verification;
mod login;
mod mfa;
mod refresh;
mod registration;
pub(crate) mod token_crypto;

pub use registration::{RegisterOutcome, RegisterParams};

#[cfg(test)]
pub(crate) mod tests;
