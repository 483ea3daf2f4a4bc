use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use lodge_core::{AppError, AppResult};
use lodge_domain::{UserId, UserProfile};

use crate::permission_service::PermissionInvalidator;

use super::*;

fn lock<T>(mutex: &Mutex<T>) -> AppResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|error| AppError::Internal(format!("failed to lock test state: {error}")))
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeUsers {
    rows: Mutex<HashMap<UserId, UserRecord>>,
    verification_rows: Mutex<HashMap<String, (UserId, DateTime<Utc>, bool)>>,
    recovery_rows: Mutex<HashMap<UserId, Vec<RecoveryCodeRecord>>>,
}

#[async_trait]
impl UserRepository for FakeUsers {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<UserRecord>> {
        Ok(lock(&self.rows)?
            .values()
            .find(|record| record.email == email)
            .cloned())
    }

    async fn find_by_username(&self, username_lower: &str) -> AppResult<Option<UserRecord>> {
        Ok(lock(&self.rows)?
            .values()
            .find(|record| record.username.to_lowercase() == username_lower)
            .cloned())
    }

    async fn find_by_id(&self, user_id: UserId) -> AppResult<Option<UserRecord>> {
        Ok(lock(&self.rows)?.get(&user_id).cloned())
    }

    async fn create_with_verification(
        &self,
        new_user: &NewUser,
        token_hash: &str,
        token_expires_at: DateTime<Utc>,
    ) -> AppResult<UserId> {
        let mut rows = lock(&self.rows)?;
        let duplicate = rows.values().any(|record| {
            record.email == new_user.email
                || record.username.to_lowercase() == new_user.username_lower
        });
        if duplicate {
            return Err(AppError::Conflict(
                "email or username already taken".to_owned(),
            ));
        }

        let user_id = UserId::new();
        rows.insert(
            user_id,
            UserRecord {
                id: user_id,
                email: new_user.email.clone(),
                username: new_user.username.clone(),
                email_verified: false,
                password_hash: new_user.password_hash.clone(),
                mfa_enabled: false,
                totp_secret_enc: None,
                profile: UserProfile::default(),
                created_at: Utc::now(),
            },
        );
        lock(&self.verification_rows)?.insert(
            token_hash.to_owned(),
            (user_id, token_expires_at, false),
        );
        Ok(user_id)
    }

    async fn update_password_hash(&self, user_id: UserId, password_hash: &str) -> AppResult<()> {
        let mut rows = lock(&self.rows)?;
        let record = rows
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound("user not found".to_owned()))?;
        record.password_hash = password_hash.to_owned();
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: UserId) -> AppResult<()> {
        let mut rows = lock(&self.rows)?;
        let record = rows
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound("user not found".to_owned()))?;
        record.email_verified = true;
        Ok(())
    }

    async fn enable_mfa(
        &self,
        user_id: UserId,
        totp_secret_enc: &[u8],
        recovery_code_hashes: &[String],
    ) -> AppResult<()> {
        let mut rows = lock(&self.rows)?;
        let record = rows
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound("user not found".to_owned()))?;
        record.mfa_enabled = true;
        record.totp_secret_enc = Some(totp_secret_enc.to_vec());

        let codes = recovery_code_hashes
            .iter()
            .map(|hash| RecoveryCodeRecord {
                id: uuid::Uuid::new_v4(),
                code_hash: hash.clone(),
                used_at: None,
            })
            .collect();
        lock(&self.recovery_rows)?.insert(user_id, codes);
        Ok(())
    }

    async fn disable_mfa(&self, user_id: UserId) -> AppResult<()> {
        let mut rows = lock(&self.rows)?;
        let record = rows
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound("user not found".to_owned()))?;
        record.mfa_enabled = false;
        record.totp_secret_enc = None;
        lock(&self.recovery_rows)?.remove(&user_id);
        Ok(())
    }

    async fn update_profile(&self, user_id: UserId, profile: &UserProfile) -> AppResult<()> {
        let mut rows = lock(&self.rows)?;
        let record = rows
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound("user not found".to_owned()))?;
        record.profile = profile.clone();
        Ok(())
    }

    async fn delete_with_tombstones(
        &self,
        user_id: UserId,
        _tombstones: &[TombstoneEntry],
    ) -> AppResult<()> {
        lock(&self.rows)?.remove(&user_id);
        Ok(())
    }
}

#[async_trait]
impl VerificationTokenRepository for FakeUsers {
    async fn consume_valid(&self, token_hash: &str) -> AppResult<Option<UserId>> {
        let mut rows = lock(&self.verification_rows)?;
        let Some(entry) = rows.get_mut(token_hash) else {
            return Ok(None);
        };
        let (user_id, expires_at, consumed) = *entry;
        if consumed || expires_at <= Utc::now() {
            return Ok(None);
        }
        entry.2 = true;
        Ok(Some(user_id))
    }

    async fn replace_after_cooldown(
        &self,
        user_id: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        cooldown: Duration,
    ) -> AppResult<bool> {
        let mut rows = lock(&self.verification_rows)?;
        let recent = rows.values().any(|(owner, row_expiry, _)| {
            // The fake approximates created_at from the expiry stamp.
            *owner == user_id && *row_expiry > expires_at - cooldown
        });
        if recent {
            return Ok(false);
        }
        rows.retain(|_, (owner, _, _)| *owner != user_id);
        rows.insert(token_hash.to_owned(), (user_id, expires_at, false));
        Ok(true)
    }
}

#[async_trait]
impl RecoveryCodeRepository for FakeUsers {
    async fn list(&self, user_id: UserId) -> AppResult<Vec<RecoveryCodeRecord>> {
        Ok(lock(&self.recovery_rows)?
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_used(&self, code_id: uuid::Uuid) -> AppResult<()> {
        let mut rows = lock(&self.recovery_rows)?;
        for codes in rows.values_mut() {
            for code in codes.iter_mut() {
                if code.id == code_id {
                    code.used_at = Some(Utc::now());
                    return Ok(());
                }
            }
        }
        Err(AppError::NotFound("recovery code not found".to_owned()))
    }

    async fn replace_all(&self, user_id: UserId, code_hashes: &[String]) -> AppResult<()> {
        let codes = code_hashes
            .iter()
            .map(|hash| RecoveryCodeRecord {
                id: uuid::Uuid::new_v4(),
                code_hash: hash.clone(),
                used_at: None,
            })
            .collect();
        lock(&self.recovery_rows)?.insert(user_id, codes);
        Ok(())
    }
}

#[derive(Default)]
struct FakeTombstones {
    entries: Mutex<HashSet<(String, String)>>,
}

impl FakeTombstones {
    fn insert(&self, kind: TombstoneKind, hmac: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert((kind.as_str().to_owned(), hmac.to_owned()));
        }
    }
}

#[async_trait]
impl TombstoneRepository for FakeTombstones {
    async fn exists(&self, kind: TombstoneKind, identifier_hmac: &str) -> AppResult<bool> {
        Ok(lock(&self.entries)?
            .contains(&(kind.as_str().to_owned(), identifier_hmac.to_owned())))
    }

    async fn purge_older_than(&self, _cutoff: DateTime<Utc>) -> AppResult<u64> {
        Ok(0)
    }
}

#[derive(Default)]
struct FakeLoginAttempts {
    rows: Mutex<Vec<(String, Option<UserId>, bool, String)>>,
}

impl FakeLoginAttempts {
    fn rows_matching(&self, success: bool) -> usize {
        self.rows
            .lock()
            .map(|rows| rows.iter().filter(|row| row.2 == success).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl LoginAttemptRepository for FakeLoginAttempts {
    async fn record(
        &self,
        email: &str,
        user_id: Option<UserId>,
        success: bool,
        reason: &str,
    ) -> AppResult<()> {
        lock(&self.rows)?.push((email.to_owned(), user_id, success, reason.to_owned()));
        Ok(())
    }

    async fn purge_older_than(&self, _cutoff: DateTime<Utc>) -> AppResult<u64> {
        Ok(0)
    }
}

#[derive(Default)]
struct FakeRefreshStore {
    live: Mutex<HashMap<String, UserId>>,
    used: Mutex<HashMap<String, UserId>>,
}

impl FakeRefreshStore {
    fn live_count(&self, user_id: UserId) -> usize {
        self.live
            .lock()
            .map(|live| live.values().filter(|owner| **owner == user_id).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl RefreshTokenStore for FakeRefreshStore {
    async fn create(&self, user_id: UserId, token: &str, _ttl: Duration) -> AppResult<()> {
        lock(&self.live)?.insert(token.to_owned(), user_id);
        Ok(())
    }

    async fn rotate(
        &self,
        old_token: &str,
        new_token: &str,
        _ttl: Duration,
    ) -> AppResult<RotateStatus> {
        let mut live = lock(&self.live)?;
        if let Some(user_id) = live.remove(old_token) {
            lock(&self.used)?.insert(old_token.to_owned(), user_id);
            live.insert(new_token.to_owned(), user_id);
            return Ok(RotateStatus::Rotated { user_id });
        }
        if let Some(user_id) = lock(&self.used)?.get(old_token) {
            return Ok(RotateStatus::Reused {
                user_id: Some(*user_id),
            });
        }
        Ok(RotateStatus::NotFound)
    }

    async fn revoke_all(&self, user_id: UserId) -> AppResult<u64> {
        let mut live = lock(&self.live)?;
        let before = live.len();
        live.retain(|_, owner| *owner != user_id);
        Ok((before - live.len()) as u64)
    }
}

#[derive(Default)]
struct FakeTicketStore {
    tickets: Mutex<HashMap<String, UserId>>,
}

#[async_trait]
impl MfaTicketStore for FakeTicketStore {
    async fn store(&self, ticket: &str, user_id: UserId, _ttl: Duration) -> AppResult<()> {
        lock(&self.tickets)?.insert(ticket.to_owned(), user_id);
        Ok(())
    }

    async fn consume(&self, ticket: &str) -> AppResult<Option<UserId>> {
        Ok(lock(&self.tickets)?.remove(ticket))
    }
}

#[derive(Default)]
struct FakePendingMfa {
    pending: Mutex<HashMap<UserId, Vec<u8>>>,
    attempts: Mutex<HashMap<UserId, u32>>,
}

#[async_trait]
impl PendingMfaStore for FakePendingMfa {
    async fn store(&self, user_id: UserId, secret_enc: &[u8], _ttl: Duration) -> AppResult<()> {
        lock(&self.pending)?.insert(user_id, secret_enc.to_vec());
        lock(&self.attempts)?.remove(&user_id);
        Ok(())
    }

    async fn take(&self, user_id: UserId) -> AppResult<Option<Vec<u8>>> {
        Ok(lock(&self.pending)?.remove(&user_id))
    }

    async fn restore(&self, user_id: UserId, secret_enc: &[u8], _ttl: Duration) -> AppResult<()> {
        lock(&self.pending)?.insert(user_id, secret_enc.to_vec());
        Ok(())
    }

    async fn increment_attempts(&self, user_id: UserId, _ttl: Duration) -> AppResult<u32> {
        let mut attempts = lock(&self.attempts)?;
        let counter = attempts.entry(user_id).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn clear(&self, user_id: UserId) -> AppResult<()> {
        lock(&self.pending)?.remove(&user_id);
        lock(&self.attempts)?.remove(&user_id);
        Ok(())
    }
}

/// Deterministic stand-in: "hashes" are reversible strings, never real
/// crypto, so assertions stay readable.
#[derive(Default)]
struct FakeHasher {
    stale: AtomicBool,
    dummy_verifications: AtomicU32,
}

impl PasswordHasher for FakeHasher {
    fn hash_password(&self, password: &str) -> AppResult<String> {
        Ok(format!("argon2${password}"))
    }

    fn verify_password(&self, password: &str, hash: &str) -> AppResult<bool> {
        Ok(hash == format!("argon2${password}"))
    }

    fn needs_rehash(&self, _hash: &str) -> AppResult<bool> {
        Ok(self.stale.load(Ordering::SeqCst))
    }

    fn verify_dummy(&self, _password: &str) {
        self.dummy_verifications.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeAccessTokens;

impl AccessTokenIssuer for FakeAccessTokens {
    fn issue(&self, user_id: UserId) -> AppResult<String> {
        Ok(format!("jwt:{user_id}"))
    }

    fn validate(&self, token: &str) -> AppResult<UserId> {
        let raw = token
            .strip_prefix("jwt:")
            .ok_or_else(|| AppError::Unauthorized("bad token".to_owned()))?;
        raw.parse()
            .map_err(|_| AppError::Unauthorized("bad subject".to_owned()))
    }
}

/// Accepts exactly one configured code.
struct FakeTotp {
    valid_code: String,
}

impl TotpProvider for FakeTotp {
    fn generate_secret(&self, _account_name: &str) -> AppResult<(Vec<u8>, String, String)> {
        Ok((
            b"totp-secret".to_vec(),
            "JBSWY3DPEHPK3PXP".to_owned(),
            "otpauth://totp/lodge:test".to_owned(),
        ))
    }

    fn verify_code(&self, _secret_bytes: &[u8], code: &str) -> AppResult<bool> {
        Ok(code == self.valid_code)
    }
}

struct FakeEncryptor;

impl SecretEncryptor for FakeEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> AppResult<Vec<u8>> {
        let mut out = b"enc:".to_vec();
        out.extend_from_slice(plaintext);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> AppResult<Vec<u8>> {
        ciphertext
            .strip_prefix(b"enc:")
            .map(<[u8]>::to_vec)
            .ok_or_else(|| AppError::Internal("bad ciphertext".to_owned()))
    }
}

struct FakeIdentityHasher;

impl IdentityHasher for FakeIdentityHasher {
    fn hash_identifier(&self, identifier: &str) -> String {
        format!("hmac:{identifier}")
    }
}

#[derive(Default)]
struct FakeEmail {
    sent: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

#[async_trait]
impl EmailService for FakeEmail {
    async fn send_email(&self, to: &str, subject: &str, _text_body: &str) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::ServiceUnavailable("smtp down".to_owned()));
        }
        lock(&self.sent)?.push((to.to_owned(), subject.to_owned()));
        Ok(())
    }
}

#[derive(Default)]
struct FakePolicy {
    blocked: HashSet<String>,
}

impl DisposableEmailPolicy for FakePolicy {
    fn is_blocked(&self, domain: &str) -> bool {
        self.blocked.contains(domain)
    }
}

struct FakeOwner {
    owner: UserId,
}

#[async_trait]
impl ServerOwnerSource for FakeOwner {
    async fn owner_id(&self) -> AppResult<UserId> {
        Ok(self.owner)
    }
}

#[derive(Default)]
struct FakeInvalidator {
    invalidated_users: Mutex<Vec<UserId>>,
}

#[async_trait]
impl PermissionInvalidator for FakeInvalidator {
    async fn invalidate_user(&self, user_id: UserId) -> AppResult<()> {
        lock(&self.invalidated_users)?.push(user_id);
        Ok(())
    }

    async fn invalidate_channel(&self, _channel_id: lodge_domain::ChannelId) -> AppResult<()> {
        Ok(())
    }

    async fn invalidate_all(&self) -> AppResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    service: AuthService,
    users: Arc<FakeUsers>,
    tombstones: Arc<FakeTombstones>,
    login_attempts: Arc<FakeLoginAttempts>,
    refresh: Arc<FakeRefreshStore>,
    pending_mfa: Arc<FakePendingMfa>,
    hasher: Arc<FakeHasher>,
    email: Arc<FakeEmail>,
    invalidator: Arc<FakeInvalidator>,
}

fn config() -> AuthConfig {
    AuthConfig {
        refresh_token_ttl: Duration::days(14),
        verification_token_ttl: Duration::hours(24),
        verification_cooldown: Duration::minutes(5),
        mfa_ticket_ttl: Duration::minutes(5),
        pending_mfa_ttl: Duration::minutes(10),
        mfa_confirm_attempt_cap: 5,
        tombstone_usernames: false,
        server_url: "https://chat.example.com".to_owned(),
        server_name: "Lodge".to_owned(),
    }
}

fn harness_with(config: AuthConfig, blocked: &[&str]) -> Harness {
    let users = Arc::new(FakeUsers::default());
    let tombstones = Arc::new(FakeTombstones::default());
    let login_attempts = Arc::new(FakeLoginAttempts::default());
    let refresh = Arc::new(FakeRefreshStore::default());
    let pending_mfa = Arc::new(FakePendingMfa::default());
    let hasher = Arc::new(FakeHasher::default());
    let email = Arc::new(FakeEmail::default());
    let invalidator = Arc::new(FakeInvalidator::default());
    let owner = UserId::new();

    let service = AuthService::new(
        AuthServiceDeps {
            users: users.clone(),
            verifications: users.clone(),
            recovery_codes: users.clone(),
            tombstones: tombstones.clone(),
            login_attempts: login_attempts.clone(),
            refresh_tokens: refresh.clone(),
            mfa_tickets: Arc::new(FakeTicketStore::default()),
            pending_mfa: pending_mfa.clone(),
            password_hasher: hasher.clone(),
            access_tokens: Arc::new(FakeAccessTokens),
            totp: Arc::new(FakeTotp {
                valid_code: "424242".to_owned(),
            }),
            secret_encryptor: Arc::new(FakeEncryptor),
            identity_hasher: Arc::new(FakeIdentityHasher),
            email: email.clone(),
            disposable_emails: Arc::new(FakePolicy {
                blocked: blocked.iter().map(|s| (*s).to_owned()).collect(),
            }),
            server_owner: Arc::new(FakeOwner { owner }),
            permission_invalidator: invalidator.clone(),
        },
        config,
    );

    Harness {
        service,
        users,
        tombstones,
        login_attempts,
        refresh,
        pending_mfa,
        hasher,
        email,
        invalidator,
    }
}

fn harness() -> Harness {
    harness_with(config(), &[])
}

fn alice() -> RegisterParams {
    RegisterParams {
        email: "alice@example.com".to_owned(),
        username: "alice".to_owned(),
        password: "StrongPwd8".to_owned(),
    }
}

async fn register_alice(harness: &Harness) -> RegisterOutcome {
    match harness.service.register(alice()).await {
        Ok(outcome) => outcome,
        Err(error) => panic!("registration should succeed: {error}"),
    }
}

// ---------------------------------------------------------------------------
// Registration and login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_then_login_returns_token_for_created_user() {
    let harness = harness();
    let outcome = register_alice(&harness).await;
    assert_eq!(outcome.user.email, "alice@example.com");
    assert_eq!(outcome.user.username, "alice");

    let login = harness.service.login("alice@example.com", "StrongPwd8").await;
    match login {
        Ok(LoginOutcome::Tokens { tokens, user }) => {
            assert_eq!(user.id, outcome.user.id);
            assert_eq!(tokens.access_token, format!("jwt:{}", outcome.user.id));
        }
        other => panic!("expected tokens, got {other:?}"),
    }
}

#[tokio::test]
async fn register_sends_verification_email_and_survives_smtp_outage() {
    let harness = harness();
    harness.email.fail.store(true, Ordering::SeqCst);
    let outcome = harness.service.register(alice()).await;
    assert!(outcome.is_ok(), "smtp failure must not fail registration");

    let sent = harness.email.sent.lock().map(|s| s.len()).unwrap_or(99);
    assert_eq!(sent, 0);
}

#[tokio::test]
async fn duplicate_email_is_a_conflict_distinct_from_tombstoned() {
    let harness = harness();
    register_alice(&harness).await;

    let duplicate = harness.service.register(alice()).await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn tombstoned_email_cannot_register() {
    let harness = harness();
    harness
        .tombstones
        .insert(TombstoneKind::Email, "hmac:alice@example.com");

    let blocked = harness.service.register(alice()).await;
    assert!(matches!(blocked, Err(AppError::AccountTombstoned)));
}

#[tokio::test]
async fn disposable_email_domain_is_rejected() {
    let harness = harness_with(config(), &["mailinator.com"]);
    let params = RegisterParams {
        email: "bob@mailinator.com".to_owned(),
        username: "bob".to_owned(),
        password: "StrongPwd8".to_owned(),
    };
    assert!(matches!(
        harness.service.register(params).await,
        Err(AppError::DisposableEmail)
    ));
}

#[tokio::test]
async fn unknown_email_burns_a_dummy_verification() {
    let harness = harness();
    let login = harness.service.login("ghost@example.com", "whatever1").await;
    assert!(matches!(login, Err(AppError::InvalidCredentials)));
    assert_eq!(harness.hasher.dummy_verifications.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn three_wrong_passwords_leave_three_audit_rows() {
    let harness = harness();
    register_alice(&harness).await;

    for _ in 0..3 {
        let login = harness.service.login("alice@example.com", "WrongPwd99").await;
        assert!(matches!(login, Err(AppError::InvalidCredentials)));
    }
    assert_eq!(harness.login_attempts.rows_matching(false), 3);
    assert_eq!(harness.login_attempts.rows_matching(true), 0);
}

#[tokio::test]
async fn stale_hash_is_rewritten_after_successful_login() {
    let harness = harness();
    let outcome = register_alice(&harness).await;
    harness.hasher.stale.store(true, Ordering::SeqCst);

    let login = harness.service.login("alice@example.com", "StrongPwd8").await;
    assert!(login.is_ok());

    // The fake hasher is deterministic, so a rewrite keeps the same value;
    // assert by checking the stored hash still verifies.
    let stored = harness.users.find_by_id(outcome.user.id).await;
    let stored = match stored {
        Ok(Some(record)) => record,
        other => panic!("user must still exist: {other:?}"),
    };
    let verifies = harness
        .hasher
        .verify_password("StrongPwd8", &stored.password_hash);
    assert_eq!(verifies.ok(), Some(true));
}

// ---------------------------------------------------------------------------
// Refresh rotation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rotation_succeeds_once_and_reuse_revokes_the_family() {
    let harness = harness();
    let outcome = register_alice(&harness).await;
    let r0 = outcome.tokens.refresh_token.clone();

    let first = harness.service.refresh(&r0).await;
    let r1 = match first {
        Ok(pair) => pair.refresh_token,
        Err(error) => panic!("first rotation must succeed: {error}"),
    };
    assert_ne!(r0, r1);

    let second = harness.service.refresh(&r1).await;
    assert!(second.is_ok(), "rotating the successor must succeed");

    // Replaying the original token: reuse detected, family revoked.
    let replay = harness.service.refresh(&r0).await;
    assert!(matches!(replay, Err(AppError::RefreshTokenReused)));
    assert_eq!(harness.refresh.live_count(outcome.user.id), 0);

    // The revocation killed the live successor too.
    let r2 = match second {
        Ok(pair) => pair.refresh_token,
        Err(error) => panic!("unreachable: {error}"),
    };
    let after_revocation = harness.service.refresh(&r2).await;
    assert!(matches!(after_revocation, Err(AppError::RefreshTokenNotFound)));
}

#[tokio::test]
async fn unknown_refresh_token_is_not_found() {
    let harness = harness();
    let missing = harness.service.refresh("deadbeef").await;
    assert!(matches!(missing, Err(AppError::RefreshTokenNotFound)));
}

// ---------------------------------------------------------------------------
// Email verification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resend_inside_the_cooldown_is_rejected() {
    let harness = harness();
    let outcome = register_alice(&harness).await;

    // The registration token was just created, so an immediate resend
    // lands inside the cooldown window.
    let resent = harness.service.resend_verification(outcome.user.id).await;
    assert!(matches!(resent, Err(AppError::VerificationCooldown)));
}

#[tokio::test]
async fn consume_marks_verified_and_second_consume_fails() {
    let harness = harness();
    let outcome = register_alice(&harness).await;

    // Reach into the fake to find the stored hash, then drive the public
    // path with a token that maps onto it.
    let raw = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
    let stored = (
        outcome.user.id,
        Utc::now() + Duration::hours(1),
        false,
    );
    if let Ok(mut rows) = harness.users.verification_rows.lock() {
        rows.clear();
        rows.insert(super::token_crypto::hash_token(raw), stored);
    }

    let first = harness.service.verify_email(raw).await;
    assert!(first.is_ok());
    let record = harness.users.find_by_id(outcome.user.id).await;
    assert!(matches!(record, Ok(Some(ref r)) if r.email_verified));

    let second = harness.service.verify_email(raw).await;
    assert!(matches!(second, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn verified_accounts_cannot_request_verification() {
    let harness = harness();
    let outcome = register_alice(&harness).await;
    let marked = harness.users.mark_email_verified(outcome.user.id).await;
    assert!(marked.is_ok());

    let resent = harness.service.resend_verification(outcome.user.id).await;
    assert!(matches!(resent, Err(AppError::EmailAlreadyVerified)));
}

// ---------------------------------------------------------------------------
// MFA
// ---------------------------------------------------------------------------

async fn enrolled_harness() -> (Harness, RegisterOutcome, Vec<String>) {
    let harness = harness();
    let outcome = register_alice(&harness).await;

    let enrolment = harness
        .service
        .enable_mfa(outcome.user.id, "StrongPwd8")
        .await;
    assert!(enrolment.is_ok());

    let codes = match harness.service.confirm_mfa(outcome.user.id, "424242").await {
        Ok(codes) => codes,
        Err(error) => panic!("confirmation should succeed: {error}"),
    };
    (harness, outcome, codes)
}

#[tokio::test]
async fn enable_mfa_requires_the_password() {
    let harness = harness();
    let outcome = register_alice(&harness).await;
    let denied = harness.service.enable_mfa(outcome.user.id, "WrongPwd99").await;
    assert!(matches!(denied, Err(AppError::InvalidCredentials)));
}

#[tokio::test]
async fn confirmation_locks_after_the_attempt_cap() {
    let harness = harness();
    let outcome = register_alice(&harness).await;
    let enrolment = harness
        .service
        .enable_mfa(outcome.user.id, "StrongPwd8")
        .await;
    assert!(enrolment.is_ok());

    for attempt in 1..=4 {
        let wrong = harness.service.confirm_mfa(outcome.user.id, "000000").await;
        assert!(
            matches!(wrong, Err(AppError::InvalidMfaCode)),
            "attempt {attempt} should report an invalid code"
        );
    }
    let fifth = harness.service.confirm_mfa(outcome.user.id, "000000").await;
    assert!(matches!(fifth, Err(AppError::MfaSetupLocked)));

    // The pending secret is discarded: even the right code fails now.
    let after_lock = harness.service.confirm_mfa(outcome.user.id, "424242").await;
    assert!(matches!(after_lock, Err(AppError::MfaNotConfigured)));
    let pending = harness.pending_mfa.pending.lock().map(|p| p.len()).unwrap_or(99);
    assert_eq!(pending, 0);
}

#[tokio::test]
async fn successful_confirmation_issues_ten_recovery_codes() {
    let (harness, outcome, codes) = enrolled_harness().await;
    assert_eq!(codes.len(), RECOVERY_CODE_COUNT);
    for code in &codes {
        assert_eq!(code.split('-').count(), 5);
    }

    let record = harness.users.find_by_id(outcome.user.id).await;
    assert!(matches!(record, Ok(Some(ref r)) if r.mfa_enabled));
}

#[tokio::test]
async fn mfa_login_needs_ticket_then_totp_code() {
    let (harness, outcome, _codes) = enrolled_harness().await;

    let login = harness.service.login("alice@example.com", "StrongPwd8").await;
    let ticket = match login {
        Ok(LoginOutcome::MfaChallenge { ticket }) => ticket,
        other => panic!("expected an mfa challenge, got {other:?}"),
    };

    let wrong = harness.service.verify_mfa_login(&ticket, "000000").await;
    assert!(matches!(wrong, Err(AppError::InvalidCredentials)));

    // The ticket was consumed by the failed attempt.
    let replay = harness.service.verify_mfa_login(&ticket, "424242").await;
    assert!(matches!(replay, Err(AppError::Unauthorized(_))));

    // A fresh login gets a fresh ticket; the right code finishes it.
    let retry = harness.service.login("alice@example.com", "StrongPwd8").await;
    let ticket = match retry {
        Ok(LoginOutcome::MfaChallenge { ticket }) => ticket,
        other => panic!("expected an mfa challenge, got {other:?}"),
    };
    let verified = harness.service.verify_mfa_login(&ticket, "424242").await;
    match verified {
        Ok(LoginOutcome::Tokens { user, .. }) => assert_eq!(user.id, outcome.user.id),
        other => panic!("expected tokens, got {other:?}"),
    }
}

#[tokio::test]
async fn recovery_code_works_once_with_or_without_hyphens() {
    let (harness, _outcome, codes) = enrolled_harness().await;
    let code = codes[0].clone();

    let login = harness.service.login("alice@example.com", "StrongPwd8").await;
    let ticket = match login {
        Ok(LoginOutcome::MfaChallenge { ticket }) => ticket,
        other => panic!("expected an mfa challenge, got {other:?}"),
    };
    let stripped: String = code.chars().filter(|ch| *ch != '-').collect();
    let first_use = harness.service.verify_mfa_login(&ticket, &stripped).await;
    assert!(matches!(first_use, Ok(LoginOutcome::Tokens { .. })));

    // Second use of the same code fails.
    let login = harness.service.login("alice@example.com", "StrongPwd8").await;
    let ticket = match login {
        Ok(LoginOutcome::MfaChallenge { ticket }) => ticket,
        other => panic!("expected an mfa challenge, got {other:?}"),
    };
    let second_use = harness.service.verify_mfa_login(&ticket, &code).await;
    assert!(matches!(second_use, Err(AppError::InvalidCredentials)));
}

#[tokio::test]
async fn regeneration_replaces_the_code_set() {
    let (harness, outcome, old_codes) = enrolled_harness().await;

    let new_codes = harness
        .service
        .regenerate_recovery_codes(outcome.user.id, "StrongPwd8")
        .await;
    let new_codes = match new_codes {
        Ok(codes) => codes,
        Err(error) => panic!("regeneration should succeed: {error}"),
    };
    assert_eq!(new_codes.len(), RECOVERY_CODE_COUNT);

    // An old code no longer authenticates.
    let login = harness.service.login("alice@example.com", "StrongPwd8").await;
    let ticket = match login {
        Ok(LoginOutcome::MfaChallenge { ticket }) => ticket,
        other => panic!("expected an mfa challenge, got {other:?}"),
    };
    let stale = harness
        .service
        .verify_mfa_login(&ticket, &old_codes[0])
        .await;
    assert!(matches!(stale, Err(AppError::InvalidCredentials)));
}

#[tokio::test]
async fn disable_mfa_requires_password_and_enabled_state() {
    let harness = harness();
    let outcome = register_alice(&harness).await;

    let not_enabled = harness
        .service
        .disable_mfa(outcome.user.id, "StrongPwd8")
        .await;
    assert!(matches!(not_enabled, Err(AppError::MfaNotEnabled)));

    let (harness, outcome, _codes) = enrolled_harness().await;
    let disabled = harness.service.disable_mfa(outcome.user.id, "StrongPwd8").await;
    assert!(disabled.is_ok());
    let record = harness.users.find_by_id(outcome.user.id).await;
    assert!(matches!(record, Ok(Some(ref r)) if !r.mfa_enabled));
}

// ---------------------------------------------------------------------------
// Account deletion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deletion_requires_password_spares_owner_and_cleans_up() {
    let harness = harness();
    let outcome = register_alice(&harness).await;

    let wrong = harness
        .service
        .delete_account(outcome.user.id, "WrongPwd99")
        .await;
    assert!(matches!(wrong, Err(AppError::InvalidCredentials)));

    let deleted = harness
        .service
        .delete_account(outcome.user.id, "StrongPwd8")
        .await;
    assert!(deleted.is_ok());

    let gone = harness.users.find_by_id(outcome.user.id).await;
    assert!(matches!(gone, Ok(None)));
    assert_eq!(harness.refresh.live_count(outcome.user.id), 0);
    let invalidated = harness
        .invalidator
        .invalidated_users
        .lock()
        .map(|users| users.clone())
        .unwrap_or_default();
    assert_eq!(invalidated, vec![outcome.user.id]);
}

#[tokio::test]
async fn owner_account_cannot_be_deleted() {
    let harness = harness();
    let outcome = register_alice(&harness).await;

    // Re-point the owner source at alice and keep everything else.
    let service = AuthService {
        server_owner: Arc::new(FakeOwner {
            owner: outcome.user.id,
        }),
        ..harness.service.clone()
    };
    let refused = service
        .delete_account(outcome.user.id, "StrongPwd8")
        .await;
    assert!(matches!(refused, Err(AppError::ServerOwnerUndeletable)));
}
