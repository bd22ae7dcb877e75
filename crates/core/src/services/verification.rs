//! Email verification codes.
//!
//! Codes are six digits, stored only as an HMAC-SHA256 of
//! `email|type|code`. Each (email, type) pair may request a code once per
//! resend interval; each code allows a bounded number of verification
//! attempts and a successful verification consumes it.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use tracing::{debug, info, warn};
use twinchat_common::config::VerificationConfig;
use twinchat_common::{AppError, AppResult, IdGenerator};
use twinchat_store::models::{CodeType, VerificationCode};
use twinchat_store::{DocumentStore, Query, Repository, patch};
use validator::ValidateEmail;

use crate::clock::{Clock, system_clock};

type HmacSha256 = Hmac<Sha256>;

/// Number of digits in a code.
pub const CODE_LENGTH: usize = 6;

/// A freshly issued code. The plain code is handed to delivery and never
/// stored or returned over the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: i64,
}

/// Outcome of a code request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeIssue {
    Issued(IssuedCode),
    RateLimited { retry_after_secs: u64 },
}

impl CodeIssue {
    /// Convert a rate-limit outcome into [`AppError::RateLimited`].
    pub fn into_result(self) -> AppResult<IssuedCode> {
        match self {
            Self::Issued(code) => Ok(code),
            Self::RateLimited { retry_after_secs } => Err(AppError::RateLimited { retry_after_secs }),
        }
    }
}

/// Outcome of a verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    Verified,
    /// No unverified, unexpired code exists for the email and type.
    NotFoundOrExpired,
    /// The attempt budget of the latest code is spent.
    TooManyAttempts,
    Mismatch { attempts_left: i64 },
}

impl CodeCheck {
    /// Convert a failed check into an error.
    pub fn into_result(self) -> AppResult<()> {
        match self {
            Self::Verified => Ok(()),
            Self::NotFoundOrExpired => Err(AppError::ExpiredOrExhausted(
                "Verification code not found or expired".to_string(),
            )),
            Self::TooManyAttempts => Err(AppError::ExpiredOrExhausted(
                "Too many verification attempts".to_string(),
            )),
            Self::Mismatch { .. } => {
                Err(AppError::BadRequest("Invalid verification code".to_string()))
            }
        }
    }
}

/// Lower-case and trim an email address.
pub fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    if email.validate_email() {
        Ok(email)
    } else {
        Err(AppError::Validation("Invalid email address".to_string()))
    }
}

/// Verification code service.
#[derive(Clone)]
pub struct VerificationService {
    codes: Repository<VerificationCode>,
    policy: VerificationConfig,
    clock: Arc<dyn Clock>,
    id_gen: IdGenerator,
}

impl VerificationService {
    /// Create a new verification service.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, policy: VerificationConfig) -> Self {
        Self {
            codes: Repository::new(store),
            policy,
            clock: system_clock(),
            id_gen: IdGenerator::new(),
        }
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Issue a new code for `email` unless one was issued within the
    /// resend interval.
    pub async fn create_code(
        &self,
        email: &str,
        code_type: CodeType,
        client_ip: Option<&str>,
    ) -> AppResult<CodeIssue> {
        let email = normalize_email(email)?;
        let now = self.clock.now_millis();
        let interval_ms = self.policy.resend_interval_secs * 1000;

        let recent = self
            .codes
            .find_one(
                Query::new()
                    .eq("email", email.as_str())
                    .eq("type", code_type.as_str())
                    .gt("created_at", now - interval_ms)
                    .order_desc("created_at"),
            )
            .await?;

        if let Some(recent) = recent {
            let remaining_ms = recent.created_at + interval_ms - now;
            let retry_after_secs = u64::try_from((remaining_ms + 999) / 1000)
                .unwrap_or(1)
                .max(1);
            debug!(code_type = code_type.as_str(), retry_after_secs, "Verification code rate limited");
            return Ok(CodeIssue::RateLimited { retry_after_secs });
        }

        let code = generate_code();
        let expires_at = now + self.policy.ttl_secs * 1000;
        let record = VerificationCode {
            id: self.id_gen.generate(),
            hashed_code: self.hash(&email, code_type, &code),
            email,
            code_type,
            attempts: 0,
            created_at: now,
            expires_at,
            verified: false,
            uses: 0,
            verified_at: None,
            client_ip: client_ip.map(str::to_string),
        };
        self.codes.create(&record).await?;

        info!(id = %record.id, code_type = code_type.as_str(), "Issued verification code");
        Ok(CodeIssue::Issued(IssuedCode { code, expires_at }))
    }

    /// Check a submitted code against the latest usable code.
    ///
    /// The attempt is counted before the comparison, so a wrong guess and a
    /// correct one both spend budget. Once verified, a code never verifies
    /// again.
    pub async fn verify_code(
        &self,
        email: &str,
        code: &str,
        code_type: CodeType,
    ) -> AppResult<CodeCheck> {
        let email = normalize_email(email)?;
        let now = self.clock.now_millis();

        let Some(record) = self
            .codes
            .find_one(
                Query::new()
                    .eq("email", email.as_str())
                    .eq("type", code_type.as_str())
                    .eq("verified", false)
                    .gt("expires_at", now)
                    .order_desc("created_at"),
            )
            .await?
        else {
            return Ok(CodeCheck::NotFoundOrExpired);
        };

        let attempts = match self.codes.increment(&record.id, "attempts", 1).await? {
            Some(updated) => updated.attempts,
            None => return Ok(CodeCheck::NotFoundOrExpired),
        };

        if attempts > self.policy.max_attempts {
            warn!(id = %record.id, attempts, "Verification attempts exhausted");
            return Ok(CodeCheck::TooManyAttempts);
        }

        if !self.matches(&record, code) {
            return Ok(CodeCheck::Mismatch {
                attempts_left: self.policy.max_attempts - attempts,
            });
        }

        // Concurrent matches race here; only the first claim consumes the code
        let claimed = self
            .codes
            .increment(&record.id, "uses", 1)
            .await?
            .is_some_and(|claimed| claimed.uses == 1);
        if !claimed {
            debug!(id = %record.id, "Verification code already consumed");
            return Ok(CodeCheck::NotFoundOrExpired);
        }

        self.codes
            .update(
                &record.id,
                patch(serde_json::json!({ "verified": true, "verified_at": now })),
            )
            .await?;

        info!(id = %record.id, code_type = code_type.as_str(), "Verification code accepted");
        Ok(CodeCheck::Verified)
    }

    /// Delete expired codes. Returns how many were removed.
    pub async fn purge_expired(&self) -> AppResult<usize> {
        let now = self.clock.now_millis();
        let expired = self
            .codes
            .find(&Query::new().lt("expires_at", now))
            .await?;

        let mut removed = 0;
        for record in expired {
            if self.codes.delete(&record.id).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "Purged expired verification codes");
        }
        Ok(removed)
    }

    fn mac(&self, email: &str, code_type: CodeType, code: &str) -> HmacSha256 {
        #[allow(clippy::expect_used)] // HMAC accepts any key size
        let mut mac = HmacSha256::new_from_slice(self.policy.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(email.as_bytes());
        mac.update(b"|");
        mac.update(code_type.as_str().as_bytes());
        mac.update(b"|");
        mac.update(code.as_bytes());
        mac
    }

    fn hash(&self, email: &str, code_type: CodeType, code: &str) -> String {
        hex::encode(self.mac(email, code_type, code).finalize().into_bytes())
    }

    /// Constant-time comparison against the stored hash.
    fn matches(&self, record: &VerificationCode, code: &str) -> bool {
        let code = code.trim();
        if code.len() != CODE_LENGTH || !code.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        let Ok(expected) = hex::decode(&record.hashed_code) else {
            return false;
        };
        self.mac(&record.email, record.code_type, code)
            .verify_slice(&expected)
            .is_ok()
    }
}

fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{n:06}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use async_trait::async_trait;
    use twinchat_common::{Config, Region};
    use twinchat_store::{Document, MemoryStore};

    /// Yields to the scheduler before every call so concurrent verifications
    /// interleave between the lookup and the claim.
    struct YieldingStore(MemoryStore);

    #[async_trait]
    impl DocumentStore for YieldingStore {
        fn region(&self) -> Region {
            self.0.region()
        }

        async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Document>> {
            tokio::task::yield_now().await;
            self.0.get(collection, id).await
        }

        async fn query(&self, collection: &str, query: &Query) -> AppResult<Vec<Document>> {
            tokio::task::yield_now().await;
            self.0.query(collection, query).await
        }

        async fn insert(&self, collection: &str, doc: Document) -> AppResult<Document> {
            tokio::task::yield_now().await;
            self.0.insert(collection, doc).await
        }

        async fn update(
            &self,
            collection: &str,
            id: &str,
            patch: Document,
        ) -> AppResult<Option<Document>> {
            tokio::task::yield_now().await;
            self.0.update(collection, id, patch).await
        }

        async fn increment(
            &self,
            collection: &str,
            id: &str,
            field: &str,
            delta: i64,
        ) -> AppResult<Option<Document>> {
            tokio::task::yield_now().await;
            self.0.increment(collection, id, field, delta).await
        }

        async fn delete(&self, collection: &str, id: &str) -> AppResult<bool> {
            tokio::task::yield_now().await;
            self.0.delete(collection, id).await
        }
    }

    const START: i64 = 1_700_000_000_000;

    fn service() -> (VerificationService, Arc<ManualClock>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new(Region::Global));
        let clock = Arc::new(ManualClock::new(START));
        let service = VerificationService::new(store.clone(), Config::for_testing().verification)
            .with_clock(clock.clone());
        (service, clock, store)
    }

    async fn issue(service: &VerificationService, email: &str) -> IssuedCode {
        service
            .create_code(email, CodeType::Register, None)
            .await
            .unwrap()
            .into_result()
            .unwrap()
    }

    fn wrong(code: &str) -> String {
        let n: u32 = code.parse().unwrap();
        format!("{:06}", (n + 1) % 1_000_000)
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM ").unwrap(), "alice@example.com");
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("@example.com").is_err());
    }

    #[tokio::test]
    async fn test_code_is_stored_hashed() {
        let (service, _, store) = service();
        let issued = issue(&service, "a@example.com").await;

        assert_eq!(issued.code.len(), CODE_LENGTH);
        assert_eq!(issued.expires_at, START + 600_000);

        let stored = store
            .query("verification_codes", &Query::new())
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        let hashed = stored[0]["hashed_code"].as_str().unwrap();
        assert_ne!(hashed, issued.code);
        assert_eq!(hashed.len(), 64);
    }

    #[tokio::test]
    async fn test_resend_is_rate_limited() {
        let (service, clock, _) = service();
        issue(&service, "a@example.com").await;

        clock.advance_secs(10);
        let second = service
            .create_code("A@example.com", CodeType::Register, None)
            .await
            .unwrap();
        assert_eq!(second, CodeIssue::RateLimited { retry_after_secs: 50 });

        // other code types are independent
        let reset = service
            .create_code("a@example.com", CodeType::ResetPassword, None)
            .await
            .unwrap();
        assert!(matches!(reset, CodeIssue::Issued(_)));

        clock.advance_secs(51);
        issue(&service, "a@example.com").await;
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_error() {
        let (service, _, _) = service();
        issue(&service, "a@example.com").await;
        let err = service
            .create_code("a@example.com", CodeType::Register, None)
            .await
            .unwrap()
            .into_result()
            .unwrap_err();
        assert!(matches!(err, AppError::RateLimited { retry_after_secs: 60 }));
    }

    #[tokio::test]
    async fn test_verify_succeeds_once() {
        let (service, _, _) = service();
        let issued = issue(&service, "a@example.com").await;

        let check = service
            .verify_code("a@example.com", &issued.code, CodeType::Register)
            .await
            .unwrap();
        assert_eq!(check, CodeCheck::Verified);

        let again = service
            .verify_code("a@example.com", &issued.code, CodeType::Register)
            .await
            .unwrap();
        assert_eq!(again, CodeCheck::NotFoundOrExpired);
    }

    #[tokio::test]
    async fn test_concurrent_correct_codes_verify_once() {
        let store = Arc::new(YieldingStore(MemoryStore::new(Region::Global)));
        let service = VerificationService::new(store, Config::for_testing().verification)
            .with_clock(Arc::new(ManualClock::new(START)));
        let issued = issue(&service, "a@example.com").await;

        let (first, second) = tokio::join!(
            service.verify_code("a@example.com", &issued.code, CodeType::Register),
            service.verify_code("a@example.com", &issued.code, CodeType::Register),
        );
        let checks = [first.unwrap(), second.unwrap()];

        let verified = checks.iter().filter(|c| **c == CodeCheck::Verified).count();
        assert_eq!(verified, 1, "{checks:?}");
        assert!(checks.contains(&CodeCheck::NotFoundOrExpired));
    }

    #[tokio::test]
    async fn test_sixth_attempt_fails_even_with_correct_code() {
        let (service, _, _) = service();
        let issued = issue(&service, "a@example.com").await;
        let bad = wrong(&issued.code);

        for expected_left in (0..5).rev() {
            let check = service
                .verify_code("a@example.com", &bad, CodeType::Register)
                .await
                .unwrap();
            assert_eq!(check, CodeCheck::Mismatch { attempts_left: expected_left });
        }

        let check = service
            .verify_code("a@example.com", &issued.code, CodeType::Register)
            .await
            .unwrap();
        assert_eq!(check, CodeCheck::TooManyAttempts);
        assert!(check.into_result().is_err());
    }

    #[tokio::test]
    async fn test_expired_code_is_not_found() {
        let (service, clock, _) = service();
        let issued = issue(&service, "a@example.com").await;

        clock.advance_secs(601);
        let check = service
            .verify_code("a@example.com", &issued.code, CodeType::Register)
            .await
            .unwrap();
        assert_eq!(check, CodeCheck::NotFoundOrExpired);
    }

    #[tokio::test]
    async fn test_code_type_must_match() {
        let (service, _, _) = service();
        let issued = issue(&service, "a@example.com").await;

        let check = service
            .verify_code("a@example.com", &issued.code, CodeType::ResetPassword)
            .await
            .unwrap();
        assert_eq!(check, CodeCheck::NotFoundOrExpired);
    }

    #[tokio::test]
    async fn test_latest_code_wins() {
        let (service, clock, _) = service();
        let first = issue(&service, "a@example.com").await;
        clock.advance_secs(61);
        let second = issue(&service, "a@example.com").await;

        if first.code != second.code {
            let check = service
                .verify_code("a@example.com", &first.code, CodeType::Register)
                .await
                .unwrap();
            assert!(matches!(check, CodeCheck::Mismatch { .. }));
        }
        let check = service
            .verify_code("a@example.com", &second.code, CodeType::Register)
            .await
            .unwrap();
        assert_eq!(check, CodeCheck::Verified);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (service, clock, store) = service();
        issue(&service, "a@example.com").await;
        clock.advance_secs(61);
        issue(&service, "b@example.com").await;

        clock.advance_secs(560);
        assert_eq!(service.purge_expired().await.unwrap(), 1);
        assert_eq!(store.count("verification_codes").unwrap(), 1);
    }
}
