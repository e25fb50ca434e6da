//! Signed session cookie proving a visitor was already admitted to an event.

use tracing::{debug, warn};

use crate::crypto::CryptoProvider;
use crate::error::CryptoError;
use crate::http::{CookiePolicy, HttpContext};
use crate::token::{decode_cookie_value, encode_cookie_value};

pub const SESSION_COOKIE_PREFIX: &str = "QueueITAccepted-SDFrts345E-V3_";

/// Absolute lifetime of the cookie itself. Logical validity is checked
/// against `IssueTime` on every read.
const SESSION_COOKIE_LIFETIME_SECONDS: i64 = 24 * 60 * 60;

/// Validity sentinel that disables the expiry check.
pub const IGNORE_VALIDITY: i64 = -1;

const EVENT_ID_KEY: &str = "EventId";
const QUEUE_ID_KEY: &str = "QueueId";
const FIXED_VALIDITY_KEY: &str = "FixedValidityMins";
const REDIRECT_TYPE_KEY: &str = "RedirectType";
const ISSUE_TIME_KEY: &str = "IssueTime";
const HASH_KEY: &str = "Hash";

pub fn session_cookie_name(event_id: &str) -> String {
    format!("{SESSION_COOKIE_PREFIX}{event_id}")
}

/// Decoded session cookie. Fields keep their textual form so the hash is
/// recomputed over exactly what was stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCookie {
    pub event_id: String,
    pub queue_id: String,
    pub fixed_validity_minutes: Option<String>,
    pub redirect_type: String,
    pub issue_time: String,
    pub hash: String,
}

impl SessionCookie {
    pub fn decode(raw: &str) -> Self {
        let mut values = decode_cookie_value(raw);
        let mut take = |key: &str| values.remove(key).unwrap_or_default();

        Self {
            event_id: take(EVENT_ID_KEY),
            queue_id: take(QUEUE_ID_KEY),
            fixed_validity_minutes: Some(take(FIXED_VALIDITY_KEY)).filter(|value| !value.is_empty()),
            redirect_type: take(REDIRECT_TYPE_KEY),
            issue_time: take(ISSUE_TIME_KEY),
            hash: take(HASH_KEY),
        }
    }

    pub fn encode(&self) -> String {
        let mut pairs = vec![
            (EVENT_ID_KEY, self.event_id.as_str()),
            (QUEUE_ID_KEY, self.queue_id.as_str()),
        ];
        if let Some(fixed) = self.fixed_validity_minutes.as_deref() {
            pairs.push((FIXED_VALIDITY_KEY, fixed));
        }
        pairs.extend([
            (REDIRECT_TYPE_KEY, self.redirect_type.as_str()),
            (ISSUE_TIME_KEY, self.issue_time.as_str()),
            (HASH_KEY, self.hash.as_str()),
        ]);
        encode_cookie_value(pairs)
    }

    /// Text covered by the cookie hash.
    pub fn signing_input(&self) -> String {
        format!(
            "{}{}{}{}{}",
            self.event_id.to_lowercase(),
            self.queue_id,
            self.fixed_validity_minutes.as_deref().unwrap_or_default(),
            self.redirect_type.to_lowercase(),
            self.issue_time
        )
    }
}

/// Why a present session cookie was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieRejection {
    /// Signature does not cover the stored fields. Also what garbage decodes to.
    Hash,
    EventId,
    Expired,
    Malformed,
}

/// Outcome of reading the session cookie for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateInfo {
    pub is_found: bool,
    pub is_valid: bool,
    pub queue_id: Option<String>,
    pub fixed_cookie_validity_minutes: Option<i64>,
    pub redirect_type: Option<String>,
    pub rejection: Option<CookieRejection>,
}

impl StateInfo {
    fn not_found() -> Self {
        Self::default()
    }

    fn found_invalid(rejection: CookieRejection) -> Self {
        Self {
            is_found: true,
            rejection: Some(rejection),
            ..Self::default()
        }
    }

    /// Valid and without a fixed validity window, so eligible for renewal.
    pub fn is_state_extendable(&self) -> bool {
        self.is_valid && self.fixed_cookie_validity_minutes.is_none()
    }
}

/// Reads and writes the session cookie through the host's HTTP context.
pub struct SessionStateStore<'a, C: CryptoProvider> {
    context: &'a mut dyn HttpContext,
    crypto: &'a C,
    now: i64,
}

impl<'a, C: CryptoProvider> SessionStateStore<'a, C> {
    pub fn new(context: &'a mut dyn HttpContext, crypto: &'a C, now: i64) -> Self {
        Self {
            context,
            crypto,
            now,
        }
    }

    /// Issue a fresh cookie for `event_id` stamped with the current time.
    pub fn store(
        &mut self,
        event_id: &str,
        queue_id: &str,
        fixed_validity_minutes: Option<i64>,
        policy: &CookiePolicy,
        redirect_type: &str,
        secret_key: &str,
    ) -> Result<(), CryptoError> {
        let fixed = fixed_validity_minutes.map(|minutes| minutes.to_string());
        self.write_cookie(event_id, queue_id, fixed, redirect_type, policy, secret_key)
    }

    pub fn get_state(
        &self,
        event_id: &str,
        cookie_validity_minutes: i64,
        secret_key: &str,
        validate_time: bool,
    ) -> StateInfo {
        let Some(raw) = self
            .context
            .cookie_value(&session_cookie_name(event_id))
            .filter(|value| !value.is_empty())
        else {
            return StateInfo::not_found();
        };

        let cookie = SessionCookie::decode(&raw);
        if let Err(rejection) =
            self.check_cookie(&cookie, event_id, cookie_validity_minutes, secret_key, validate_time)
        {
            return StateInfo::found_invalid(rejection);
        }

        let fixed_cookie_validity_minutes = match cookie.fixed_validity_minutes.as_deref() {
            Some(fixed) => match fixed.parse::<i64>() {
                Ok(minutes) => Some(minutes),
                Err(_) => return StateInfo::found_invalid(CookieRejection::Malformed),
            },
            None => None,
        };

        StateInfo {
            is_found: true,
            is_valid: true,
            queue_id: Some(cookie.queue_id),
            fixed_cookie_validity_minutes,
            redirect_type: Some(cookie.redirect_type),
            rejection: None,
        }
    }

    /// Overwrite the cookie with an empty, already expired value.
    pub fn cancel_queue_cookie(&mut self, event_id: &str, policy: &CookiePolicy) {
        debug!(event_id, "cancelling session cookie");
        self.context
            .set_cookie(policy.cookie(&session_cookie_name(event_id), "", 0));
    }

    /// Re-stamp a still valid cookie so a sliding session stays alive.
    pub fn reissue_queue_cookie(
        &mut self,
        event_id: &str,
        cookie_validity_minutes: i64,
        policy: &CookiePolicy,
        secret_key: &str,
    ) -> Result<(), CryptoError> {
        let Some(raw) = self
            .context
            .cookie_value(&session_cookie_name(event_id))
            .filter(|value| !value.is_empty())
        else {
            return Ok(());
        };

        let cookie = SessionCookie::decode(&raw);
        if self
            .check_cookie(&cookie, event_id, cookie_validity_minutes, secret_key, true)
            .is_err()
        {
            return Ok(());
        }

        self.write_cookie(
            event_id,
            &cookie.queue_id,
            cookie.fixed_validity_minutes,
            &cookie.redirect_type,
            policy,
            secret_key,
        )
    }

    fn write_cookie(
        &mut self,
        event_id: &str,
        queue_id: &str,
        fixed_validity_minutes: Option<String>,
        redirect_type: &str,
        policy: &CookiePolicy,
        secret_key: &str,
    ) -> Result<(), CryptoError> {
        let mut cookie = SessionCookie {
            event_id: event_id.to_string(),
            queue_id: queue_id.to_string(),
            fixed_validity_minutes,
            redirect_type: redirect_type.to_string(),
            issue_time: self.now.to_string(),
            hash: String::new(),
        };
        cookie.hash = self
            .crypto
            .hmac_sha256_hex(secret_key, &cookie.signing_input())?;

        self.context.set_cookie(policy.cookie(
            &session_cookie_name(event_id),
            &cookie.encode(),
            self.now + SESSION_COOKIE_LIFETIME_SECONDS,
        ));
        Ok(())
    }

    fn check_cookie(
        &self,
        cookie: &SessionCookie,
        event_id: &str,
        cookie_validity_minutes: i64,
        secret_key: &str,
        validate_time: bool,
    ) -> Result<(), CookieRejection> {
        let expected = self
            .crypto
            .hmac_sha256_hex(secret_key, &cookie.signing_input())
            .map_err(|error| {
                warn!(%error, "unable to hash session cookie");
                CookieRejection::Hash
            })?;
        if expected != cookie.hash {
            debug!(event_id, "session cookie hash mismatch");
            return Err(CookieRejection::Hash);
        }

        if !event_id.eq_ignore_ascii_case(&cookie.event_id) {
            debug!(event_id, "session cookie belongs to another event");
            return Err(CookieRejection::EventId);
        }

        if validate_time {
            let validity_minutes = match cookie.fixed_validity_minutes.as_deref() {
                Some(fixed) => fixed.parse::<i64>().map_err(|_| CookieRejection::Malformed)?,
                None => cookie_validity_minutes,
            };
            let issue_time = cookie
                .issue_time
                .parse::<i64>()
                .map_err(|_| CookieRejection::Malformed)?;
            let expires_at = issue_time.saturating_add(validity_minutes.saturating_mul(60));
            if expires_at < self.now {
                debug!(event_id, "session cookie expired");
                return Err(CookieRejection::Expired);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CookieRejection, SessionCookie, SessionStateStore, session_cookie_name};
    use crate::crypto::HmacSha256Provider;
    use crate::http::{CookiePolicy, MemoryHttpContext};

    const SECRET: &str = "4e1deweb-a8f8-4e5d-b5e8-dee1c55b5a5f";
    const NOW: i64 = 1_700_000_000;

    fn policy() -> CookiePolicy {
        CookiePolicy {
            domain: Some(".test.com".to_string()),
            http_only: true,
            secure: true,
            same_site: None,
        }
    }

    /// Store a cookie at `issued_at` and return its encoded value.
    fn stored_value(event_id: &str, fixed: Option<i64>, issued_at: i64) -> anyhow::Result<String> {
        let mut context = MemoryHttpContext::new();
        let crypto = HmacSha256Provider;
        SessionStateStore::new(&mut context, &crypto, issued_at)
            .store(event_id, "queue-1", fixed, &policy(), "Queue", SECRET)?;
        context
            .last_written(&session_cookie_name(event_id))
            .map(|cookie| cookie.value.clone())
            .ok_or_else(|| anyhow::anyhow!("cookie should be written"))
    }

    #[test]
    fn store_writes_signed_cookie_with_day_expiry() -> anyhow::Result<()> {
        let mut context = MemoryHttpContext::new();
        let crypto = HmacSha256Provider;
        SessionStateStore::new(&mut context, &crypto, NOW)
            .store("Event1", "queue-1", Some(3), &policy(), "DirectLink", SECRET)?;

        let written = context
            .last_written(&session_cookie_name("Event1"))
            .ok_or_else(|| anyhow::anyhow!("cookie should be written"))?;
        assert_eq!(written.expires_at, NOW + 86_400);
        assert_eq!(written.domain.as_deref(), Some(".test.com"));
        assert!(written.http_only);
        assert!(written.secure);

        let cookie = SessionCookie::decode(&written.value);
        assert_eq!(cookie.event_id, "Event1");
        assert_eq!(cookie.fixed_validity_minutes.as_deref(), Some("3"));
        assert_eq!(cookie.issue_time, NOW.to_string());
        assert!(written.value.starts_with("EventId=Event1&QueueId=queue-1&FixedValidityMins=3&RedirectType=DirectLink&IssueTime="));
        Ok(())
    }

    #[test]
    fn stored_cookie_reads_back_valid() -> anyhow::Result<()> {
        let value = stored_value("Event1", None, NOW)?;
        let mut context = MemoryHttpContext::new().with_cookie(&session_cookie_name("Event1"), &value);
        let crypto = HmacSha256Provider;
        let store = SessionStateStore::new(&mut context, &crypto, NOW + 60);

        let state = store.get_state("Event1", 10, SECRET, true);
        assert!(state.is_found);
        assert!(state.is_valid);
        assert!(state.is_state_extendable());
        assert_eq!(state.queue_id.as_deref(), Some("queue-1"));
        assert_eq!(state.redirect_type.as_deref(), Some("Queue"));
        Ok(())
    }

    #[test]
    fn fixed_validity_cookie_is_not_extendable() -> anyhow::Result<()> {
        let value = stored_value("Event1", Some(20), NOW)?;
        let mut context = MemoryHttpContext::new().with_cookie(&session_cookie_name("Event1"), &value);
        let crypto = HmacSha256Provider;
        let store = SessionStateStore::new(&mut context, &crypto, NOW);

        let state = store.get_state("Event1", 10, SECRET, true);
        assert!(state.is_valid);
        assert_eq!(state.fixed_cookie_validity_minutes, Some(20));
        assert!(!state.is_state_extendable());
        Ok(())
    }

    #[test]
    fn missing_cookie_is_not_found() {
        let mut context = MemoryHttpContext::new();
        let crypto = HmacSha256Provider;
        let store = SessionStateStore::new(&mut context, &crypto, NOW);

        let state = store.get_state("Event1", 10, SECRET, true);
        assert!(!state.is_found);
        assert!(!state.is_valid);
    }

    #[test]
    fn garbage_cookie_is_found_but_invalid() {
        let mut context =
            MemoryHttpContext::new().with_cookie(&session_cookie_name("Event1"), "%%garbage%%");
        let crypto = HmacSha256Provider;
        let store = SessionStateStore::new(&mut context, &crypto, NOW);

        let state = store.get_state("Event1", 10, SECRET, true);
        assert!(state.is_found);
        assert!(!state.is_valid);
        assert_eq!(state.rejection, Some(CookieRejection::Hash));
    }

    #[test]
    fn expired_cookie_is_invalid_unless_time_is_ignored() -> anyhow::Result<()> {
        let value = stored_value("Event1", None, NOW - 11 * 60)?;
        let mut context = MemoryHttpContext::new().with_cookie(&session_cookie_name("Event1"), &value);
        let crypto = HmacSha256Provider;
        let store = SessionStateStore::new(&mut context, &crypto, NOW);

        let expired = store.get_state("Event1", 10, SECRET, true);
        assert!(expired.is_found);
        assert!(!expired.is_valid);
        assert_eq!(expired.rejection, Some(CookieRejection::Expired));

        let untimed = store.get_state("Event1", super::IGNORE_VALIDITY, SECRET, false);
        assert!(untimed.is_valid);
        Ok(())
    }

    #[test]
    fn fixed_validity_overrides_policy_validity() -> anyhow::Result<()> {
        let value = stored_value("Event1", Some(30), NOW - 20 * 60)?;
        let mut context = MemoryHttpContext::new().with_cookie(&session_cookie_name("Event1"), &value);
        let crypto = HmacSha256Provider;
        let store = SessionStateStore::new(&mut context, &crypto, NOW);

        assert!(store.get_state("Event1", 10, SECRET, true).is_valid);
        Ok(())
    }

    #[test]
    fn huge_validity_saturates_instead_of_overflowing() -> anyhow::Result<()> {
        let value = stored_value("Event1", None, NOW)?;
        let mut context = MemoryHttpContext::new().with_cookie(&session_cookie_name("Event1"), &value);
        let crypto = HmacSha256Provider;
        let store = SessionStateStore::new(&mut context, &crypto, NOW + 60);
        assert!(store.get_state("Event1", i64::MAX / 2, SECRET, true).is_valid);

        let fixed = stored_value("Event2", Some(i64::MAX), NOW)?;
        let mut context = MemoryHttpContext::new().with_cookie(&session_cookie_name("Event2"), &fixed);
        let store = SessionStateStore::new(&mut context, &crypto, NOW + 60);
        assert!(store.get_state("Event2", 10, SECRET, true).is_valid);
        Ok(())
    }

    #[test]
    fn event_id_comparison_ignores_case() -> anyhow::Result<()> {
        let value = stored_value("Event1", None, NOW)?;
        let mut context = MemoryHttpContext::new().with_cookie(&session_cookie_name("EVENT1"), &value);
        let crypto = HmacSha256Provider;
        let store = SessionStateStore::new(&mut context, &crypto, NOW);

        assert!(store.get_state("EVENT1", 10, SECRET, true).is_valid);
        Ok(())
    }

    #[test]
    fn wrong_secret_invalidates_cookie() -> anyhow::Result<()> {
        let value = stored_value("Event1", None, NOW)?;
        let mut context = MemoryHttpContext::new().with_cookie(&session_cookie_name("Event1"), &value);
        let crypto = HmacSha256Provider;
        let store = SessionStateStore::new(&mut context, &crypto, NOW);

        let state = store.get_state("Event1", 10, "another-secret", true);
        assert!(state.is_found);
        assert!(!state.is_valid);
        Ok(())
    }

    #[test]
    fn cancel_writes_expired_empty_cookie() {
        let mut context = MemoryHttpContext::new();
        let crypto = HmacSha256Provider;
        SessionStateStore::new(&mut context, &crypto, NOW).cancel_queue_cookie("Event1", &policy());

        let written = context.last_written(&session_cookie_name("Event1"));
        assert_eq!(written.map(|cookie| cookie.value.as_str()), Some(""));
        assert_eq!(written.map(|cookie| cookie.expires_at), Some(0));
        assert_eq!(written.and_then(|cookie| cookie.domain.as_deref()), Some(".test.com"));
    }

    #[test]
    fn reissue_restamps_valid_cookie() -> anyhow::Result<()> {
        let value = stored_value("Event1", Some(5), NOW - 60)?;
        let mut context = MemoryHttpContext::new().with_cookie(&session_cookie_name("Event1"), &value);
        let crypto = HmacSha256Provider;
        SessionStateStore::new(&mut context, &crypto, NOW)
            .reissue_queue_cookie("Event1", 10, &policy(), SECRET)?;

        let written = context
            .last_written(&session_cookie_name("Event1"))
            .ok_or_else(|| anyhow::anyhow!("cookie should be reissued"))?;
        let cookie = SessionCookie::decode(&written.value);
        assert_eq!(cookie.issue_time, NOW.to_string());
        assert_eq!(cookie.queue_id, "queue-1");
        assert_eq!(cookie.fixed_validity_minutes.as_deref(), Some("5"));
        assert_eq!(cookie.redirect_type, "Queue");
        Ok(())
    }

    #[test]
    fn reissue_skips_expired_or_missing_cookie() -> anyhow::Result<()> {
        let value = stored_value("Event1", None, NOW - 30 * 60)?;
        let mut context = MemoryHttpContext::new().with_cookie(&session_cookie_name("Event1"), &value);
        let crypto = HmacSha256Provider;
        SessionStateStore::new(&mut context, &crypto, NOW)
            .reissue_queue_cookie("Event1", 10, &policy(), SECRET)?;
        assert!(context.written_cookies().is_empty());

        let mut empty = MemoryHttpContext::new();
        SessionStateStore::new(&mut empty, &crypto, NOW)
            .reissue_queue_cookie("Event1", 10, &policy(), SECRET)?;
        assert!(empty.written_cookies().is_empty());
        Ok(())
    }
}
