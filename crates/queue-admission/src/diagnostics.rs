//! Signed debug tokens and the `queueitdebug` cookie they unlock.
//!
//! Diagnostics leak request and configuration details, so they are only
//! switched on by a token carrying `rt_debug` and signed with the customer's
//! secret key. A debug token that fails verification short-circuits the
//! request with a redirect to the diagnostics error page.

use tracing::debug;

use crate::admission::ValidationResult;
use crate::crypto::CryptoProvider;
use crate::http::{CookiePolicy, HttpContext};
use crate::integration::ActionType;
use crate::token::QueueToken;

pub const DEBUG_COOKIE_NAME: &str = "queueitdebug";

const DEBUG_COOKIE_LIFETIME_SECONDS: i64 = 20 * 60;
const DEBUG_REDIRECT_TYPE: &str = "debug";
const SETUP_ERROR_URL: &str = "https://api2.queue-it.net/diagnostics/connector/error/?code=setup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticsOutcome {
    /// No debug token on the request.
    Disabled,
    Enabled,
    /// Debug token present but unusable; the request must be redirected.
    Rejected(ValidationResult),
}

impl DiagnosticsOutcome {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }

    pub fn has_error(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    pub fn result(&self) -> Option<&ValidationResult> {
        match self {
            Self::Rejected(result) => Some(result),
            Self::Disabled | Self::Enabled => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticsVerifier;

impl DiagnosticsVerifier {
    pub fn verify<C: CryptoProvider>(
        &self,
        customer_id: &str,
        secret_key: &str,
        queueit_token: Option<&str>,
        now: i64,
        crypto: &C,
    ) -> DiagnosticsOutcome {
        let Some(token) = queueit_token.and_then(QueueToken::parse) else {
            return DiagnosticsOutcome::Disabled;
        };
        let is_debug = token
            .redirect_type
            .as_deref()
            .is_some_and(|redirect_type| redirect_type.eq_ignore_ascii_case(DEBUG_REDIRECT_TYPE));
        if !is_debug {
            return DiagnosticsOutcome::Disabled;
        }

        if customer_id.is_empty() || secret_key.is_empty() {
            debug!("debug token without connector setup");
            return rejected(SETUP_ERROR_URL.to_string());
        }

        let hash_matches = crypto
            .hmac_sha256_hex(secret_key, &token.token_without_hash)
            .is_ok_and(|expected| expected == token.hash);
        if !hash_matches {
            debug!(customer_id, "debug token hash mismatch");
            return rejected(token_error_url(customer_id, "hash"));
        }

        if token.timestamp < now {
            debug!(customer_id, "debug token expired");
            return rejected(token_error_url(customer_id, "timestamp"));
        }

        DiagnosticsOutcome::Enabled
    }
}

fn rejected(redirect_url: String) -> DiagnosticsOutcome {
    DiagnosticsOutcome::Rejected(ValidationResult::new(
        Some(ActionType::ConnectorDiagnosticsRedirect),
        None,
        None,
        Some(redirect_url),
        None,
        None,
    ))
}

fn token_error_url(customer_id: &str, code: &str) -> String {
    format!(
        "https://{customer_id}.api2.queue-it.net/{customer_id}/diagnostics/connector/error/?code={code}"
    )
}

/// Entries collected while diagnostics are enabled, written as one cookie.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticLog {
    enabled: bool,
    entries: Vec<(String, String)>,
}

impl DiagnosticLog {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record `key`; a repeated key replaces the earlier value in place.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        if !self.enabled {
            return;
        }
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn cookie_value(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("|")
    }

    pub fn flush(&self, context: &mut dyn HttpContext, policy: &CookiePolicy, now: i64) {
        if !self.enabled || self.entries.is_empty() {
            return;
        }
        let policy = CookiePolicy {
            domain: None,
            ..policy.clone()
        };
        context.set_cookie(policy.cookie(
            DEBUG_COOKIE_NAME,
            &self.cookie_value(),
            now + DEBUG_COOKIE_LIFETIME_SECONDS,
        ));
    }
}
