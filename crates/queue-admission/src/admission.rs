use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::crypto::CryptoProvider;
use crate::error::ConnectorError;
use crate::http::{CookiePolicy, HttpContext, SameSite};
use crate::integration::ActionType;
use crate::session::{CookieRejection, IGNORE_VALIDITY, SessionStateStore};
use crate::token::{QueueToken, extract_queue_params};

pub const SDK_VERSION: &str = concat!("v3-rust-", env!("CARGO_PKG_VERSION"));

/// Response header carrying the redirect for AJAX callers.
pub const AJAX_REDIRECT_HEADER: &str = "x-queueit-redirect";

/// Final decision for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    action_type: Option<ActionType>,
    event_id: Option<String>,
    queue_id: Option<String>,
    redirect_url: Option<String>,
    redirect_type: Option<String>,
    action_name: Option<String>,
    is_ajax_result: bool,
}

impl ValidationResult {
    pub fn new(
        action_type: Option<ActionType>,
        event_id: Option<String>,
        queue_id: Option<String>,
        redirect_url: Option<String>,
        redirect_type: Option<String>,
        action_name: Option<String>,
    ) -> Self {
        Self {
            action_type,
            event_id,
            queue_id,
            redirect_url,
            redirect_type,
            action_name,
            is_ajax_result: false,
        }
    }

    /// Result for a request no integration applies to.
    pub fn unmatched() -> Self {
        Self::default()
    }

    pub(crate) fn with_ajax(mut self, is_ajax_result: bool) -> Self {
        self.is_ajax_result = is_ajax_result;
        self
    }

    pub fn action_type(&self) -> Option<ActionType> {
        self.action_type
    }

    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn queue_id(&self) -> Option<&str> {
        self.queue_id.as_deref()
    }

    pub fn redirect_url(&self) -> Option<&str> {
        self.redirect_url.as_deref()
    }

    pub fn redirect_type(&self) -> Option<&str> {
        self.redirect_type.as_deref()
    }

    pub fn action_name(&self) -> Option<&str> {
        self.action_name.as_deref()
    }

    pub fn is_ajax_result(&self) -> bool {
        self.is_ajax_result
    }

    pub fn do_redirect(&self) -> bool {
        self.redirect_url.as_deref().is_some_and(|url| !url.is_empty())
    }

    /// Redirect URL encoded for the [`AJAX_REDIRECT_HEADER`] value.
    pub fn ajax_redirect_url(&self) -> String {
        self.redirect_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| urlencoding::encode(url).into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueEventConfig {
    pub event_id: String,
    pub queue_domain: String,
    pub layout_name: Option<String>,
    pub culture: Option<String>,
    pub cookie_domain: Option<String>,
    pub cookie_validity_minute: i64,
    pub extend_cookie_validity: bool,
    pub is_cookie_http_only: bool,
    pub is_cookie_secure: bool,
    pub cookie_same_site: Option<SameSite>,
    pub version: Option<i64>,
    pub action_name: String,
}

impl QueueEventConfig {
    pub fn cookie_policy(&self) -> CookiePolicy {
        CookiePolicy {
            domain: self.cookie_domain.clone(),
            http_only: self.is_cookie_http_only,
            secure: self.is_cookie_secure,
            same_site: self.cookie_same_site,
        }
    }
}

impl fmt::Display for QueueEventConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EventId:{}&Version:{}&QueueDomain:{}&CookieDomain:{}&IsCookieHttpOnly:{}&IsCookieSecure:{}&ExtendCookieValidity:{}&CookieValidityMinute:{}&LayoutName:{}&Culture:{}&ActionName:{}",
            self.event_id,
            version_text(self.version),
            self.queue_domain,
            self.cookie_domain.as_deref().unwrap_or_default(),
            self.is_cookie_http_only,
            self.is_cookie_secure,
            self.extend_cookie_validity,
            self.cookie_validity_minute,
            self.layout_name.as_deref().unwrap_or_default(),
            self.culture.as_deref().unwrap_or_default(),
            self.action_name,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CancelEventConfig {
    pub event_id: String,
    pub queue_domain: String,
    pub cookie_domain: Option<String>,
    pub is_cookie_http_only: bool,
    pub is_cookie_secure: bool,
    pub cookie_same_site: Option<SameSite>,
    pub version: Option<i64>,
    pub action_name: String,
}

impl CancelEventConfig {
    pub fn cookie_policy(&self) -> CookiePolicy {
        CookiePolicy {
            domain: self.cookie_domain.clone(),
            http_only: self.is_cookie_http_only,
            secure: self.is_cookie_secure,
            same_site: self.cookie_same_site,
        }
    }
}

impl fmt::Display for CancelEventConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EventId:{}&Version:{}&QueueDomain:{}&CookieDomain:{}&IsCookieHttpOnly:{}&IsCookieSecure:{}&ActionName:{}",
            self.event_id,
            version_text(self.version),
            self.queue_domain,
            self.cookie_domain.as_deref().unwrap_or_default(),
            self.is_cookie_http_only,
            self.is_cookie_secure,
            self.action_name,
        )
    }
}

/// Reason an admission token was rejected; also the error page path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenErrorCode {
    Hash,
    EventId,
    Timestamp,
}

impl TokenErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::EventId => "eventid",
            Self::Timestamp => "timestamp",
        }
    }
}

/// Turns the session cookie and an optional admission token into a decision.
pub struct AdmissionService<'a, C: CryptoProvider> {
    state: SessionStateStore<'a, C>,
    crypto: &'a C,
    now: i64,
}

impl<'a, C: CryptoProvider> AdmissionService<'a, C> {
    pub fn new(context: &'a mut dyn HttpContext, crypto: &'a C, now: i64) -> Self {
        Self {
            state: SessionStateStore::new(context, crypto, now),
            crypto,
            now,
        }
    }

    pub fn validate_queue_request(
        &mut self,
        target_url: &str,
        queueit_token: Option<&str>,
        config: &QueueEventConfig,
        customer_id: &str,
        secret_key: &str,
    ) -> Result<ValidationResult, ConnectorError> {
        let policy = config.cookie_policy();
        let state = self.state.get_state(
            &config.event_id,
            config.cookie_validity_minute,
            secret_key,
            true,
        );

        if state.is_valid {
            if state.is_state_extendable() && config.extend_cookie_validity {
                self.state.store(
                    &config.event_id,
                    state.queue_id.as_deref().unwrap_or_default(),
                    None,
                    &policy,
                    state.redirect_type.as_deref().unwrap_or_default(),
                    secret_key,
                )?;
            }
            return Ok(ValidationResult::new(
                Some(ActionType::Queue),
                Some(config.event_id.clone()),
                state.queue_id,
                None,
                state.redirect_type,
                Some(config.action_name.clone()),
            ));
        }

        let mut token_accepted = false;
        let result = match extract_queue_params(queueit_token) {
            Some(token) => match self.validate_token(config, &token, secret_key) {
                Ok(()) => {
                    token_accepted = true;
                    self.accept_token(config, &token, &policy, secret_key)?
                }
                Err(code) => {
                    debug!(
                        event_id = %config.event_id,
                        error_code = code.as_str(),
                        "admission token rejected"
                    );
                    self.error_result(customer_id, target_url, config, Some(&token), code)
                }
            },
            None if state.rejection == Some(CookieRejection::Hash) => {
                debug!(event_id = %config.event_id, "tampered session cookie without token");
                self.error_result(customer_id, target_url, config, None, TokenErrorCode::Hash)
            }
            None => self.queue_result(target_url, config, customer_id),
        };

        if state.is_found && !token_accepted {
            self.state.cancel_queue_cookie(&config.event_id, &policy);
        }

        Ok(result)
    }

    pub fn validate_cancel_request(
        &mut self,
        target_url: &str,
        config: &CancelEventConfig,
        customer_id: &str,
        secret_key: &str,
    ) -> ValidationResult {
        let state = self
            .state
            .get_state(&config.event_id, IGNORE_VALIDITY, secret_key, false);

        if !state.is_valid {
            return ValidationResult::new(
                Some(ActionType::Cancel),
                Some(config.event_id.clone()),
                None,
                None,
                None,
                Some(config.action_name.clone()),
            );
        }

        self.state
            .cancel_queue_cookie(&config.event_id, &config.cookie_policy());

        let mut query = query_string(
            customer_id,
            &config.event_id,
            config.version,
            None,
            None,
            &config.action_name,
        );
        if !target_url.is_empty() {
            query.push_str(&format!("&r={}", urlencoding::encode(target_url)));
        }
        let path = format!("cancel/{customer_id}/{}/", config.event_id);

        ValidationResult::new(
            Some(ActionType::Cancel),
            Some(config.event_id.clone()),
            state.queue_id,
            Some(redirect_url(&config.queue_domain, &path, &query)),
            state.redirect_type,
            Some(config.action_name.clone()),
        )
    }

    pub fn extend_queue_cookie(
        &mut self,
        event_id: &str,
        cookie_validity_minutes: i64,
        policy: &CookiePolicy,
        secret_key: &str,
    ) -> Result<(), ConnectorError> {
        self.state
            .reissue_queue_cookie(event_id, cookie_validity_minutes, policy, secret_key)?;
        Ok(())
    }

    pub fn ignore_result(action_name: &str) -> ValidationResult {
        ValidationResult::new(
            Some(ActionType::Ignore),
            None,
            None,
            None,
            None,
            Some(action_name.to_string()),
        )
    }

    fn validate_token(
        &self,
        config: &QueueEventConfig,
        token: &QueueToken,
        secret_key: &str,
    ) -> Result<(), TokenErrorCode> {
        let expected = self
            .crypto
            .hmac_sha256_hex(secret_key, &token.token_without_hash)
            .map_err(|_| TokenErrorCode::Hash)?;
        if expected != token.hash {
            return Err(TokenErrorCode::Hash);
        }
        if !token.event_id.eq_ignore_ascii_case(&config.event_id) {
            return Err(TokenErrorCode::EventId);
        }
        if token.timestamp < self.now {
            return Err(TokenErrorCode::Timestamp);
        }
        Ok(())
    }

    fn accept_token(
        &mut self,
        config: &QueueEventConfig,
        token: &QueueToken,
        policy: &CookiePolicy,
        secret_key: &str,
    ) -> Result<ValidationResult, ConnectorError> {
        debug!(event_id = %config.event_id, queue_id = %token.queue_id, "admission token accepted");
        self.state.store(
            &config.event_id,
            &token.queue_id,
            token.cookie_validity_minutes,
            policy,
            token.redirect_type.as_deref().unwrap_or_default(),
            secret_key,
        )?;

        Ok(ValidationResult::new(
            Some(ActionType::Queue),
            Some(config.event_id.clone()),
            Some(token.queue_id.clone()),
            None,
            token.redirect_type.clone(),
            Some(config.action_name.clone()),
        ))
    }

    fn error_result(
        &self,
        customer_id: &str,
        target_url: &str,
        config: &QueueEventConfig,
        token: Option<&QueueToken>,
        code: TokenErrorCode,
    ) -> ValidationResult {
        let mut query = query_string(
            customer_id,
            &config.event_id,
            config.version,
            config.culture.as_deref(),
            config.layout_name.as_deref(),
            &config.action_name,
        );
        if let Some(token) = token {
            query.push_str(&format!("&queueittoken={}", token.raw));
        }
        query.push_str(&format!("&ts={}", self.now));
        if !target_url.is_empty() {
            query.push_str(&format!("&t={}", urlencoding::encode(target_url)));
        }
        let path = format!("error/{}/", code.as_str());

        ValidationResult::new(
            Some(ActionType::Queue),
            Some(config.event_id.clone()),
            None,
            Some(redirect_url(&config.queue_domain, &path, &query)),
            None,
            Some(config.action_name.clone()),
        )
    }

    fn queue_result(
        &self,
        target_url: &str,
        config: &QueueEventConfig,
        customer_id: &str,
    ) -> ValidationResult {
        let mut query = query_string(
            customer_id,
            &config.event_id,
            config.version,
            config.culture.as_deref(),
            config.layout_name.as_deref(),
            &config.action_name,
        );
        if !target_url.is_empty() {
            query.push_str(&format!("&t={}", urlencoding::encode(target_url)));
        }

        ValidationResult::new(
            Some(ActionType::Queue),
            Some(config.event_id.clone()),
            None,
            Some(redirect_url(&config.queue_domain, "", &query)),
            None,
            Some(config.action_name.clone()),
        )
    }
}

fn version_text(version: Option<i64>) -> String {
    version.map_or_else(|| "-1".to_string(), |value| value.to_string())
}

fn query_string(
    customer_id: &str,
    event_id: &str,
    config_version: Option<i64>,
    culture: Option<&str>,
    layout_name: Option<&str>,
    action_name: &str,
) -> String {
    let mut query = format!(
        "c={}&e={}&ver={SDK_VERSION}&cver={}&man={}",
        urlencoding::encode(customer_id),
        urlencoding::encode(event_id),
        version_text(config_version),
        urlencoding::encode(action_name),
    );
    if let Some(culture) = culture.filter(|value| !value.is_empty()) {
        query.push_str(&format!("&cid={}", urlencoding::encode(culture)));
    }
    if let Some(layout_name) = layout_name.filter(|value| !value.is_empty()) {
        query.push_str(&format!("&l={}", urlencoding::encode(layout_name)));
    }
    query
}

fn redirect_url(queue_domain: &str, path: &str, query: &str) -> String {
    let separator = if queue_domain.ends_with('/') { "" } else { "/" };
    format!("https://{queue_domain}{separator}{path}?{query}")
}
