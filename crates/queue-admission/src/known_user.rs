//! Request-level entry points. An application calls one of these once per
//! request and applies the returned [`ValidationResult`].

use std::env::consts;

use chrono::{DateTime, SecondsFormat};
use tracing::{debug, warn};

use crate::admission::{
    AdmissionService, CancelEventConfig, QueueEventConfig, SDK_VERSION, ValidationResult,
};
use crate::clock::{Clock, SystemClock};
use crate::config::ConnectorSettings;
use crate::crypto::{CryptoProvider, HmacSha256Provider};
use crate::diagnostics::{DiagnosticLog, DiagnosticsOutcome, DiagnosticsVerifier};
use crate::error::ConnectorError;
use crate::http::{CookiePolicy, HttpContext};
use crate::integration::{ActionType, CustomerIntegration, IntegrationConfig, RedirectLogic};
use crate::token::QUEUEIT_TOKEN_KEY;
use crate::trigger::TriggerEvaluator;

/// Request header set by the client-side script on AJAX calls.
pub const AJAX_PAGE_URL_HEADER: &str = "x-queueit-ajaxpageurl";

const FORWARDING_HEADERS: [(&str, &str); 5] = [
    ("RequestHttpHeader_Via", "via"),
    ("RequestHttpHeader_Forwarded", "forwarded"),
    ("RequestHttpHeader_XForwardedFor", "x-forwarded-for"),
    ("RequestHttpHeader_XForwardedHost", "x-forwarded-host"),
    ("RequestHttpHeader_XForwardedProto", "x-forwarded-proto"),
];

pub struct KnownUser<C = HmacSha256Provider, K = SystemClock> {
    settings: ConnectorSettings,
    crypto: C,
    clock: K,
}

impl KnownUser {
    pub fn new(settings: ConnectorSettings) -> Self {
        Self::with_collaborators(settings, HmacSha256Provider, SystemClock)
    }
}

impl<C: CryptoProvider, K: Clock> KnownUser<C, K> {
    pub fn with_collaborators(settings: ConnectorSettings, crypto: C, clock: K) -> Self {
        Self {
            settings,
            crypto,
            clock,
        }
    }

    pub fn settings(&self) -> &ConnectorSettings {
        &self.settings
    }

    /// Match the request against the integration document and act on the
    /// first matching integration. No match yields a result without action.
    pub fn validate_request_by_integration_config(
        &self,
        context: &mut dyn HttpContext,
        current_url: &str,
        queueit_token: Option<&str>,
        integration: Option<&CustomerIntegration>,
    ) -> Result<ValidationResult, ConnectorError> {
        let now = self.clock.now();
        let mut log = match self.verify_diagnostics(queueit_token, now) {
            DiagnosticsOutcome::Rejected(result) => return Ok(result),
            outcome => DiagnosticLog::new(outcome.is_enabled()),
        };

        if let Some(version) = integration.and_then(|document| document.version) {
            log.set("ConfigVersion", version.to_string());
        }
        log.set("PureUrl", current_url);
        log.set("QueueitToken", queueit_token.unwrap_or_default());
        log_request_details(&mut log, context, now);

        let result = self.dispatch(context, current_url, queueit_token, integration, now, &mut log);
        self.finish(context, &mut log, now, result)
    }

    pub fn resolve_queue_request_by_local_config(
        &self,
        context: &mut dyn HttpContext,
        target_url: &str,
        queueit_token: Option<&str>,
        config: &QueueEventConfig,
    ) -> Result<ValidationResult, ConnectorError> {
        let now = self.clock.now();
        let mut log = match self.verify_diagnostics(queueit_token, now) {
            DiagnosticsOutcome::Rejected(result) => return Ok(result),
            outcome => DiagnosticLog::new(outcome.is_enabled()),
        };
        log_request_details(&mut log, context, now);

        let result = self.resolve_queue(context, target_url, queueit_token, config, now, &mut log);
        self.finish(context, &mut log, now, result)
    }

    pub fn cancel_request_by_local_config(
        &self,
        context: &mut dyn HttpContext,
        target_url: &str,
        queueit_token: Option<&str>,
        config: &CancelEventConfig,
    ) -> Result<ValidationResult, ConnectorError> {
        let now = self.clock.now();
        let mut log = match self.verify_diagnostics(queueit_token, now) {
            DiagnosticsOutcome::Rejected(result) => return Ok(result),
            outcome => DiagnosticLog::new(outcome.is_enabled()),
        };
        log.set("QueueitToken", queueit_token.unwrap_or_default());
        log_request_details(&mut log, context, now);

        let result = self.cancel(context, target_url, config, now, &mut log);
        self.finish(context, &mut log, now, result)
    }

    /// Re-stamp a valid session cookie for `event_id`. Invalid or missing
    /// cookies are left alone.
    pub fn extend_queue_cookie(
        &self,
        context: &mut dyn HttpContext,
        event_id: &str,
        cookie_validity_minute: i64,
        cookie_domain: Option<&str>,
        is_cookie_http_only: bool,
        is_cookie_secure: bool,
    ) -> Result<(), ConnectorError> {
        if event_id.is_empty() {
            return Err(ConnectorError::MissingEventId);
        }
        if cookie_validity_minute <= 0 {
            return Err(ConnectorError::NonPositiveCookieValidity);
        }
        if self.settings.secret_key.is_empty() {
            return Err(ConnectorError::MissingSecretKey);
        }

        let policy = CookiePolicy {
            domain: cookie_domain.map(str::to_string),
            http_only: is_cookie_http_only,
            secure: is_cookie_secure,
            same_site: self.settings.cookie_same_site,
        };
        AdmissionService::new(context, &self.crypto, self.clock.now()).extend_queue_cookie(
            event_id,
            cookie_validity_minute,
            &policy,
            &self.settings.secret_key,
        )
    }

    fn verify_diagnostics(&self, queueit_token: Option<&str>, now: i64) -> DiagnosticsOutcome {
        DiagnosticsVerifier.verify(
            &self.settings.customer_id,
            &self.settings.secret_key,
            queueit_token,
            now,
            &self.crypto,
        )
    }

    fn dispatch(
        &self,
        context: &mut dyn HttpContext,
        current_url: &str,
        queueit_token: Option<&str>,
        integration: Option<&CustomerIntegration>,
        now: i64,
        log: &mut DiagnosticLog,
    ) -> Result<ValidationResult, ConnectorError> {
        if current_url.is_empty() {
            return Err(ConnectorError::MissingCurrentUrl);
        }
        let integration = integration.ok_or(ConnectorError::MissingIntegrationConfig)?;

        let matched = TriggerEvaluator.matched_integration(integration, current_url, &*context);
        log.set(
            "MatchedConfig",
            matched.map_or("NULL", |config| config.name.as_str()),
        );
        let Some(matched) = matched else {
            return Ok(ValidationResult::unmatched());
        };

        match matched.action_type {
            ActionType::Queue => {
                let target = queue_target_url(matched, current_url, &*context);
                let config = self.queue_config(matched, integration.version);
                self.resolve_queue(context, &target, queueit_token, &config, now, log)
            }
            ActionType::Cancel => {
                let target = target_url(current_url, &*context);
                let config = self.cancel_config(matched, integration.version);
                self.cancel(context, &target, &config, now, log)
            }
            ActionType::Ignore | ActionType::ConnectorDiagnosticsRedirect => {
                if matched.action_type == ActionType::ConnectorDiagnosticsRedirect {
                    warn!(
                        integration = %matched.name,
                        "diagnostics redirect is not a configurable action"
                    );
                }
                debug!(integration = %matched.name, "request ignored");
                let is_ajax = is_ajax_call(&*context);
                Ok(AdmissionService::<C>::ignore_result(&matched.name).with_ajax(is_ajax))
            }
        }
    }

    fn resolve_queue(
        &self,
        context: &mut dyn HttpContext,
        target_url: &str,
        queueit_token: Option<&str>,
        config: &QueueEventConfig,
        now: i64,
        log: &mut DiagnosticLog,
    ) -> Result<ValidationResult, ConnectorError> {
        log.set("TargetUrl", target_url);
        log.set("QueueitToken", queueit_token.unwrap_or_default());
        log.set("QueueConfig", config.to_string());

        self.require_credentials()?;
        if config.event_id.is_empty() {
            return Err(ConnectorError::MissingConfigEventId {
                source_config: "queueConfig",
            });
        }
        if config.queue_domain.is_empty() {
            return Err(ConnectorError::MissingQueueDomain {
                source_config: "queueConfig",
            });
        }
        if config.cookie_validity_minute <= 0 {
            return Err(ConnectorError::NonPositiveConfigCookieValidity);
        }

        let config = QueueEventConfig {
            cookie_same_site: config.cookie_same_site.or(self.settings.cookie_same_site),
            ..config.clone()
        };
        let is_ajax = is_ajax_call(&*context);
        let result = AdmissionService::new(context, &self.crypto, now).validate_queue_request(
            target_url,
            queueit_token,
            &config,
            &self.settings.customer_id,
            &self.settings.secret_key,
        )?;
        Ok(result.with_ajax(is_ajax))
    }

    fn cancel(
        &self,
        context: &mut dyn HttpContext,
        target_url: &str,
        config: &CancelEventConfig,
        now: i64,
        log: &mut DiagnosticLog,
    ) -> Result<ValidationResult, ConnectorError> {
        log.set("TargetUrl", target_url);
        log.set("CancelConfig", config.to_string());

        if target_url.is_empty() {
            return Err(ConnectorError::MissingTargetUrl);
        }
        self.require_credentials()?;
        if config.event_id.is_empty() {
            return Err(ConnectorError::MissingConfigEventId {
                source_config: "cancelConfig",
            });
        }
        if config.queue_domain.is_empty() {
            return Err(ConnectorError::MissingQueueDomain {
                source_config: "cancelConfig",
            });
        }

        let config = CancelEventConfig {
            cookie_same_site: config.cookie_same_site.or(self.settings.cookie_same_site),
            ..config.clone()
        };
        let is_ajax = is_ajax_call(&*context);
        let result = AdmissionService::new(context, &self.crypto, now).validate_cancel_request(
            target_url,
            &config,
            &self.settings.customer_id,
            &self.settings.secret_key,
        );
        Ok(result.with_ajax(is_ajax))
    }

    fn require_credentials(&self) -> Result<(), ConnectorError> {
        if self.settings.customer_id.is_empty() {
            return Err(ConnectorError::MissingCustomerId);
        }
        if self.settings.secret_key.is_empty() {
            return Err(ConnectorError::MissingSecretKey);
        }
        Ok(())
    }

    fn queue_config(&self, matched: &IntegrationConfig, version: Option<i64>) -> QueueEventConfig {
        QueueEventConfig {
            event_id: matched.event_id.clone(),
            queue_domain: matched.queue_domain.clone(),
            layout_name: matched.layout_name.clone(),
            culture: matched.culture.clone(),
            cookie_domain: matched.cookie_domain.clone(),
            cookie_validity_minute: matched.cookie_validity_minute,
            extend_cookie_validity: matched.extend_cookie_validity,
            is_cookie_http_only: matched.is_cookie_http_only,
            is_cookie_secure: matched.is_cookie_secure,
            cookie_same_site: self.settings.cookie_same_site,
            version,
            action_name: matched.name.clone(),
        }
    }

    fn cancel_config(&self, matched: &IntegrationConfig, version: Option<i64>) -> CancelEventConfig {
        CancelEventConfig {
            event_id: matched.event_id.clone(),
            queue_domain: matched.queue_domain.clone(),
            cookie_domain: matched.cookie_domain.clone(),
            is_cookie_http_only: matched.is_cookie_http_only,
            is_cookie_secure: matched.is_cookie_secure,
            cookie_same_site: self.settings.cookie_same_site,
            version,
            action_name: matched.name.clone(),
        }
    }

    /// Record a failure, write the debug cookie, and hand the outcome back.
    fn finish(
        &self,
        context: &mut dyn HttpContext,
        log: &mut DiagnosticLog,
        now: i64,
        result: Result<ValidationResult, ConnectorError>,
    ) -> Result<ValidationResult, ConnectorError> {
        if let Err(error) = &result {
            log.set("Exception", error.to_string());
        }
        let policy = CookiePolicy {
            same_site: self.settings.cookie_same_site,
            ..CookiePolicy::default()
        };
        log.flush(context, &policy, now);
        result
    }
}

fn log_request_details(log: &mut DiagnosticLog, context: &dyn HttpContext, now: i64) {
    if !log.is_enabled() {
        return;
    }
    log.set("SdkVersion", SDK_VERSION);
    log.set("Runtime", format!("rust-{}-{}", consts::OS, consts::ARCH));
    log.set("OriginalUrl", context.absolute_uri().unwrap_or_default());
    log.set(
        "ServerUtcTime",
        DateTime::from_timestamp(now, 0)
            .map(|time| time.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default(),
    );
    log.set("RequestIP", context.user_host_address().unwrap_or_default());
    for (key, header) in FORWARDING_HEADERS {
        log.set(key, context.header(header).unwrap_or_default());
    }
}

fn is_ajax_call(context: &dyn HttpContext) -> bool {
    context
        .header(AJAX_PAGE_URL_HEADER)
        .is_some_and(|value| !value.is_empty())
}

/// Page the visitor returns to: the AJAX caller's page when present,
/// otherwise the current URL.
fn target_url(current_url: &str, context: &dyn HttpContext) -> String {
    match context
        .header(AJAX_PAGE_URL_HEADER)
        .filter(|value| !value.is_empty())
    {
        Some(encoded) => match urlencoding::decode(&encoded) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => encoded.clone(),
        },
        None => current_url.to_string(),
    }
}

fn queue_target_url(
    matched: &IntegrationConfig,
    current_url: &str,
    context: &dyn HttpContext,
) -> String {
    match matched.redirect_logic {
        RedirectLogic::ForcedTargetUrl => matched.forced_target_url.clone().unwrap_or_default(),
        RedirectLogic::EventTargetUrl => String::new(),
        RedirectLogic::AllowTargetUrl | RedirectLogic::Unknown => {
            target_url(current_url, context)
        }
    }
}

/// Split the `queueittoken` parameter off `url`, returning the remaining URL
/// and the decoded token.
pub fn split_queueit_token(url: &str) -> (String, Option<String>) {
    let (without_fragment, fragment) = match url.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (url, None),
    };
    let Some((base, query)) = without_fragment.split_once('?') else {
        return (url.to_string(), None);
    };

    let mut token = None;
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| match pair.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case(QUEUEIT_TOKEN_KEY) => {
                token = Some(
                    urlencoding::decode(value)
                        .map(|decoded| decoded.into_owned())
                        .unwrap_or_else(|_| value.to_string()),
                );
                false
            }
            _ => true,
        })
        .collect();

    let mut remaining = base.to_string();
    if !kept.is_empty() {
        remaining.push('?');
        remaining.push_str(&kept.join("&"));
    }
    if let Some(fragment) = fragment {
        remaining.push('#');
        remaining.push_str(fragment);
    }
    (remaining, token)
}
