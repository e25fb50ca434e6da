use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::comparison;
use crate::http::HttpContext;
use crate::integration::{
    CustomerIntegration, IntegrationConfig, LogicalOperator, Trigger, TriggerPart, UrlPart,
    ValidatorType,
};

// RFC 3986 appendix B. Every group is optional, so any input matches.
static URI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[expect(clippy::expect_used, reason = "constant pattern")]
    Regex::new(r"^(([^:/?#]+):)?(//([^/?#]*))?([^?#]*)(\?([^#]*))?(#(.*))?").expect("valid regex")
});

/// Loose decomposition of a URL. Missing components are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlComponents {
    pub scheme: String,
    pub authority: String,
    pub path: String,
    pub query: String,
    pub fragment: String,
}

impl UrlComponents {
    pub fn parse(url: &str) -> Self {
        let Some(captures) = URI_PATTERN.captures(url) else {
            return Self::default();
        };
        let group = |index: usize| {
            captures
                .get(index)
                .map(|value| value.as_str().to_string())
                .unwrap_or_default()
        };

        Self {
            scheme: group(2),
            authority: group(4),
            path: group(5),
            query: group(7),
            fragment: group(9),
        }
    }

    /// Authority without user info or port.
    pub fn host(&self) -> &str {
        let host_port = self
            .authority
            .rsplit_once('@')
            .map_or(self.authority.as_str(), |(_, rest)| rest);

        if host_port.starts_with('[') {
            return host_port
                .find(']')
                .map_or(host_port, |end| &host_port[..=end]);
        }

        host_port
            .split_once(':')
            .map_or(host_port, |(host, _)| host)
    }
}

/// Request value a trigger part compares against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource<'a> {
    Url(UrlPart),
    Cookie(&'a str),
    UserAgent,
    Header(&'a str),
    RequestBody,
    Unsupported,
}

impl<'a> ValueSource<'a> {
    pub fn for_part(part: &'a TriggerPart) -> Self {
        match part.validator_type {
            ValidatorType::Url => Self::Url(part.url_part.unwrap_or(UrlPart::Unknown)),
            ValidatorType::Cookie => Self::Cookie(part.cookie_name.as_deref().unwrap_or_default()),
            ValidatorType::UserAgent => Self::UserAgent,
            ValidatorType::HttpHeader => {
                Self::Header(part.http_header_name.as_deref().unwrap_or_default())
            }
            ValidatorType::RequestBody => Self::RequestBody,
            ValidatorType::Unknown => Self::Unsupported,
        }
    }

    /// Resolve the value for this request. `None` means the part can never
    /// match.
    pub fn resolve(&self, current_url: &str, request: &dyn HttpContext) -> Option<String> {
        match self {
            Self::Url(UrlPart::PageUrl) => Some(current_url.to_string()),
            Self::Url(UrlPart::PagePath) => Some(UrlComponents::parse(current_url).path),
            Self::Url(UrlPart::HostName) => {
                Some(UrlComponents::parse(current_url).host().to_string())
            }
            Self::Url(UrlPart::Unknown) => Some(String::new()),
            Self::Cookie(name) => Some(request.cookie_value(name).unwrap_or_default()),
            Self::UserAgent => Some(request.user_agent().unwrap_or_default()),
            Self::Header(name) => Some(request.header(name).unwrap_or_default()),
            Self::RequestBody => Some(request.request_body().unwrap_or_default()),
            Self::Unsupported => None,
        }
    }
}

/// Picks the integration that applies to a request.
#[derive(Debug, Default, Clone, Copy)]
pub struct TriggerEvaluator;

impl TriggerEvaluator {
    /// First integration, in declaration order, with any matching trigger.
    pub fn matched_integration<'c>(
        &self,
        customer_integration: &'c CustomerIntegration,
        current_url: &str,
        request: &dyn HttpContext,
    ) -> Option<&'c IntegrationConfig> {
        let matched = customer_integration.integrations.iter().find(|integration| {
            integration
                .triggers
                .iter()
                .any(|trigger| self.evaluate_trigger(trigger, current_url, request))
        });

        match matched {
            Some(integration) => debug!(
                integration = %integration.name,
                event_id = %integration.event_id,
                "matched integration"
            ),
            None => debug!(current_url, "no integration matched"),
        }
        matched
    }

    pub fn evaluate_trigger(
        &self,
        trigger: &Trigger,
        current_url: &str,
        request: &dyn HttpContext,
    ) -> bool {
        let mut parts = trigger.trigger_parts.iter();
        match trigger.logical_operator {
            LogicalOperator::Or => parts.any(|part| self.evaluate_part(part, current_url, request)),
            LogicalOperator::And => parts.all(|part| self.evaluate_part(part, current_url, request)),
        }
    }

    pub fn evaluate_part(
        &self,
        part: &TriggerPart,
        current_url: &str,
        request: &dyn HttpContext,
    ) -> bool {
        let source = ValueSource::for_part(part);
        let Some(value) = source.resolve(current_url, request) else {
            warn!(
                validator_type = ?part.validator_type,
                "unsupported validator type in trigger part"
            );
            return false;
        };
        if part.operator == comparison::ComparisonOperator::Unknown {
            warn!("unknown comparison operator in trigger part");
        }

        comparison::evaluate(
            part.operator,
            part.is_negative,
            part.is_ignore_case,
            &value,
            part.compare_value(),
            part.compare_values(),
        )
    }
}
