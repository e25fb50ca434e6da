//! Typed form of the integration document published by the waiting-room
//! service.
//!
//! Field names follow the published JSON (PascalCase). Unknown enum strings
//! decode to a catch-all variant that never matches, so a typo in one trigger
//! disables that trigger instead of rejecting the whole document.

use serde::{Deserialize, Serialize};

pub use crate::comparison::ComparisonOperator;
use crate::error::IntegrationConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomerIntegration {
    #[serde(default)]
    pub integrations: Vec<IntegrationConfig>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub publish_date: Option<String>,
    #[serde(default)]
    pub config_data_version: Option<String>,
}

impl CustomerIntegration {
    pub fn from_json(raw: &str) -> Result<Self, IntegrationConfigError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IntegrationConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub action_type: ActionType,
    #[serde(default)]
    pub redirect_logic: RedirectLogic,
    #[serde(default)]
    pub forced_target_url: Option<String>,
    #[serde(default)]
    pub queue_domain: String,
    #[serde(default)]
    pub culture: Option<String>,
    #[serde(default)]
    pub layout_name: Option<String>,
    #[serde(default)]
    pub cookie_domain: Option<String>,
    #[serde(default)]
    pub cookie_validity_minute: i64,
    #[serde(default)]
    pub extend_cookie_validity: bool,
    #[serde(default)]
    pub is_cookie_http_only: bool,
    #[serde(default)]
    pub is_cookie_secure: bool,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

/// What the connector does with a matched request. Also reported on
/// [`crate::ValidationResult`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    #[default]
    Queue,
    Cancel,
    #[serde(skip_deserializing)]
    ConnectorDiagnosticsRedirect,
    /// Any unrecognised action string is handled as `Ignore`.
    #[serde(other)]
    Ignore,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queue => "Queue",
            Self::Cancel => "Cancel",
            Self::Ignore => "Ignore",
            Self::ConnectorDiagnosticsRedirect => "ConnectorDiagnosticsRedirect",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedirectLogic {
    #[default]
    AllowTargetUrl,
    ForcedTargetUrl,
    EventTargetUrl,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Trigger {
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    #[serde(default)]
    pub trigger_parts: Vec<TriggerPart>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    Or,
    /// Anything other than `Or` combines parts conjunctively.
    #[default]
    #[serde(other)]
    And,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TriggerPart {
    pub validator_type: ValidatorType,
    pub operator: ComparisonOperator,
    #[serde(default)]
    pub is_negative: bool,
    #[serde(default)]
    pub is_ignore_case: bool,
    #[serde(default)]
    pub value_to_compare: Option<String>,
    #[serde(default)]
    pub values_to_compare: Option<Vec<String>>,
    #[serde(default)]
    pub url_part: Option<UrlPart>,
    #[serde(default)]
    pub cookie_name: Option<String>,
    #[serde(default)]
    pub http_header_name: Option<String>,
}

impl TriggerPart {
    pub fn compare_value(&self) -> &str {
        self.value_to_compare.as_deref().unwrap_or_default()
    }

    pub fn compare_values(&self) -> &[String] {
        self.values_to_compare.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidatorType {
    #[serde(rename = "UrlValidator")]
    Url,
    #[serde(rename = "CookieValidator")]
    Cookie,
    #[serde(rename = "UserAgentValidator")]
    UserAgent,
    #[serde(rename = "HttpHeaderValidator")]
    HttpHeader,
    #[serde(rename = "RequestBodyValidator")]
    RequestBody,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UrlPart {
    PagePath,
    PageUrl,
    HostName,
    #[serde(other)]
    Unknown,
}
