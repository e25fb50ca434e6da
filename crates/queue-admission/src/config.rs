use std::env;

use crate::error::ConfigError;
use crate::http::SameSite;

const DEFAULT_LOG_FILTER: &str = "info";

/// Connector-wide settings. Per-event cookie flags live in the integration
/// document, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorSettings {
    pub customer_id: String,
    pub secret_key: String,
    /// Applied to every cookie the connector writes.
    pub cookie_same_site: Option<SameSite>,
    pub log_filter: String,
}

impl ConnectorSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let customer_id = lookup("QUEUE_ADMISSION_CUSTOMER_ID")
            .map(|value| value.trim().to_string())
            .unwrap_or_default();

        let secret_key = lookup("QUEUE_ADMISSION_SECRET_KEY")
            .map(|value| value.trim().to_string())
            .unwrap_or_default();

        let cookie_same_site = lookup("QUEUE_ADMISSION_COOKIE_SAME_SITE")
            .filter(|value| !value.trim().is_empty())
            .map(|value| value.parse::<SameSite>())
            .transpose()?;

        let log_filter = lookup("QUEUE_ADMISSION_LOG_FILTER")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            customer_id,
            secret_key,
            cookie_same_site,
            log_filter,
        })
    }

    pub fn for_tests() -> Self {
        Self {
            customer_id: "testcustomer".to_string(),
            secret_key: "4e1deweb-a8f8-4e5d-b5e8-dee1c55b5a5f-e2e8e0c9-9cb6-4ba8-9e50-5b5c2a4ae0f2".to_string(),
            cookie_same_site: None,
            log_filter: "debug".to_string(),
        }
    }
}
