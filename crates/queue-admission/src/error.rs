use thiserror::Error;

/// Argument and setup errors raised by the integrating application.
///
/// These are programmer errors: they are returned as `Err` and never folded
/// into a [`crate::ValidationResult`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectorError {
    #[error("customerId can not be null or empty.")]
    MissingCustomerId,
    #[error("secretKey can not be null or empty.")]
    MissingSecretKey,
    #[error("eventId can not be null or empty.")]
    MissingEventId,
    #[error("eventId from {source_config} can not be null or empty.")]
    MissingConfigEventId { source_config: &'static str },
    #[error("queueDomain from {source_config} can not be null or empty.")]
    MissingQueueDomain { source_config: &'static str },
    #[error("cookieValidityMinute should be greater than 0.")]
    NonPositiveCookieValidity,
    #[error("cookieValidityMinute from queueConfig should be greater than 0.")]
    NonPositiveConfigCookieValidity,
    #[error("targeturl can not be null or empty.")]
    MissingTargetUrl,
    #[error("currentUrlWithoutQueueITToken can not be null or empty.")]
    MissingCurrentUrl,
    #[error("customerIntegrationInfo can not be null.")]
    MissingIntegrationConfig,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("failed to initialize hmac signer: {message}")]
    InvalidKey { message: String },
}

#[derive(Debug, Error)]
pub enum IntegrationConfigError {
    #[error("invalid integration configuration document: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid QUEUE_ADMISSION_COOKIE_SAME_SITE value '{value}'")]
    InvalidSameSite { value: String },
}
