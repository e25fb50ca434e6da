//! Waiting-room admission for web requests.
//!
//! For each request the connector decides whether the visitor is already
//! admitted (signed session cookie), is being admitted right now (signed
//! admission token on the query string), or must be sent to the waiting
//! room. [`KnownUser`] is the entry point; the modules below it are usable
//! on their own when an application wants finer control.

pub mod admission;
pub mod clock;
pub mod comparison;
pub mod config;
pub mod crypto;
pub mod diagnostics;
pub mod error;
pub mod http;
pub mod integration;
pub mod known_user;
pub mod session;
pub mod token;
pub mod trigger;

pub use admission::{
    AJAX_REDIRECT_HEADER, AdmissionService, CancelEventConfig, QueueEventConfig, SDK_VERSION,
    TokenErrorCode, ValidationResult,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::ConnectorSettings;
pub use crypto::{CryptoProvider, HmacSha256Provider};
pub use diagnostics::{DEBUG_COOKIE_NAME, DiagnosticLog, DiagnosticsOutcome, DiagnosticsVerifier};
pub use error::{ConfigError, ConnectorError, CryptoError, IntegrationConfigError};
pub use http::{CookiePolicy, HttpContext, MemoryHttpContext, ResponseCookie, SameSite};
pub use integration::{ActionType, CustomerIntegration, IntegrationConfig, RedirectLogic};
pub use known_user::{AJAX_PAGE_URL_HEADER, KnownUser, split_queueit_token};
pub use session::{CookieRejection, SessionStateStore, StateInfo, session_cookie_name};
pub use token::{QUEUEIT_TOKEN_KEY, QueueToken};
pub use trigger::TriggerEvaluator;
