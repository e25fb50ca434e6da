//! Request/response collaborator the connector runs against.
//!
//! The connector never talks to a web framework directly. Hosts implement
//! [`HttpContext`] over their own request and response types;
//! [`MemoryHttpContext`] is the in-process implementation used by the
//! operator binary and tests.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use serde::Serialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

impl FromStr for SameSite {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lax" => Ok(Self::Lax),
            "none" => Ok(Self::None),
            _ => Err(ConfigError::InvalidSameSite {
                value: value.to_string(),
            }),
        }
    }
}

/// Cookie write requested by the connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    /// Absolute expiry in unix seconds. Zero or less deletes the cookie.
    pub expires_at: i64,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSite>,
}

impl ResponseCookie {
    /// Render as a `Set-Cookie` header value. The value is percent-encoded.
    pub fn to_header_value(&self) -> String {
        let mut header = format!(
            "{}={}; Path=/",
            self.name,
            urlencoding::encode(&self.value)
        );
        if let Some(domain) = self.domain.as_deref().filter(|value| !value.is_empty()) {
            header.push_str(&format!("; Domain={domain}"));
        }
        match DateTime::from_timestamp(self.expires_at, 0).filter(|_| self.expires_at > 0) {
            Some(expires) => header.push_str(&format!(
                "; Expires={}",
                expires.format("%a, %d %b %Y %H:%M:%S GMT")
            )),
            None => header.push_str("; Max-Age=0"),
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        if self.secure {
            header.push_str("; Secure");
        }
        if let Some(same_site) = self.same_site {
            header.push_str(&format!("; SameSite={}", same_site.as_str()));
        }
        header
    }
}

/// Cookie attributes applied to every write for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookiePolicy {
    pub domain: Option<String>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSite>,
}

impl CookiePolicy {
    pub fn cookie(&self, name: &str, value: &str, expires_at: i64) -> ResponseCookie {
        ResponseCookie {
            name: name.to_string(),
            value: value.to_string(),
            domain: self.domain.clone().filter(|domain| !domain.is_empty()),
            expires_at,
            http_only: self.http_only,
            secure: self.secure,
            same_site: self.same_site,
        }
    }
}

pub trait HttpContext {
    /// Header lookup; names are case-insensitive.
    fn header(&self, name: &str) -> Option<String>;
    /// Request cookie value, percent-decoded.
    fn cookie_value(&self, name: &str) -> Option<String>;
    fn absolute_uri(&self) -> Option<String>;
    fn user_host_address(&self) -> Option<String>;

    fn user_agent(&self) -> Option<String> {
        self.header("User-Agent")
    }

    fn request_body(&self) -> Option<String> {
        None
    }

    fn set_cookie(&mut self, cookie: ResponseCookie);
}

#[derive(Debug, Clone, Default)]
pub struct MemoryHttpContext {
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
    absolute_uri: Option<String>,
    user_host_address: Option<String>,
    body: Option<String>,
    written: Vec<ResponseCookie>,
}

impl MemoryHttpContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_absolute_uri(mut self, uri: &str) -> Self {
        self.absolute_uri = Some(uri.to_string());
        self
    }

    pub fn with_user_host_address(mut self, address: &str) -> Self {
        self.user_host_address = Some(address.to_string());
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    /// Cookies written so far, in write order.
    pub fn written_cookies(&self) -> &[ResponseCookie] {
        &self.written
    }

    /// Most recent write for `name`.
    pub fn last_written(&self, name: &str) -> Option<&ResponseCookie> {
        self.written.iter().rev().find(|cookie| cookie.name == name)
    }
}

impl HttpContext for MemoryHttpContext {
    fn header(&self, name: &str) -> Option<String> {
        self.headers.get(&name.to_ascii_lowercase()).cloned()
    }

    fn cookie_value(&self, name: &str) -> Option<String> {
        self.cookies.get(name).cloned()
    }

    fn absolute_uri(&self) -> Option<String> {
        self.absolute_uri.clone()
    }

    fn user_host_address(&self) -> Option<String> {
        self.user_host_address.clone()
    }

    fn request_body(&self) -> Option<String> {
        self.body.clone()
    }

    fn set_cookie(&mut self, cookie: ResponseCookie) {
        self.written.push(cookie);
    }
}

impl fmt::Display for ResponseCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header_value())
    }
}

#[cfg(test)]
mod tests {
    use super::{CookiePolicy, HttpContext, MemoryHttpContext, SameSite};

    #[test]
    fn set_cookie_header_carries_policy_attributes() {
        let policy = CookiePolicy {
            domain: Some(".example.com".to_string()),
            http_only: true,
            secure: true,
            same_site: Some(SameSite::Lax),
        };
        let header = policy.cookie("session", "abc", 86_400).to_header_value();

        assert_eq!(
            header,
            "session=abc; Path=/; Domain=.example.com; Expires=Fri, 02 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Lax"
        );
    }

    #[test]
    fn header_value_percent_encodes_cookie_value() {
        let header = CookiePolicy::default()
            .cookie("queueitdebug", "LayoutName=Spring Sale; Domain=evil.com|x=1", 0)
            .to_header_value();

        assert_eq!(
            header,
            "queueitdebug=LayoutName%3DSpring%20Sale%3B%20Domain%3Devil.com%7Cx%3D1; Path=/; Max-Age=0"
        );
    }

    #[test]
    fn zero_expiry_renders_deletion() {
        let header = CookiePolicy::default().cookie("session", "", 0).to_header_value();
        assert_eq!(header, "session=; Path=/; Max-Age=0");
    }

    #[test]
    fn empty_domain_is_omitted() {
        let policy = CookiePolicy {
            domain: Some(String::new()),
            ..CookiePolicy::default()
        };
        assert_eq!(policy.cookie("a", "b", 0).domain, None);
    }

    #[test]
    fn same_site_parses_case_insensitively() {
        assert_eq!("lax".parse::<SameSite>(), Ok(SameSite::Lax));
        assert_eq!(" STRICT ".parse::<SameSite>(), Ok(SameSite::Strict));
        assert!("sometimes".parse::<SameSite>().is_err());
    }

    #[test]
    fn memory_context_headers_are_case_insensitive() {
        let context = MemoryHttpContext::new().with_header("User-Agent", "agent/1.0");
        assert_eq!(context.header("user-agent").as_deref(), Some("agent/1.0"));
        assert_eq!(context.user_agent().as_deref(), Some("agent/1.0"));
    }
}
