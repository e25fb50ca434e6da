//! Wire formats for the admission token (`key_value~key_value`) and the
//! session cookie value (`key=value&key=value`).

use std::collections::HashMap;

pub const QUEUEIT_TOKEN_KEY: &str = "queueittoken";

const GROUP_SEPARATOR: char = '~';
const KEY_VALUE_SEPARATOR: char = '_';
const HASH_KEY: &str = "h";

/// Fields carried by a signed admission token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueToken {
    pub raw: String,
    pub token_without_hash: String,
    pub event_id: String,
    pub queue_id: String,
    /// Expiry of the token itself, unix seconds. Zero when absent or invalid.
    pub timestamp: i64,
    pub hash: String,
    pub redirect_type: Option<String>,
    pub cookie_validity_minutes: Option<i64>,
    pub extendable_cookie: bool,
}

impl QueueToken {
    /// Parse a token. Empty input yields `None`; malformed groups and unknown
    /// keys are skipped, and a repeated key keeps its last value.
    pub fn parse(token: &str) -> Option<Self> {
        if token.is_empty() {
            return None;
        }

        let mut parsed = Self {
            raw: token.to_string(),
            ..Self::default()
        };

        for group in token.split(GROUP_SEPARATOR) {
            let mut pieces = group.split(KEY_VALUE_SEPARATOR);
            let (Some(key), Some(value), None) = (pieces.next(), pieces.next(), pieces.next())
            else {
                continue;
            };

            match key {
                "ts" => parsed.timestamp = value.parse().unwrap_or(0),
                "cv" => parsed.cookie_validity_minutes = value.parse().ok(),
                "ce" => parsed.extendable_cookie = value.eq_ignore_ascii_case("true"),
                HASH_KEY => parsed.hash = value.to_string(),
                "e" => parsed.event_id = value.to_string(),
                "q" => parsed.queue_id = value.to_string(),
                "rt" => parsed.redirect_type = Some(value.to_string()),
                _ => {}
            }
        }

        let hash_group = format!("{GROUP_SEPARATOR}{HASH_KEY}{KEY_VALUE_SEPARATOR}{}", parsed.hash);
        parsed.token_without_hash = token
            .strip_suffix(&hash_group)
            .map_or_else(|| token.replacen(&hash_group, "", 1), str::to_string);
        Some(parsed)
    }
}

/// Parse an optional token the way the query string hands it over.
pub fn extract_queue_params(token: Option<&str>) -> Option<QueueToken> {
    token.and_then(QueueToken::parse)
}

/// Join `key=value` pairs with `&`. Values are written as-is.
pub fn encode_cookie_value<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    pairs
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Split a cookie value into its pairs. Segments without exactly one `=`
/// are dropped, so garbage yields an empty map.
pub fn decode_cookie_value(raw: &str) -> HashMap<String, String> {
    raw.split('&')
        .filter_map(|segment| {
            let mut pieces = segment.split('=');
            match (pieces.next(), pieces.next(), pieces.next()) {
                (Some(key), Some(value), None) if !key.is_empty() => {
                    Some((key.to_string(), value.to_string()))
                }
                _ => None,
            }
        })
        .collect()
}
