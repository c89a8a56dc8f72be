use std::{
    collections::BTreeMap,
    fmt,
    sync::{PoisonError, RwLock},
};

use reqwest::header::{self, AsHeaderName, HeaderMap, HeaderName, HeaderValue};

/// Headers a caller may override on a [`RequestEngine`](crate::RequestEngine).
///
/// Every other request header is fixed by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CustomHeader {
    Accept,
    Authorization,
    UserAgent,
}

impl CustomHeader {
    pub fn name(self) -> HeaderName {
        match self {
            Self::Accept => header::ACCEPT,
            Self::Authorization => header::AUTHORIZATION,
            Self::UserAgent => header::USER_AGENT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "Accept",
            Self::Authorization => "Authorization",
            Self::UserAgent => "User-Agent",
        }
    }
}

impl fmt::Display for CustomHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Headers sent with every request before overrides are applied.
pub(crate) fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(3);
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("text/plain, text/*, */*;q=0.9"),
    );
    headers.insert(
        header::ACCEPT_ENCODING,
        HeaderValue::from_static("deflate, gzip, identity"),
    );
    headers
}

/// Engine-owned override table. Readers take a snapshot per issued request.
#[derive(Default)]
pub(crate) struct HeaderOverrides {
    table: RwLock<BTreeMap<CustomHeader, HeaderValue>>,
}

impl HeaderOverrides {
    pub(crate) fn set(&self, key: CustomHeader, value: HeaderValue) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<CustomHeader, HeaderValue> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for HeaderOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        let mut map = f.debug_map();
        for (key, value) in &snapshot {
            if *key == CustomHeader::Authorization {
                map.entry(&key.as_str(), &"<redacted>");
            } else {
                map.entry(&key.as_str(), value);
            }
        }
        map.finish()
    }
}

/// Defaults merged with `overrides`; overrides win on collision.
pub(crate) fn merge(overrides: &BTreeMap<CustomHeader, HeaderValue>) -> HeaderMap {
    let mut headers = default_headers();
    for (key, value) in overrides {
        headers.insert(key.name(), value.clone());
    }
    headers
}

/// All values of `key` joined with `", "`; `default` when absent.
pub(crate) fn header_text(headers: &HeaderMap, key: impl AsHeaderName, default: &str) -> String {
    let values: Vec<&str> = headers
        .get_all(key)
        .iter()
        .map(|value| value.to_str().unwrap_or_default())
        .collect();
    if values.is_empty() {
        default.to_owned()
    } else {
        values.join(", ")
    }
}

/// First value of a single-valued header such as `Location`; `default` when
/// absent. Repeats are ignored.
pub(crate) fn first_header_text(
    headers: &HeaderMap,
    key: impl AsHeaderName,
    default: &str,
) -> String {
    headers
        .get(key)
        .map(|value| value.to_str().unwrap_or_default())
        .unwrap_or(default)
        .to_owned()
}

pub(crate) fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
