//! Redirect target validation.
//!
//! Only two `location` shapes are followed: an absolute `https://` link with a
//! dotted host followed by a path, and a root-relative path. Anything else is
//! refused.

use std::sync::LazyLock;

use futures_util::StreamExt;
use regex::Regex;
use reqwest::{StatusCode, Url};

use crate::transport::BodyStream;

/// Hop budget for one request, counting the initial request.
pub const MAX_REDIRECTS: usize = 5;

/// Bytes of a followed redirect's body read before it is dropped.
pub(crate) const REDIRECT_DRAIN_LIMIT: usize = 64 * 1024;

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static SAFE_ABSOLUTE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://(?:[A-Za-z0-9_]+\.)+[A-Za-z0-9_]+/")
        .expect("static regex should not panic")
});

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static SAFE_RELATIVE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/[A-Za-z0-9_]").expect("static regex should not panic"));

pub(crate) fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::TEMPORARY_REDIRECT
    )
}

/// Link to follow for `location`, or `None` if the target is untrusted.
pub(crate) fn next_link(current: &str, location: &str) -> Option<String> {
    if SAFE_ABSOLUTE_LINK.is_match(location) {
        return Some(location.to_owned());
    }
    if SAFE_RELATIVE_LINK.is_match(location) {
        let current = Url::parse(current).ok()?;
        return Some(format!("https://{}{location}", current.host_str()?));
    }
    None
}

/// Reads and discards a redirect body, up to [`REDIRECT_DRAIN_LIMIT`].
pub(crate) async fn drain(mut body: BodyStream) {
    let mut drained = 0usize;
    while let Some(Ok(chunk)) = body.next().await {
        drained += chunk.len();
        if drained >= REDIRECT_DRAIN_LIMIT {
            tracing::debug!("redirect body exceeds {REDIRECT_DRAIN_LIMIT} bytes, dropping it");
            break;
        }
    }
}
