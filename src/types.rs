use std::fmt;

use reqwest::{header::HeaderMap, StatusCode, Url};

/// HTTP methods the engine issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        }
    }
}

/// Status line and headers of a received response.
#[derive(Clone, Debug)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// URL of the request that produced this response.
    pub url: Url,
}

/// Outcome of a request.
///
/// Exactly one shape holds:
/// - no head: the request never produced a response (bad link, connection
///   failure);
/// - head without text: refused redirect, non-2xx status, or a body that
///   could not be decoded;
/// - head with text: success.
#[derive(Clone, Debug)]
pub struct ResponseResult {
    redirect_refused: bool,
    head: Option<ResponseHead>,
    text: Option<String>,
}

impl ResponseResult {
    pub(crate) fn failed() -> Self {
        Self {
            redirect_refused: false,
            head: None,
            text: None,
        }
    }

    pub(crate) fn refused(head: Option<ResponseHead>) -> Self {
        Self {
            redirect_refused: true,
            head,
            text: None,
        }
    }

    pub(crate) fn rejected(head: ResponseHead) -> Self {
        Self {
            redirect_refused: false,
            head: Some(head),
            text: None,
        }
    }

    pub(crate) fn completed(head: ResponseHead, text: String) -> Self {
        Self {
            redirect_refused: false,
            head: Some(head),
            text: Some(text),
        }
    }

    /// The redirect chain was untrusted or longer than the hop limit.
    pub fn redirect_refused(&self) -> bool {
        self.redirect_refused
    }

    /// Last response head obtained, absent only when no response arrived.
    pub fn head(&self) -> Option<&ResponseHead> {
        self.head.as_ref()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.head.as_ref().map(|head| head.status)
    }

    /// Decoded body, present only on success.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn into_text(self) -> Option<String> {
        self.text
    }

    pub fn is_success(&self) -> bool {
        self.text.is_some()
    }
}
