//! `mirror-engine-http` is the HTTPS request engine underneath the mirror
//! engine's synchronization tooling.
//!
//! [`RequestEngine`] exposes three verbs:
//! - [`RequestEngine::get`]
//! - [`RequestEngine::post`]
//! - [`RequestEngine::put`]
//!
//! Each call follows at most [`MAX_REDIRECTS`] trusted redirects, decodes
//! identity/gzip/deflate bodies up to [`RESPONSE_MAX_SIZE`], and may retry
//! once after a caller-supplied delay. Outcomes are reported through
//! [`ResponseResult`]; failures are logged with `tracing`.

mod client;
mod decode;
mod error;
mod headers;
mod options;
mod payload;
mod redirect;
mod transport;
mod types;

pub use client::RequestEngine;
pub use decode::RESPONSE_MAX_SIZE;
pub use error::{BoxError, RequestError};
pub use headers::CustomHeader;
pub use options::{RequestOptions, RetryPolicy, Sleep, SleepFuture, TokioSleep};
pub use payload::Payload;
pub use redirect::MAX_REDIRECTS;
pub use transport::{
    BodyStream, ReqwestTransport, Transport, TransportFuture, TransportRequest, TransportResponse,
};
pub use types::{Method, ResponseHead, ResponseResult};

pub type Result<T> = std::result::Result<T, RequestError>;
