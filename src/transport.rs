use std::{future::Future, pin::Pin};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::{header::HeaderMap, redirect, Url};

use crate::{error::BoxError, Method, RequestError, ResponseHead};

/// Response body as a stream of raw (still encoded) chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// Future returned by [`Transport::send`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransportResponse, RequestError>> + Send + 'a>>;

/// One outbound request, already validated and with headers merged.
#[derive(Debug)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Response head plus the unread body.
pub struct TransportResponse {
    pub head: ResponseHead,
    pub body: BodyStream,
}

/// Sends a single request and resolves once the response head arrives.
///
/// Implementations must not follow redirects or decode the body; the engine
/// does both. Transport-level failures are reported as
/// [`RequestError::Connection`].
pub trait Transport: Send + Sync {
    fn send(&self, request: TransportRequest) -> TransportFuture<'_>;
}

/// Production [`Transport`] built on `reqwest`.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a client with redirect following disabled.
    pub fn new() -> Result<Self, RequestError> {
        let http = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .map_err(RequestError::Client)?;
        Ok(Self { http })
    }

    /// Uses a pre-built client.
    ///
    /// The client must have redirects disabled and must not decompress
    /// bodies itself, otherwise the engine's redirect validation and
    /// content decoding are bypassed.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            let TransportRequest {
                method,
                url,
                headers,
                body,
            } = request;

            let mut builder = self.http.request(method.into(), url).headers(headers);
            if let Some(body) = body {
                builder = builder.body(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|err| RequestError::Connection(Box::new(err)))?;

            let head = ResponseHead {
                status: response.status(),
                headers: response.headers().clone(),
                url: response.url().clone(),
            };
            let body = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|err| Box::new(err) as BoxError));

            Ok(TransportResponse {
                head,
                body: Box::pin(body),
            })
        })
    }
}
