use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

use reqwest::{
    header::{HeaderValue, CONTENT_ENCODING, LOCATION},
    Url,
};

use crate::{
    decode::body_to_text,
    headers::{
        self, first_header_text, header_text, normalize_bearer_authorization, HeaderOverrides,
    },
    redirect::{self, MAX_REDIRECTS},
    CustomHeader, Method, Payload, ReqwestTransport, RequestError, RequestOptions,
    ResponseResult, Result, Transport, TransportRequest, TransportResponse,
};

/// HTTPS request engine.
///
/// Issues GET/POST/PUT requests, follows trusted redirects, decodes
/// compressed bodies and optionally retries once after a caller-supplied
/// delay. Failures never surface as errors from the verb methods; inspect the
/// returned [`ResponseResult`] instead.
pub struct RequestEngine<T = ReqwestTransport> {
    transport: T,
    headers: HeaderOverrides,
    pending: AtomicUsize,
}

impl<T> fmt::Debug for RequestEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestEngine")
            .field("headers", &self.headers)
            .field("pending", &self.pending.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RequestEngine<ReqwestTransport> {
    /// Creates an engine over a default `reqwest` client.
    pub fn new() -> Result<Self> {
        Ok(Self::with_transport(ReqwestTransport::new()?))
    }

    /// Creates an engine configured from the environment.
    ///
    /// Reads, all optional:
    /// - `MIRROR_ENGINE_USER_AGENT`: `User-Agent` override
    /// - `MIRROR_ENGINE_ACCEPT`: `Accept` override
    /// - `MIRROR_ENGINE_TOKEN`: bearer token (the `Bearer ` prefix is optional)
    ///
    /// A variable that is set but empty is a configuration error.
    pub fn from_env() -> Result<Self> {
        let engine = Self::new()?;
        if let Some(agent) = env_override("MIRROR_ENGINE_USER_AGENT")? {
            engine.set_header(CustomHeader::UserAgent, &agent)?;
        }
        if let Some(accept) = env_override("MIRROR_ENGINE_ACCEPT")? {
            engine.set_header(CustomHeader::Accept, &accept)?;
        }
        if let Some(token) = env_override("MIRROR_ENGINE_TOKEN")? {
            engine.set_bearer_token(&token)?;
        }
        Ok(engine)
    }
}

fn env_override(name: &str) -> Result<Option<String>> {
    match std::env::var(name) {
        Ok(value) if value.trim().is_empty() => {
            Err(RequestError::Config(format!("{name} is set but empty")))
        }
        Ok(value) => Ok(Some(value)),
        Err(_) => Ok(None),
    }
}

impl<T: Transport> RequestEngine<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            headers: HeaderOverrides::default(),
            pending: AtomicUsize::new(0),
        }
    }

    /// Overrides one of the caller-customizable headers for all later requests.
    pub fn set_header(&self, key: CustomHeader, value: &str) -> Result<()> {
        let mut value = HeaderValue::from_str(value)?;
        if key == CustomHeader::Authorization {
            value.set_sensitive(true);
        }
        self.headers.set(key, value);
        Ok(())
    }

    /// Sets `Authorization: Bearer <token>`, adding the prefix if missing.
    pub fn set_bearer_token(&self, token: &str) -> Result<()> {
        self.set_header(
            CustomHeader::Authorization,
            &normalize_bearer_authorization(token),
        )
    }

    /// Requests currently in flight. Advisory only.
    pub fn pending_requests(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    pub async fn get(&self, link: &str, options: RequestOptions) -> ResponseResult {
        self.send_with_retry(link, Method::Get, options).await
    }

    /// Sends `payload` with POST.
    ///
    /// # Panics
    ///
    /// Panics if `options` already carries a payload.
    pub async fn post(
        &self,
        link: &str,
        payload: impl Into<Payload>,
        options: RequestOptions,
    ) -> ResponseResult {
        let options = bind_payload(payload.into(), options);
        self.send_with_retry(link, Method::Post, options).await
    }

    /// Sends `payload` with PUT.
    ///
    /// # Panics
    ///
    /// Panics if `options` already carries a payload.
    pub async fn put(
        &self,
        link: &str,
        payload: impl Into<Payload>,
        options: RequestOptions,
    ) -> ResponseResult {
        let options = bind_payload(payload.into(), options);
        self.send_with_retry(link, Method::Put, options).await
    }

    async fn send_with_retry(
        &self,
        link: &str,
        method: Method,
        mut options: RequestOptions,
    ) -> ResponseResult {
        let _pending = PendingGuard::enter(&self.pending);

        let result = self.resolve(link, method, &options).await;
        if result.text().is_some() {
            return result;
        }
        let Some(retry) = options.retry.take() else {
            return result;
        };

        tracing::debug!("retrying {method} {link} after {:?}", retry.delay);
        retry.sleeper.sleep(retry.delay).await;
        self.resolve(link, method, &options).await
    }

    async fn resolve(
        &self,
        link: &str,
        method: Method,
        options: &RequestOptions,
    ) -> ResponseResult {
        let mut link = link.to_owned();
        let mut last_head = None;

        for _ in 0..MAX_REDIRECTS {
            let TransportResponse { head, body } =
                match self.issue(&link, method, options.payload.as_ref()).await {
                    Ok(response) => response,
                    Err(err) => {
                        report(options, &err);
                        return ResponseResult::failed();
                    }
                };

            if redirect::is_redirect(head.status) {
                let location = first_header_text(&head.headers, LOCATION, "");
                let Some(next) = redirect::next_link(&link, &location) else {
                    report(options, format_args!("invalid redirect link '{location}'"));
                    return ResponseResult::refused(Some(head));
                };
                redirect::drain(body).await;
                tracing::debug!("following {} redirect to {next}", head.status.as_u16());
                link = next;
                last_head = Some(head);
                continue;
            }

            if !options.stubborn && !head.status.is_success() {
                report(
                    options,
                    format_args!("unexpected status code '{}'", head.status.as_u16()),
                );
                return ResponseResult::rejected(head);
            }

            let encoding = header_text(&head.headers, CONTENT_ENCODING, "identity");
            return match body_to_text(body, &encoding).await {
                Ok(text) => ResponseResult::completed(head, text),
                Err(err) => {
                    report(options, &err);
                    ResponseResult::rejected(head)
                }
            };
        }

        report(options, "too many redirects");
        ResponseResult::refused(last_head)
    }

    async fn issue(
        &self,
        link: &str,
        method: Method,
        payload: Option<&Payload>,
    ) -> Result<TransportResponse> {
        tracing::info!("{method} - {link}");

        let overrides = self.headers.snapshot();
        if !overrides.is_empty() {
            let names: Vec<&str> = overrides.keys().map(|key| key.as_str()).collect();
            tracing::debug!("sending custom headers: '{}'", names.join("', '"));
        }

        let url = Url::parse(link).map_err(|err| RequestError::InvalidUrl {
            link: link.to_owned(),
            reason: err.to_string(),
        })?;
        if url.scheme() != "https" {
            return Err(RequestError::Protocol(url.scheme().to_owned()));
        }

        let request = TransportRequest {
            method,
            url,
            headers: headers::merge(&overrides),
            body: payload.map(Payload::to_bytes),
        };
        self.transport.send(request).await
    }
}

fn bind_payload(payload: Payload, mut options: RequestOptions) -> RequestOptions {
    assert!(
        options.payload.is_none(),
        "payload must be passed as an argument, not through RequestOptions"
    );
    options.payload = Some(payload);
    options
}

/// Logs a failure once, quietly when the caller expects it or will retry.
fn report(options: &RequestOptions, message: impl fmt::Display) {
    if options.quiet_failures() {
        tracing::debug!("request error: {message}");
    } else {
        tracing::error!("request error: {message}");
    }
}

struct PendingGuard<'a>(&'a AtomicUsize);

impl<'a> PendingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
