/// Boxed error carried as the source of transport and stream failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type returned by this crate.
///
/// Failures raised while a request is in flight never escape the verb
/// surface: the resolver logs them and folds them into a
/// [`ResponseResult`](crate::ResponseResult). The variants are public so that
/// custom [`Transport`](crate::Transport) implementations can produce them.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The link could not be parsed as a URL.
    #[error("invalid link '{link}': {reason}")]
    InvalidUrl { link: String, reason: String },
    /// The link does not use the `https` scheme.
    #[error("unknown protocol '{0}:'")]
    Protocol(String),
    /// DNS, TCP, TLS or timeout failure raised by the transport.
    #[error("connection error: {0}")]
    Connection(#[source] BoxError),
    /// The response declared a content-encoding the decoder does not know.
    #[error("unknown encoding '{0}'")]
    UnsupportedEncoding(String),
    /// Decoded text grew past the response ceiling.
    #[error("response payload too large (limit {limit} bytes)")]
    PayloadTooLarge { limit: usize },
    /// The body stream or the decompressor failed mid-response.
    #[error("stream error: {0}")]
    Stream(#[source] BoxError),
    /// A header override value is not a valid HTTP header value.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    /// A JSON payload could not be serialized.
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The underlying HTTP client could not be built.
    #[error("http client error: {0}")]
    Client(#[source] reqwest::Error),
    /// Environment configuration is present but unusable.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RequestError {
    pub(crate) fn stream(err: impl Into<BoxError>) -> Self {
        Self::Stream(err.into())
    }
}
