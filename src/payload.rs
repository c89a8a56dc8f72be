use bytes::Bytes;
use serde::Serialize;

use crate::RequestError;

/// Request body attached to a POST or PUT.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Sent exactly as given. Text payloads end up here.
    Raw(Bytes),
    /// Sent as compact JSON text.
    Json(serde_json::Value),
}

impl Payload {
    /// Serializes any value into a JSON payload.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, RequestError> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// Bytes written to the wire.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Raw(bytes) => bytes.clone(),
            Self::Json(value) => Bytes::from(value.to_string()),
        }
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Raw(Bytes::from(value))
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Raw(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self::Raw(Bytes::from(value))
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Self::Raw(value)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}
