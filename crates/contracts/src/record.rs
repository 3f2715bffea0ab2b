//! Record - the opaque unit of caller data

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ContractError;

/// An opaque record handed to the engine.
///
/// The engine imposes no structure; the bytes reach the sink unmodified.
/// Cloning is cheap (reference counted).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Bytes);

impl Record {
    /// Wrap raw bytes
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    /// Encode a serializable value as a JSON record
    pub fn from_json<T: Serialize + ?Sized>(value: &T) -> Result<Self, ContractError> {
        serde_json::to_vec(value)
            .map(Self::new)
            .map_err(|e| ContractError::RecordEncode {
                message: e.to_string(),
            })
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// UTF-8 view, if the payload is text
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Empty records are rejected at admission
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Bytes> for Record {
    fn from(data: Bytes) -> Self {
        Self(data)
    }
}

impl From<Vec<u8>> for Record {
    fn from(data: Vec<u8>) -> Self {
        Self(Bytes::from(data))
    }
}

impl From<String> for Record {
    fn from(data: String) -> Self {
        Self(Bytes::from(data))
    }
}

impl From<&str> for Record {
    fn from(data: &str) -> Self {
        Self(Bytes::copy_from_slice(data.as_bytes()))
    }
}

impl From<&[u8]> for Record {
    fn from(data: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(data))
    }
}
