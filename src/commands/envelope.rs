//! The `{result, error}` response body shared by every endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Exactly one of `result` and `error` is populated; the other serializes as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl ResultEnvelope {
    pub fn success(result: impl Into<Value>) -> Self {
        Self {
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl<E: std::error::Error> From<E> for ResultEnvelope {
    fn from(err: E) -> Self {
        ResultEnvelope::failure(err.to_string())
    }
}
