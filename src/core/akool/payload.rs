use serde::{Deserialize, Serialize};

use super::WebhookError;

/// Task status codes reported in Akool callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Unknown(i64),
}

impl CallbackStatus {
    pub fn code(self) -> i64 {
        match self {
            CallbackStatus::Queued => 1,
            CallbackStatus::Processing => 2,
            CallbackStatus::Completed => 3,
            CallbackStatus::Failed => 4,
            CallbackStatus::Unknown(code) => code,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CallbackStatus::Queued => "queued",
            CallbackStatus::Processing => "processing",
            CallbackStatus::Completed => "completed",
            CallbackStatus::Failed => "failed",
            CallbackStatus::Unknown(_) => "unknown",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CallbackStatus::Completed | CallbackStatus::Failed)
    }
}

impl From<i64> for CallbackStatus {
    fn from(code: i64) -> Self {
        match code {
            1 => CallbackStatus::Queued,
            2 => CallbackStatus::Processing,
            3 => CallbackStatus::Completed,
            4 => CallbackStatus::Failed,
            other => CallbackStatus::Unknown(other),
        }
    }
}

impl Serialize for CallbackStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> Deserialize<'de> for CallbackStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(CallbackStatus::from)
    }
}

/// Decrypted body of an Akool callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackPayload {
    #[serde(rename = "_id")]
    pub id: String,
    pub status: CallbackStatus,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl CallbackPayload {
    /// Shape-check a decrypted body. A mismatch is a malformed payload.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, WebhookError> {
        Self::deserialize(value).map_err(WebhookError::MalformedPayload)
    }
}
