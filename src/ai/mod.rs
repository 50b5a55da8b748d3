//! AI integration: the stateless proxy endpoint, the client that talks to
//! it, and the daily usage quota.

pub mod client;
pub mod proxy;
pub mod quota;

use serde::{Deserialize, Serialize};

/// Body of `POST /api/ai`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiRequest {
    /// Defaulted so a missing prompt reports the contract's 400 error
    /// rather than a deserialization rejection.
    #[serde(default)]
    pub prompt: String,
    /// Caller-chosen tag ("pattern", "mvp") echoed back in the response.
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Successful proxy response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiResponse {
    pub result: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub success: bool,
}

/// Error payload for 4xx/5xx proxy responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
