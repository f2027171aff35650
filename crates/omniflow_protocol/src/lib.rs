/*
 * SPDX-FileCopyrightText: 2026 OmniFlow Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A proxied HTTP request as described by the sandboxed frontend.
///
/// `body` is raw text, except when a Content-Type header contains
/// "multipart/form-data": then it is a JSON array of [`FormDataEntry`].
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProxyRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
}

/// One field of a multipart request. `value` is either plain text or a
/// `data:<mime>;base64,<payload>` URI carrying file bytes.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FormDataEntry {
    pub key: String,
    pub value: String,
}

/// Result of a unary proxied request. Failure never surfaces as an error
/// value to the caller; it is encoded in `success`/`error`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub success: bool,
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub error: String,
}

impl ProxyResponse {
    pub fn failure(status: u16, error: impl Into<String>) -> Self {
        Self {
            success: false,
            status,
            error: error.into(),
            ..Self::default()
        }
    }
}

/// One event in a streaming proxied request's sequence. The request id is a
/// caller-chosen correlation key carried on every event; subscribers filter
/// on it. Exactly one terminal event (`Error` or `End`) is emitted per
/// request id, after zero or more `Data` events in byte order.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamEvent {
    Data {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "chunkB64")]
        chunk_b64: String,
    },
    Error {
        #[serde(rename = "requestId")]
        request_id: String,
        message: String,
    },
    End {
        #[serde(rename = "requestId")]
        request_id: String,
    },
}

impl StreamEvent {
    pub fn request_id(&self) -> &str {
        match self {
            StreamEvent::Data { request_id, .. }
            | StreamEvent::Error { request_id, .. }
            | StreamEvent::End { request_id } => request_id,
        }
    }

    /// True for `Error` and `End`, the events that close a stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Data { .. })
    }
}
