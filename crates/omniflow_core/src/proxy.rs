/*
 * SPDX-FileCopyrightText: 2026 OmniFlow Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use futures_util::StreamExt;
use omniflow_protocol::{FormDataEntry, ProxyRequest, ProxyResponse, StreamEvent};
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Request};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default bound on a unary proxied request, connect through body read.
pub const DEFAULT_PROXY_TIMEOUT_SECS: u64 = 120;

/// Streaming reads are re-sliced to chunks of at most this many bytes before
/// base64 encoding, so a single event stays small enough for the view layer.
const STREAM_CHUNK_BYTES: usize = 1024;

const FALLBACK_MIME: &str = "application/octet-stream";

/// Immutable configuration for [`ProxyClient`]. The timeout applies to unary
/// requests only; streaming requests run until completion, error, or the peer
/// closes the connection (the caller holds the task handle and may abort it).
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_PROXY_TIMEOUT_SECS),
        }
    }
}

/// Why a [`ProxyRequest`] could not be turned into an outbound request.
/// These never escape the executors; both convert them into the
/// result/event vocabulary the frontend understands.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("malformed request body: {0}")]
    MalformedBody(String),
    #[error("invalid base64 payload in form entry \"{key}\": {source}")]
    InvalidEncoding {
        key: String,
        source: base64::DecodeError,
    },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Executes proxied HTTP requests on behalf of the sandboxed frontend.
///
/// Unary requests buffer the whole response and return a [`ProxyResponse`].
/// Streaming requests never return a value; they publish [`StreamEvent`]s on
/// the broadcast channel, keyed by the caller-supplied request id.
#[derive(Clone)]
pub struct ProxyClient {
    http: Client,
    timeout: Duration,
    events: broadcast::Sender<StreamEvent>,
}

impl ProxyClient {
    pub fn new(cfg: &ProxyConfig, events: broadcast::Sender<StreamEvent>) -> Result<Self> {
        let http = Client::builder().build().context("build http client")?;
        Ok(Self {
            http,
            timeout: cfg.timeout,
            events,
        })
    }

    /// Subscribe to stream events. Call before starting a stream, or its
    /// first chunks may be missed.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    /// Translates a frontend request description into an outbound request.
    /// Pure translation, no network I/O.
    fn build_request(&self, req: &ProxyRequest) -> Result<Request, BuildError> {
        let multipart_mode = req.headers.iter().any(|(k, v)| {
            k.eq_ignore_ascii_case("content-type")
                && v.to_lowercase().contains("multipart/form-data")
        });

        let method = Method::from_bytes(req.method.as_bytes())
            .map_err(|e| BuildError::InvalidRequest(format!("bad method {:?}: {e}", req.method)))?;

        let mut builder = self.http.request(method, &req.url);
        if multipart_mode {
            builder = builder.multipart(build_form(&req.body)?);
        } else if !req.body.is_empty() {
            builder = builder.body(req.body.clone());
        }
        let mut out = builder
            .build()
            .map_err(|e| BuildError::InvalidRequest(e.to_string()))?;

        // The multipart writer's boundary-bearing Content-Type is
        // authoritative: drop whatever the caller supplied and re-apply the
        // computed value after user headers.
        let boundary_content_type = if multipart_mode {
            out.headers().get(CONTENT_TYPE).cloned()
        } else {
            None
        };

        for (key, value) in &req.headers {
            if multipart_mode && key.eq_ignore_ascii_case("content-type") {
                continue;
            }
            let Ok(name) = HeaderName::from_bytes(key.as_bytes()) else {
                debug!("skipping unparseable header name {key:?}");
                continue;
            };
            let Ok(value) = HeaderValue::from_str(value) else {
                debug!("skipping unparseable value for header {key:?}");
                continue;
            };
            out.headers_mut().insert(name, value);
        }

        if let Some(ct) = boundary_content_type {
            out.headers_mut().insert(CONTENT_TYPE, ct);
        }

        Ok(out)
    }

    /// Runs one request to completion and buffers the response. Never fails
    /// to the caller; failures are encoded in the returned value.
    pub async fn proxy_request(&self, req: &ProxyRequest) -> ProxyResponse {
        let mut outbound = match self.build_request(req) {
            Ok(r) => r,
            Err(e) => return ProxyResponse::failure(0, e.to_string()),
        };
        *outbound.timeout_mut() = Some(self.timeout);

        let resp = match self.http.execute(outbound).await {
            Ok(r) => r,
            Err(e) => return ProxyResponse::failure(0, e.to_string()),
        };

        let status = resp.status();
        let mut headers = HashMap::new();
        for key in resp.headers().keys() {
            let joined = resp
                .headers()
                .get_all(key)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect::<Vec<_>>()
                .join(", ");
            headers.insert(key.to_string(), joined);
        }
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let body_bytes = match resp.bytes().await {
            Ok(b) => b,
            // Headers already arrived, so the status is preserved even
            // though the body read failed.
            Err(e) => return ProxyResponse::failure(status.as_u16(), e.to_string()),
        };

        let body = if is_binary_content(&content_type) {
            format!(
                "data:{content_type};base64,{}",
                BASE64_STANDARD.encode(&body_bytes)
            )
        } else {
            String::from_utf8_lossy(&body_bytes).into_owned()
        };

        let status_text = match status.canonical_reason() {
            Some(reason) => format!("{} {}", status.as_u16(), reason),
            None => {
                let code = status.as_u16();
                format!("{code} status code {code}")
            }
        };

        ProxyResponse {
            success: true,
            status: status.as_u16(),
            status_text,
            headers,
            body,
            error: String::new(),
        }
    }

    /// Fires one streaming request as an independent task and returns its
    /// handle immediately. The task communicates exclusively through the
    /// event channel: zero or more `Data` events in byte order, then exactly
    /// one terminal `Error` or `End`.
    pub fn proxy_stream_request(&self, request_id: &str, req: ProxyRequest) -> JoinHandle<()> {
        let this = self.clone();
        let request_id = request_id.to_string();
        tokio::spawn(async move {
            this.run_stream(&request_id, &req).await;
        })
    }

    async fn run_stream(&self, request_id: &str, req: &ProxyRequest) {
        let outbound = match self.build_request(req) {
            Ok(r) => r,
            Err(e) => return self.emit_stream_error(request_id, e.to_string()),
        };

        let resp = match self.http.execute(outbound).await {
            Ok(r) => r,
            Err(e) => return self.emit_stream_error(request_id, e.to_string()),
        };

        let status = resp.status();
        if status.as_u16() >= 400 {
            // Error responses are buffered whole; no Data events.
            let body = resp.bytes().await.unwrap_or_default();
            return self.emit_stream_error(
                request_id,
                format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    String::from_utf8_lossy(&body)
                ),
            );
        }

        let mut stream = resp.bytes_stream();
        while let Some(next) = stream.next().await {
            let chunk = match next {
                Ok(c) => c,
                Err(e) => return self.emit_stream_error(request_id, e.to_string()),
            };
            for piece in chunk.chunks(STREAM_CHUNK_BYTES) {
                if piece.is_empty() {
                    continue;
                }
                let _ = self.events.send(StreamEvent::Data {
                    request_id: request_id.to_string(),
                    chunk_b64: BASE64_STANDARD.encode(piece),
                });
            }
        }

        let _ = self.events.send(StreamEvent::End {
            request_id: request_id.to_string(),
        });
    }

    fn emit_stream_error(&self, request_id: &str, message: String) {
        warn!("stream {request_id} failed: {message}");
        let _ = self.events.send(StreamEvent::Error {
            request_id: request_id.to_string(),
            message,
        });
    }
}

/// Whether a response payload must be base64-escaped before crossing the
/// text-only channel to the frontend. Substring match, not a media-type
/// parse; empty or unknown content types count as text.
pub fn is_binary_content(content_type: &str) -> bool {
    let ct = content_type.to_lowercase();
    ["image", "audio", "video", "pdf", "octet-stream"]
        .iter()
        .any(|marker| ct.contains(marker))
}

fn build_form(body: &str) -> Result<Form, BuildError> {
    let entries: Vec<FormDataEntry> = serde_json::from_str(body)
        .map_err(|e| BuildError::MalformedBody(format!("parse form data: {e}")))?;

    let mut form = Form::new();
    for entry in entries {
        match file_part_from_data_uri(&entry)? {
            Some(part) => form = form.part(entry.key, part),
            None => form = form.text(entry.key, entry.value),
        }
    }
    Ok(form)
}

/// Reconstructs a file part from a `data:<mime>;base64,<payload>` value.
/// Returns `Ok(None)` for plain text values.
fn file_part_from_data_uri(entry: &FormDataEntry) -> Result<Option<Part>, BuildError> {
    if !(entry.value.starts_with("data:") && entry.value.contains(";base64,")) {
        return Ok(None);
    }
    let Some((meta, payload)) = entry.value.split_once(',') else {
        return Ok(None);
    };

    // The filename extension follows the extracted type as written; only the
    // part's content type falls back when that type is unusable.
    let raw_mime = mime_from_data_uri_meta(meta);
    let ext = raw_mime.split_once('/').map(|(_, sub)| sub).unwrap_or("bin");
    let filename = format!("file_{}.{ext}", entry.key);
    let mime_type = if raw_mime.parse::<mime_guess::Mime>().is_ok() {
        raw_mime
    } else {
        FALLBACK_MIME
    };

    let decoded = BASE64_STANDARD
        .decode(payload)
        .map_err(|source| BuildError::InvalidEncoding {
            key: entry.key.clone(),
            source,
        })?;

    let part = Part::bytes(decoded)
        .file_name(filename)
        .mime_str(mime_type)
        .map_err(|e| BuildError::MalformedBody(format!("bad mime type {mime_type:?}: {e}")))?;
    Ok(Some(part))
}

/// Extracts the raw MIME string from a data URI prefix
/// ("data:image/png;base64"). Empty when the `:`/`;` delimiters are absent.
fn mime_from_data_uri_meta(meta: &str) -> &str {
    meta.split_once(':')
        .and_then(|(_, rest)| rest.split_once(';'))
        .map(|(mime, _)| mime)
        .unwrap_or("")
}
