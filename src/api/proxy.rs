//! Transparent reverse proxy with metadata URL rewriting.
//!
//! Non-artifact requests are forwarded to the upstream origin with the
//! `Host` header rewritten to the upstream's. On the way back, metadata
//! bodies are rewritten per ecosystem so clients follow artifact URLs to
//! this proxy instead of the upstream CDN. Rewriting is byte-level
//! substring substitution; bodies are never parsed.

use std::io::Read;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use flate2::read::GzDecoder;

use crate::api::AppState;
use crate::ecosystem::{RewritePolicy, PYPI_FILES_HOST};
use crate::error::{AppError, Result};

/// Total deadline for proxied metadata requests.
const PROXY_TIMEOUT: Duration = Duration::from_secs(60);

/// Forwarded request bodies are buffered; metadata uploads are small.
const MAX_PROXY_BODY: usize = 64 * 1024 * 1024;

/// Hop-by-hop headers that must not be forwarded in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// What to do with an upstream response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RewriteAction {
    PassThrough,
    /// Substitute the upstream origin with the proxy's listen address.
    NpmJson,
    /// Substitute the files CDN origin with the requesting client's host.
    PypiSimple,
}

/// Decide the rewrite action from the policy, request path and response
/// content type.
fn plan_rewrite(policy: RewritePolicy, path: &str, content_type: &str) -> RewriteAction {
    match policy {
        RewritePolicy::None => RewriteAction::PassThrough,
        RewritePolicy::NpmJson => {
            if !path.ends_with(".tgz") && content_type.contains("application/json") {
                RewriteAction::NpmJson
            } else {
                RewriteAction::PassThrough
            }
        }
        RewritePolicy::PypiSimple => {
            if path.contains("/simple/")
                && (content_type.contains("html") || content_type.contains("json"))
            {
                RewriteAction::PypiSimple
            } else {
                RewriteAction::PassThrough
            }
        }
    }
}

/// Forward a non-artifact request upstream and relay the response.
pub async fn forward(state: &AppState, req: Request) -> Result<Response> {
    let (parts, body) = req.into_parts();

    let path = parts.uri.path().to_string();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    // Capture the host the client addressed before it is overwritten with
    // the upstream's on the outbound leg; the PyPI rewrite points clients
    // back at it.
    let client_host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| state.config.bind_address());

    let url = format!("{}{}", state.upstream.trim_end_matches('/'), path_and_query);
    tracing::debug!(method = %parts.method, url = %url, "proxying request");

    let body_bytes = axum::body::to_bytes(body, MAX_PROXY_BODY)
        .await
        .map_err(|e| AppError::Internal(format!("failed to buffer request body: {e}")))?;

    let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
        .map_err(|_| AppError::Internal(format!("invalid method {}", parts.method)))?;

    let policy = state.ecosystem.rewrite_policy();
    let npm_candidate = policy == RewritePolicy::NpmJson && !path.ends_with(".tgz");

    let mut outbound = state.client.request(method, &url).timeout(PROXY_TIMEOUT);
    for (name, value) in parts.headers.iter() {
        let lower = name.as_str();
        if lower == "host" || lower == "content-length" || HOP_BY_HOP.contains(&lower) {
            continue;
        }
        // Rewrite candidates must arrive identity-coded for the byte
        // substitution to apply.
        if npm_candidate && lower == "accept-encoding" {
            continue;
        }
        outbound = outbound.header(lower, value.as_bytes());
    }
    let outbound = outbound.body(body_bytes);

    let upstream_resp = outbound
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("proxy to {url} failed: {e}")))?;

    relay_response(state, upstream_resp, &path, &client_host).await
}

/// Turn the upstream response into the client response, rewriting where
/// the ecosystem policy asks for it.
async fn relay_response(
    state: &AppState,
    upstream_resp: reqwest::Response,
    path: &str,
    client_host: &str,
) -> Result<Response> {
    let status = StatusCode::from_u16(upstream_resp.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let headers = upstream_resp.headers().clone();

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let content_encoding = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    match plan_rewrite(state.ecosystem.rewrite_policy(), path, content_type) {
        RewriteAction::NpmJson => {
            let body = upstream_resp
                .bytes()
                .await
                .map_err(|e| AppError::Upstream(format!("failed to read upstream body: {e}")))?;

            // Accept-Encoding was stripped on the outbound leg; an encoded
            // body here is unexpected, and substitution cannot apply to it.
            if !content_encoding.is_empty() {
                tracing::warn!(path = %path, encoding = %content_encoding, "encoded metadata body, passing through");
                return buffered_response_raw(status, &headers, body.to_vec());
            }

            let rewritten = replace_all_bytes(
                &body,
                state.upstream.as_bytes(),
                state.config.proxy_addr().as_bytes(),
            );
            tracing::debug!(path = %path, size = rewritten.len(), "rewrote registry URLs");
            buffered_response(status, &headers, rewritten)
        }
        RewriteAction::PypiSimple => {
            let raw = upstream_resp
                .bytes()
                .await
                .map_err(|e| AppError::Upstream(format!("failed to read upstream body: {e}")))?;

            let gzipped = content_encoding.contains("gzip");

            // Encodings we cannot decode pass through untouched.
            if !content_encoding.is_empty() && !gzipped {
                tracing::warn!(path = %path, encoding = %content_encoding, "unsupported encoding, passing through");
                return buffered_response_raw(status, &headers, raw.to_vec());
            }

            let decoded = if gzipped {
                match gunzip(&raw) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        // A failed rewrite passes the body through untouched.
                        tracing::warn!(path = %path, error = %e, "gzip decode failed, passing body through");
                        return buffered_response_raw(status, &headers, raw.to_vec());
                    }
                }
            } else {
                raw.to_vec()
            };

            let rewritten = replace_all_bytes(
                &decoded,
                PYPI_FILES_HOST.as_bytes(),
                format!("http://{client_host}").as_bytes(),
            );
            tracing::debug!(path = %path, size = rewritten.len(), "rewrote package index URLs");
            buffered_response(status, &headers, rewritten)
        }
        RewriteAction::PassThrough => {
            let mut builder = Response::builder().status(status);
            for (name, value) in headers.iter() {
                if HOP_BY_HOP.contains(&name.as_str()) {
                    continue;
                }
                if let (Ok(name), Ok(value)) = (
                    HeaderName::from_bytes(name.as_str().as_bytes()),
                    HeaderValue::from_bytes(value.as_bytes()),
                ) {
                    builder = builder.header(name, value);
                }
            }
            builder
                .body(Body::from_stream(upstream_resp.bytes_stream()))
                .map_err(|e| AppError::Internal(format!("failed to build response: {e}")))
        }
    }
}

/// Rewritten body: drop framing and encoding headers, set Content-Length
/// from the bytes actually sent.
fn buffered_response(
    status: StatusCode,
    upstream_headers: &reqwest::header::HeaderMap,
    body: Vec<u8>,
) -> Result<Response> {
    let mut builder = Response::builder().status(status);
    for (name, value) in upstream_headers.iter() {
        let lower = name.as_str();
        if lower == "content-length" || lower == "content-encoding" || HOP_BY_HOP.contains(&lower) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(lower.as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            builder = builder.header(name, value);
        }
    }
    builder
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .map_err(|e| AppError::Internal(format!("failed to build response: {e}")))
}

/// Unmodified buffered body: keep Content-Encoding, recompute only framing.
fn buffered_response_raw(
    status: StatusCode,
    upstream_headers: &reqwest::header::HeaderMap,
    body: Vec<u8>,
) -> Result<Response> {
    let mut builder = Response::builder().status(status);
    for (name, value) in upstream_headers.iter() {
        let lower = name.as_str();
        if lower == "content-length" || HOP_BY_HOP.contains(&lower) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(lower.as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            builder = builder.header(name, value);
        }
    }
    builder
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .map_err(|e| AppError::Internal(format!("failed to build response: {e}")))
}

/// Replace every occurrence of `needle` in `haystack`.
pub fn replace_all_bytes(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    if needle.is_empty() {
        return haystack.to_vec();
    }
    let mut out = Vec::with_capacity(haystack.len());
    let mut i = 0;
    while i < haystack.len() {
        if haystack[i..].starts_with(needle) {
            out.extend_from_slice(replacement);
            i += needle.len();
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    out
}

fn gunzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    // ── replace_all_bytes ────────────────────────────────────────────

    #[test]
    fn test_replace_single_occurrence() {
        let out = replace_all_bytes(
            b"\"tarball\":\"https://registry.npmjs.org/lodash/-/lodash-4.17.21.tgz\"",
            b"https://registry.npmjs.org",
            b"http://0.0.0.0:8080",
        );
        assert_eq!(
            out,
            b"\"tarball\":\"http://0.0.0.0:8080/lodash/-/lodash-4.17.21.tgz\""
        );
    }

    #[test]
    fn test_replace_multiple_occurrences() {
        let out = replace_all_bytes(b"a--a--a", b"a", b"bb");
        assert_eq!(out, b"bb--bb--bb");
    }

    #[test]
    fn test_replace_no_occurrence_is_identity() {
        let body = b"no urls in here".to_vec();
        assert_eq!(replace_all_bytes(&body, b"https://x", b"y"), body);
    }

    #[test]
    fn test_replace_empty_needle_is_identity() {
        assert_eq!(replace_all_bytes(b"abc", b"", b"x"), b"abc");
    }

    #[test]
    fn test_replace_shrinking_replacement() {
        let out = replace_all_bytes(
            b"https://files.pythonhosted.org/packages/x.whl",
            b"https://files.pythonhosted.org",
            b"http://127.0.0.1:8080",
        );
        assert_eq!(out, b"http://127.0.0.1:8080/packages/x.whl");
    }

    // ── plan_rewrite ─────────────────────────────────────────────────

    #[test]
    fn test_npm_rewrites_json_metadata_only() {
        assert_eq!(
            plan_rewrite(RewritePolicy::NpmJson, "/lodash", "application/json"),
            RewriteAction::NpmJson
        );
        // Tarball paths are never rewritten even when JSON-typed
        assert_eq!(
            plan_rewrite(
                RewritePolicy::NpmJson,
                "/lodash/-/lodash-4.17.21.tgz",
                "application/json"
            ),
            RewriteAction::PassThrough
        );
        assert_eq!(
            plan_rewrite(RewritePolicy::NpmJson, "/lodash", "text/html"),
            RewriteAction::PassThrough
        );
    }

    #[test]
    fn test_pypi_rewrites_simple_html_and_json() {
        assert_eq!(
            plan_rewrite(RewritePolicy::PypiSimple, "/simple/requests/", "text/html"),
            RewriteAction::PypiSimple
        );
        assert_eq!(
            plan_rewrite(
                RewritePolicy::PypiSimple,
                "/simple/requests/",
                "application/vnd.pypi.simple.v1+json"
            ),
            RewriteAction::PypiSimple
        );
        assert_eq!(
            plan_rewrite(RewritePolicy::PypiSimple, "/pypi/requests/json", "application/json"),
            RewriteAction::PassThrough
        );
        assert_eq!(
            plan_rewrite(RewritePolicy::PypiSimple, "/simple/requests/", "application/octet-stream"),
            RewriteAction::PassThrough
        );
    }

    #[test]
    fn test_none_policy_never_rewrites() {
        assert_eq!(
            plan_rewrite(RewritePolicy::None, "/api/v1/dependencies", "application/json"),
            RewriteAction::PassThrough
        );
    }

    // ── gunzip ───────────────────────────────────────────────────────

    #[test]
    fn test_gunzip_round_trip() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"<html>index</html>").unwrap();
        let gz = encoder.finish().unwrap();

        assert_eq!(gunzip(&gz).unwrap(), b"<html>index</html>");
    }

    #[test]
    fn test_gunzip_rejects_garbage() {
        assert!(gunzip(b"definitely not gzip").is_err());
    }
}
