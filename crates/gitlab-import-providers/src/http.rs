use anyhow::Context;
use gitlab_import_core::error::ClientError;
use gitlab_import_core::provider::ClientResult;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, WWW_AUTHENTICATE};
use std::path::PathBuf;
use std::time::Duration;

const ERROR_BODY_LIMIT: usize = 512;

#[derive(Clone, Debug)]
pub struct HttpSettings {
    pub timeout: Duration,
    /// Extra PEM bundle trusted next to the built-in roots.
    pub ca_certs_file: Option<PathBuf>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            ca_certs_file: None,
        }
    }
}

pub fn build_client(settings: &HttpSettings) -> anyhow::Result<Client> {
    let mut builder = Client::builder()
        .timeout(settings.timeout)
        .user_agent(concat!("gitlab-import/", env!("CARGO_PKG_VERSION")));
    if let Some(path) = &settings.ca_certs_file {
        let pem = std::fs::read(path)
            .with_context(|| format!("read CA certificates {}", path.display()))?;
        for cert in reqwest::Certificate::from_pem_bundle(&pem)
            .with_context(|| format!("parse CA certificates {}", path.display()))?
        {
            builder = builder.add_root_certificate(cert);
        }
    }
    builder.build().context("build http client")
}

/// Sends the request and maps every non-2xx status to a [`ClientError`].
pub fn send(request: RequestBuilder, what: &str) -> ClientResult<Response> {
    send_allow_statuses(request, what, &[])
}

/// Like [`send`], but statuses in `allowed` are handed back to the caller.
pub fn send_allow_statuses(
    request: RequestBuilder,
    what: &str,
    allowed: &[StatusCode],
) -> ClientResult<Response> {
    let response = request
        .send()
        .with_context(|| format!("send {what} request"))?;
    let status = response.status();
    if status.is_success() || allowed.contains(&status) {
        return Ok(response);
    }
    Err(status_error(response, what))
}

fn status_error(response: Response, what: &str) -> ClientError {
    let status = response.status();
    let realm = challenge(response.headers());
    let body = response.text().unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| status.to_string());
    match status {
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized {
            realm: realm.unwrap_or_default(),
            message: format!("{what}: {message}"),
        },
        StatusCode::NOT_FOUND => ClientError::NotFound(what.to_string()),
        _ => ClientError::Request(anyhow::anyhow!("{what} returned {status}: {message}")),
    }
}

fn challenge(headers: &HeaderMap) -> Option<String> {
    headers
        .get(WWW_AUTHENTICATE)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

/// Human readable part of an error body: GitLab's `message`/`error`, a
/// problem's `detail`, or the trimmed raw text.
fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "message", "error", "title"] {
            match value.get(key) {
                Some(serde_json::Value::String(text)) if !text.is_empty() => {
                    return Some(text.clone());
                }
                Some(other) if !other.is_null() => return Some(other.to_string()),
                _ => {}
            }
        }
    }
    Some(body.chars().take(ERROR_BODY_LIMIT).collect())
}
