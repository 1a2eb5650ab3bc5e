use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, LOCATION};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

const EXCERPT_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("download link not found: {reason}")]
    LinkNotFound { reason: String },
    #[error("indirection body is not valid json: {0}")]
    MalformedIndirection(#[source] serde_json::Error),
    #[error("download endpoint returned {status}: {body_excerpt}")]
    UnexpectedStatus {
        status: StatusCode,
        body_excerpt: String,
    },
    #[error("storage download returned {status}")]
    DownloadFailed { status: StatusCode },
}

/// How the payload was finally reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceMode {
    Direct,
    Redirect,
    JsonIndirection,
}

#[derive(Debug, Clone)]
pub struct ResolvedPayload {
    pub bytes: Bytes,
    pub source: SourceMode,
}

/// What the download endpoint answered on the first, non-following request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Direct(Bytes),
    Redirect(Url),
    Indirection(Url),
}

impl Probe {
    /// Classifies a probe response by status and content type.
    ///
    /// `request_url` is used to resolve relative `Location` headers.
    pub fn classify(
        request_url: &Url,
        status: StatusCode,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Self, FetchError> {
        if is_followed_redirect(status) {
            let location = headers
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| FetchError::LinkNotFound {
                    reason: format!("{status} without Location header"),
                })?;
            let target = request_url
                .join(location.trim())
                .map_err(|err| FetchError::LinkNotFound {
                    reason: format!("unusable Location {location:?}: {err}"),
                })?;
            return Ok(Probe::Redirect(target));
        }

        if status != StatusCode::OK {
            return Err(FetchError::UnexpectedStatus {
                status,
                body_excerpt: body_excerpt(&body),
            });
        }

        if !is_json_content_type(headers) {
            return Ok(Probe::Direct(body));
        }

        let value: Value =
            serde_json::from_slice(&body).map_err(FetchError::MalformedIndirection)?;
        let link = extract_download_url(&value).ok_or_else(|| FetchError::LinkNotFound {
            reason: format!("no url field in {}", body_excerpt(&body)),
        })?;
        let target = request_url
            .join(link)
            .map_err(|err| FetchError::LinkNotFound {
                reason: format!("unusable url {link:?}: {err}"),
            })?;
        Ok(Probe::Indirection(target))
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// Looks up the storage link in an indirection body: `url`, then `data.url`,
/// then `downloadUrl`.
pub fn extract_download_url(value: &Value) -> Option<&str> {
    let candidates = [
        value.get("url"),
        value.get("data").and_then(|data| data.get("url")),
        value.get("downloadUrl"),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|link| !link.trim().is_empty())
}

/// Leading part of a response body for error messages, at most 100 bytes and
/// cut on a character boundary.
pub fn body_excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= EXCERPT_LIMIT {
        return text.into_owned();
    }
    let mut end = EXCERPT_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
