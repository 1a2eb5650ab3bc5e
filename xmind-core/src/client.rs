use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode, redirect};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::listing::{ListFolderRequest, RemoteFileEntry, normalize_listing};
use crate::resolve::{FetchError, Probe, ResolvedPayload, SourceMode, body_excerpt};

const DEFAULT_BASE_URL: &str = "https://app.xmind.cn";

#[derive(Debug, Error)]
pub enum XmindError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("listing is not valid json: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Client for the XMind drive web API.
///
/// `headers` carry the browser session (cookie, `fwt`, referer, app identity)
/// and are only ever sent to the drive itself. Storage links handed out by the
/// drive are fetched with a separate client that carries none of them.
#[derive(Clone)]
pub struct XmindClient {
    api: Client,
    storage: Client,
    base_url: Url,
    headers: HeaderMap,
}

impl XmindClient {
    pub fn new(headers: HeaderMap) -> Result<Self, XmindError> {
        Self::with_base_url(DEFAULT_BASE_URL, headers)
    }

    pub fn with_base_url(base_url: &str, headers: HeaderMap) -> Result<Self, XmindError> {
        Ok(Self {
            api: Client::builder().redirect(redirect::Policy::none()).build()?,
            storage: Client::new(),
            base_url: Url::parse(base_url)?,
            headers,
        })
    }

    /// Fetches one page of the folder listing.
    pub async fn list_folder(
        &self,
        request: &ListFolderRequest,
    ) -> Result<Vec<RemoteFileEntry>, XmindError> {
        let url = self.endpoint(&["api", "drive", "list-folder"])?;
        let response = self
            .api
            .post(url)
            .headers(self.headers.clone())
            .json(request)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.bytes().await.unwrap_or_default();
            return Err(XmindError::Api {
                status,
                body: body_excerpt(&body),
            });
        }
        let body = response.bytes().await?;
        let value: Value = serde_json::from_slice(&body)?;
        Ok(normalize_listing(&value))
    }

    /// Resolves a file id to its bytes.
    ///
    /// The download endpoint is probed without following redirects; see
    /// [`Probe::classify`] for how the answer is interpreted. Redirect and
    /// indirection targets cost one more request. Nothing is retried.
    pub async fn resolve(&self, file_id: &str) -> Result<ResolvedPayload, FetchError> {
        let url = self.endpoint(&["api", "drive", "file", file_id, "download"])?;
        let response = self
            .api
            .get(url.clone())
            .headers(self.headers.clone())
            .send()
            .await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        match Probe::classify(&url, status, &headers, body)? {
            Probe::Direct(bytes) => Ok(ResolvedPayload {
                bytes,
                source: SourceMode::Direct,
            }),
            Probe::Redirect(target) => Ok(ResolvedPayload {
                bytes: self.fetch_storage(target).await?,
                source: SourceMode::Redirect,
            }),
            Probe::Indirection(target) => Ok(ResolvedPayload {
                bytes: self.fetch_storage(target).await?,
                source: SourceMode::JsonIndirection,
            }),
        }
    }

    async fn fetch_storage(&self, target: Url) -> Result<bytes::Bytes, FetchError> {
        let response = self.storage.get(target).send().await?;
        let status = response.status();
        // Anything but 200 (204 included) would store an empty backup.
        if status != StatusCode::OK {
            return Err(FetchError::DownloadFailed { status });
        }
        Ok(response.bytes().await?)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, url::ParseError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl std::fmt::Debug for XmindClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmindClient")
            .field("base_url", &self.base_url.as_str())
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}
