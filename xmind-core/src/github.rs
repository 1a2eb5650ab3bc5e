use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("xmind-backup/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid repository {0:?}, expected owner/name")]
    InvalidRepository(String),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("{path} changed since it was read: {body}")]
    Conflict { path: String, body: String },
    #[error("content of {path} is not valid base64: {source}")]
    Content {
        path: String,
        #[source]
        source: base64::DecodeError,
    },
}

/// A file as returned by the contents API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFile {
    pub path: String,
    pub sha: String,
    /// Decoded content; GitHub omits it for large files.
    pub content: Option<Vec<u8>>,
}

#[derive(Debug, Deserialize)]
pub struct CommitResponse {
    pub content: Option<ContentInfo>,
    pub commit: CommitInfo,
}

#[derive(Debug, Deserialize)]
pub struct ContentInfo {
    pub path: String,
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    path: String,
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutContentsBody<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

/// Client for the contents API of a single repository.
#[derive(Clone)]
pub struct GithubClient {
    http: Client,
    base_url: Url,
    token: String,
    owner: String,
    repo: String,
    branch: Option<String>,
}

impl GithubClient {
    pub fn new(token: impl Into<String>, repository: &str) -> Result<Self, GithubError> {
        Self::with_base_url(DEFAULT_BASE_URL, token, repository)
    }

    pub fn with_base_url(
        base_url: &str,
        token: impl Into<String>,
        repository: &str,
    ) -> Result<Self, GithubError> {
        let (owner, repo) = repository
            .split_once('/')
            .filter(|(owner, repo)| !owner.is_empty() && !repo.is_empty() && !repo.contains('/'))
            .ok_or_else(|| GithubError::InvalidRepository(repository.to_string()))?;
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: None,
        })
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch.filter(|b| !b.is_empty());
        self
    }

    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Reads a file; `Ok(None)` when nothing exists at `path`.
    pub async fn get_file(&self, path: &str) -> Result<Option<RepoFile>, GithubError> {
        let mut url = self.contents_url(path)?;
        if let Some(branch) = &self.branch {
            url.query_pairs_mut().append_pair("ref", branch);
        }
        let response = self.request(self.http.get(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let payload: ContentsResponse = Self::handle_response(response).await?;
        let content = match (payload.content, payload.encoding.as_deref()) {
            (Some(encoded), Some("base64")) => Some(decode_content(&payload.path, &encoded)?),
            _ => None,
        };
        Ok(Some(RepoFile {
            path: payload.path,
            sha: payload.sha,
            content,
        }))
    }

    pub async fn create_file(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<CommitResponse, GithubError> {
        self.put_contents(path, content, None, message).await
    }

    /// Replaces a file; `sha` must be the blob sha last read for `path`.
    pub async fn update_file(
        &self,
        path: &str,
        content: &[u8],
        sha: &str,
        message: &str,
    ) -> Result<CommitResponse, GithubError> {
        self.put_contents(path, content, Some(sha), message).await
    }

    async fn put_contents(
        &self,
        path: &str,
        content: &[u8],
        sha: Option<&str>,
        message: &str,
    ) -> Result<CommitResponse, GithubError> {
        let url = self.contents_url(path)?;
        let body = PutContentsBody {
            message,
            content: STANDARD.encode(content),
            sha,
            branch: self.branch.as_deref(),
        };
        let response = self.request(self.http.put(url)).json(&body).send().await?;
        if response.status() == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            return Err(GithubError::Conflict {
                path: path.to_string(),
                body,
            });
        }
        Self::handle_response(response).await
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", USER_AGENT)
    }

    fn contents_url(&self, path: &str) -> Result<Url, GithubError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str(), "contents"])
            .extend(path.split('/').filter(|part| !part.is_empty()));
        Ok(url)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GithubError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(GithubError::Api { status, body })
        }
    }
}

impl std::fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubClient")
            .field("base_url", &self.base_url.as_str())
            .field("repository", &self.repository())
            .field("branch", &self.branch)
            .finish()
    }
}

// The API wraps base64 at 60 columns.
fn decode_content(path: &str, encoded: &str) -> Result<Vec<u8>, GithubError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|source| GithubError::Content {
            path: path.to_string(),
            source,
        })
}
