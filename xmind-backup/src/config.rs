use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue, REFERER};
use thiserror::Error;

const DEFAULT_XMIND_BASE_URL: &str = "https://app.xmind.cn";
const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_FOLDER_ID: &str = "_xmind_CfoeIoGlZY";
const DEFAULT_PAGE_SIZE: u64 = 100;
const DEFAULT_BACKUP_DIR: &str = "xmind_backup/";
const DEFAULT_ITEM_DELAY_SECS: u64 = 2;
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const DEFAULT_APP_IDENTITY: &str = "flatwhite";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("GITHUB_REPOSITORY must look like owner/name, got {0:?}")]
    InvalidRepository(String),
    #[error("value of {name} cannot be sent as an HTTP header")]
    InvalidHeader { name: &'static str },
}

#[derive(Clone)]
pub struct BackupConfig {
    pub github_token: String,
    pub repository: String,
    pub github_api_url: String,
    pub branch: Option<String>,
    pub xmind_base_url: String,
    pub xmind_cookie: String,
    pub xmind_fwt: String,
    pub folder_id: String,
    pub team_id: String,
    pub page_size: u32,
    pub user_agent: String,
    pub app_identity: String,
    pub backup_dir: String,
    pub item_delay: Duration,
    pub skip_unchanged: bool,
}

impl BackupConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let github_token = require("GH_TOKEN")?;
        let xmind_cookie = require("XMIND_COOKIE")?;
        let xmind_fwt = require("XMIND_FWT")?;
        let repository = require("GITHUB_REPOSITORY")?;
        if !is_owner_slash_name(&repository) {
            return Err(ConfigError::InvalidRepository(repository));
        }

        let folder_id = get("XMIND_FOLDER_ID").unwrap_or_else(|| DEFAULT_FOLDER_ID.to_string());
        let team_id = get("XMIND_TEAM_ID").unwrap_or_else(|| folder_id.clone());
        let page_size = read_u64(&get, "XMIND_PAGE_SIZE", DEFAULT_PAGE_SIZE)
            .clamp(1, u64::from(u32::MAX)) as u32;

        Ok(Self {
            github_token,
            repository,
            github_api_url: get("GITHUB_API_URL")
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
            branch: get("BACKUP_BRANCH"),
            xmind_base_url: get("XMIND_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_XMIND_BASE_URL.to_string()),
            xmind_cookie,
            xmind_fwt,
            folder_id,
            team_id,
            page_size,
            user_agent: get("XMIND_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            app_identity: get("XMIND_APP_IDENTITY")
                .unwrap_or_else(|| DEFAULT_APP_IDENTITY.to_string()),
            backup_dir: get("BACKUP_DIR").unwrap_or_else(|| DEFAULT_BACKUP_DIR.to_string()),
            item_delay: Duration::from_secs(read_u64(
                &get,
                "BACKUP_ITEM_DELAY_SECS",
                DEFAULT_ITEM_DELAY_SECS,
            )),
            skip_unchanged: read_bool(&get, "BACKUP_SKIP_UNCHANGED", false),
        })
    }

    /// Session headers the drive expects from its own web app.
    pub fn provider_headers(&self) -> Result<HeaderMap, ConfigError> {
        let referer = format!("{}/home/my-works", self.xmind_base_url);
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            header_value("XMIND_USER_AGENT", &self.user_agent)?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(COOKIE, header_value("XMIND_COOKIE", &self.xmind_cookie)?);
        headers.insert(
            HeaderName::from_static("fwt"),
            header_value("XMIND_FWT", &self.xmind_fwt)?,
        );
        headers.insert(REFERER, header_value("XMIND_BASE_URL", &referer)?);
        headers.insert(
            HeaderName::from_static("x-app-identity"),
            header_value("XMIND_APP_IDENTITY", &self.app_identity)?,
        );
        Ok(headers)
    }
}

impl std::fmt::Debug for BackupConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupConfig")
            .field("repository", &self.repository)
            .field("github_api_url", &self.github_api_url)
            .field("branch", &self.branch)
            .field("xmind_base_url", &self.xmind_base_url)
            .field("folder_id", &self.folder_id)
            .field("team_id", &self.team_id)
            .field("page_size", &self.page_size)
            .field("backup_dir", &self.backup_dir)
            .field("item_delay", &self.item_delay)
            .field("skip_unchanged", &self.skip_unchanged)
            .finish_non_exhaustive()
    }
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, ConfigError> {
    let mut value =
        HeaderValue::from_str(value.trim()).map_err(|_| ConfigError::InvalidHeader { name })?;
    value.set_sensitive(matches!(name, "XMIND_COOKIE" | "XMIND_FWT"));
    Ok(value)
}

fn is_owner_slash_name(repository: &str) -> bool {
    matches!(
        repository.split_once('/'),
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/')
    )
}

fn read_u64<G>(get: &G, name: &str, default: u64) -> u64
where
    G: Fn(&str) -> Option<String>,
{
    get(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn read_bool<G>(get: &G, name: &str, default: bool) -> bool
where
    G: Fn(&str) -> Option<String>,
{
    get(name)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}
