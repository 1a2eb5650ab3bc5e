mod client;
mod github;
mod listing;
mod resolve;

pub use client::{XmindClient, XmindError};
pub use github::{CommitResponse, GithubClient, GithubError, RepoFile};
pub use listing::{EntryKind, ListFolderRequest, RemoteFileEntry, Timestamp, normalize_listing};
pub use resolve::{FetchError, Probe, ResolvedPayload, SourceMode, body_excerpt};
