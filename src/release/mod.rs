//! Upstream release polling

use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::OrchestratorError;
use crate::utils::version_info;

const API_BASE: &str = "https://api.github.com";

/// A published release on the upstream registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    pub html_url: String,
}

/// Extract `(owner, repo)` from a remote repository URL
///
/// Strips the scheme, the host, a `.git` suffix and a trailing slash; the
/// first two path segments are owner and repo.
pub fn parse_remote(url: &str) -> Option<(String, String)> {
    let mut rest = url;
    if let Some(idx) = rest.find("://") {
        rest = &rest[idx + 3..];
    }
    let rest = rest.trim_end_matches('/');
    let rest = rest.strip_suffix(".git").unwrap_or(rest);

    let mut segments = rest.split('/').filter(|s| !s.is_empty());
    let _host = segments.next()?;
    let owner = segments.next()?;
    let repo = segments.next()?;

    Some((owner.to_string(), repo.to_string()))
}

/// Whether a fetched release is newer than the current version
///
/// Comparison is literal string equality; no semver parsing.
pub fn is_update(current: Option<&str>, latest: &Release) -> bool {
    match current {
        Some(version) => latest.tag_name != version,
        None => true,
    }
}

/// Client for the upstream "latest release" endpoint
pub struct ReleaseClient {
    client: Client,
}

impl ReleaseClient {
    pub fn new() -> Result<Self, OrchestratorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    /// Fetch the latest release for a remote URL; failures collapse to None
    pub async fn get_latest(&self, remote_url: &str) -> Option<Release> {
        let (owner, repo) = match parse_remote(remote_url) {
            Some(parts) => parts,
            None => {
                warn!("Cannot parse remote URL for release polling: {}", remote_url);
                return None;
            }
        };

        let url = format!("{}/repos/{}/{}/releases/latest", API_BASE, owner, repo);
        debug!("GET {}", url);

        let response = match self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/vnd.github.v3+json")
            .header(
                header::USER_AGENT,
                format!("podgate/{}", version_info().version),
            )
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Release query for {}/{} failed: {}", owner, repo, e);
                return None;
            }
        };

        match response.status() {
            status if status.is_success() => match response.json::<Release>().await {
                Ok(release) => Some(release),
                Err(e) => {
                    warn!("Invalid release payload for {}/{}: {}", owner, repo, e);
                    None
                }
            },
            StatusCode::NOT_FOUND => {
                info!("No releases published for {}/{}", owner, repo);
                None
            }
            status => {
                warn!("Release query for {}/{} returned {}", owner, repo, status);
                None
            }
        }
    }

    /// Return the latest release iff its tag differs from the current version
    pub async fn check_for_update(
        &self,
        remote_url: &str,
        current_version: Option<&str>,
    ) -> Option<Release> {
        let latest = self.get_latest(remote_url).await?;

        if is_update(current_version, &latest) {
            Some(latest)
        } else {
            debug!("Already at latest release {}", latest.tag_name);
            None
        }
    }
}
