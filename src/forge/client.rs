use crate::config::ForgeSettings;
use crate::types::{DiffRequest, FetchError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Source of pull-request diff text. Trait seam so the orchestrator can be
/// exercised against a scripted source in tests.
#[async_trait]
pub trait DiffSource: Send + Sync {
    /// Fetch the diff for one pull request. An empty string is a valid
    /// result (the PR exposes no diff); errors are terminal for the run.
    async fn fetch(&self, request: &DiffRequest) -> Result<String, FetchError>;
}

/// Subset of the Gitee pull-request metadata payload we rely on.
#[derive(Debug, Deserialize)]
struct PullMetadata {
    #[serde(default)]
    diff_url: Option<String>,
}

/// Gitee REST client for pull-request diffs.
///
/// Two requests per fetch: PR metadata, then the raw diff body the
/// metadata points at. Neither request is retried; a failure at either
/// step aborts the run.
pub struct GiteeClient {
    client: Client,
    api_base: String,
    access_token: Option<String>,
}

impl GiteeClient {
    pub fn new(settings: &ForgeSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            access_token: settings.access_token.clone(),
        })
    }

    fn pull_url(&self, request: &DiffRequest) -> String {
        format!(
            "{}/repos/{}/{}/pulls/{}",
            self.api_base, request.owner, request.repo, request.pr_number
        )
    }
}

#[async_trait]
impl DiffSource for GiteeClient {
    async fn fetch(&self, request: &DiffRequest) -> Result<String, FetchError> {
        let url = self.pull_url(request);
        info!("Fetching PR metadata: {}", url);

        let mut metadata_request = self.client.get(&url);
        if let Some(token) = &self.access_token {
            metadata_request = metadata_request.query(&[("access_token", token.as_str())]);
        }

        let response = metadata_request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status, url });
        }

        let metadata: PullMetadata = response
            .json()
            .await
            .map_err(|e| FetchError::Metadata(e.to_string()))?;

        // A PR without a diff_url has no diff to review; that is an empty
        // diff, not a failure.
        let Some(diff_url) = metadata.diff_url else {
            debug!("PR metadata carries no diff_url, treating as empty diff");
            return Ok(String::new());
        };

        debug!("Fetching diff body: {}", diff_url);
        let response = self.client.get(&diff_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                url: diff_url,
            });
        }

        let body = response.bytes().await?;
        Ok(decode_utf8_dropping_invalid(&body))
    }
}

/// Decode bytes as UTF-8, dropping undecodable sequences rather than
/// failing or substituting replacement characters.
fn decode_utf8_dropping_invalid(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}
