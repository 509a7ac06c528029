//! External repositories models can be created from.

use std::time::Duration;

use anyhow::Context;
use axum::async_trait;
use log::{debug, warn};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{Result, ServiceError};

const GITHUB_WEB_URL: &str = "https://github.com";

/// A place model releases are published to, addressed by repository and tag.
#[async_trait]
pub trait ModelSource {
    /// Every tag of `repository`, newest first as the source reports them.
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>>;

    /// README of `repository` at `tag`, `None` when the release has none.
    async fn fetch_readme(&self, repository: &str, tag: &str) -> Result<Option<String>>;
}

/// Normalize `owner/name`, also accepting a `https://github.com/` prefix and a `.git` suffix.
pub fn normalize_repository(repository: &str) -> Result<String> {
    let trimmed = repository
        .trim()
        .trim_start_matches(GITHUB_WEB_URL)
        .trim_start_matches('/')
        .trim_end_matches('/')
        .trim_end_matches(".git");

    let mut parts = trimmed.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None) if valid_segment(owner) && valid_segment(name) => {
            Ok(format!("{}/{}", owner, name))
        }
        _ => Err(ServiceError::InvalidArgument(format!(
            "repository {:?} is not of the form owner/name",
            repository
        ))),
    }
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Browser link for a repository, or for one of its tags.
pub fn html_url(repository: &str, tag: Option<&str>) -> String {
    match tag {
        Some(tag) => format!("{}/{}/tree/{}", GITHUB_WEB_URL, repository, tag),
        None => format!("{}/{}", GITHUB_WEB_URL, repository),
    }
}

#[derive(Deserialize, Debug)]
struct GitHubTag {
    name: String,
}

/// [ModelSource] backed by the GitHub REST API and raw content host.
pub struct GitHubSource {
    client: reqwest::Client,
    api_url: String,
    raw_url: String,
}

impl GitHubSource {
    pub fn new(api_url: &str, raw_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("model-service/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build GitHub client")?;

        Ok(GitHubSource {
            client,
            api_url: api_url.trim_end_matches('/').to_owned(),
            raw_url: raw_url.trim_end_matches('/').to_owned(),
        })
    }
}

fn unreachable(repository: &str, reason: impl std::fmt::Display) -> ServiceError {
    ServiceError::FailedPrecondition(format!(
        "repository {} is not reachable: {}",
        repository, reason
    ))
}

#[async_trait]
impl ModelSource for GitHubSource {
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        let url = format!("{}/repos/{}/tags?per_page=100", self.api_url, repository);
        debug!("listing tags from {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| unreachable(repository, e))?;

        if !response.status().is_success() {
            warn!("GET {} returned {}", url, response.status());
            return Err(unreachable(repository, response.status()));
        }

        let tags: Vec<GitHubTag> = response
            .json()
            .await
            .map_err(|e| unreachable(repository, e))?;

        Ok(tags.into_iter().map(|t| t.name).collect())
    }

    async fn fetch_readme(&self, repository: &str, tag: &str) -> Result<Option<String>> {
        let url = format!("{}/{}/{}/README.md", self.raw_url, repository, tag);
        debug!("fetching README from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unreachable(repository, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let text = response
                    .text()
                    .await
                    .map_err(|e| unreachable(repository, e))?;
                Ok(Some(text))
            }
            status => Err(unreachable(repository, status)),
        }
    }
}

#[cfg(test)]
mod test {
    use std::{net::TcpListener, time::Duration};

    use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};

    use super::{html_url, normalize_repository, GitHubSource, ModelSource};
    use crate::error::Code;

    async fn tags(
        Path((owner, name)): Path<(String, String)>,
    ) -> Result<Json<serde_json::Value>, StatusCode> {
        match (owner.as_str(), name.as_str()) {
            ("instill-ai", "model-dummy-cls") => Ok(Json(serde_json::json!([
                { "name": "v1.0-cpu", "commit": { "sha": "abc" } },
                { "name": "v1.1-cpu", "commit": { "sha": "def" } }
            ]))),
            _ => Err(StatusCode::NOT_FOUND),
        }
    }

    async fn readme(
        Path((_owner, _name, tag)): Path<(String, String, String)>,
    ) -> Result<String, StatusCode> {
        match tag.as_str() {
            "v1.0-cpu" => Ok("---\nTask: Classification\n---\n# Dummy\n".to_owned()),
            _ => Err(StatusCode::NOT_FOUND),
        }
    }

    /// Serve a fake GitHub API and raw host on an ephemeral port.
    fn fake_github() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/repos/:owner/:name/tags", get(tags))
            .route("/raw/:owner/:name/:tag/README.md", get(readme));

        tokio::spawn(async move {
            axum::Server::from_tcp(listener)
                .unwrap()
                .serve(app.into_make_service())
                .await
                .unwrap();
        });

        format!("http://{}", addr)
    }

    #[test]
    pub fn repository_names() {
        assert_eq!(
            normalize_repository("instill-ai/model-dummy-cls").unwrap(),
            "instill-ai/model-dummy-cls"
        );
        assert_eq!(
            normalize_repository("https://github.com/instill-ai/model-dummy-cls.git").unwrap(),
            "instill-ai/model-dummy-cls"
        );
        for bad in ["", "instill-ai", "a/b/c", "owner/na me"] {
            assert_eq!(
                normalize_repository(bad).unwrap_err().code(),
                Code::InvalidArgument,
                "{:?}",
                bad
            );
        }

        assert_eq!(
            html_url("instill-ai/model-dummy-cls", Some("v1.0-cpu")),
            "https://github.com/instill-ai/model-dummy-cls/tree/v1.0-cpu"
        );
    }

    #[tokio::test]
    pub async fn github_tags_and_readme() {
        let base = fake_github();
        let source = GitHubSource::new(&base, &format!("{}/raw", base), Duration::from_secs(5)).unwrap();

        assert_eq!(
            source.list_tags("instill-ai/model-dummy-cls").await.unwrap(),
            vec!["v1.0-cpu", "v1.1-cpu"]
        );
        assert_eq!(
            source.list_tags("instill-ai/missing").await.unwrap_err().code(),
            Code::FailedPrecondition
        );

        let readme = source
            .fetch_readme("instill-ai/model-dummy-cls", "v1.0-cpu")
            .await
            .unwrap();
        assert!(readme.unwrap().contains("Classification"));
        assert!(source
            .fetch_readme("instill-ai/model-dummy-cls", "v1.1-cpu")
            .await
            .unwrap()
            .is_none());
    }
}
