use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{CloneMethod, GitLabConfig};
use crate::discovery::{GroupDirectory, RemoteGroup, RemoteProject};

/// Safety net against a server that never stops paginating
const MAX_PAGES: u32 = 1000;

/// GitLab REST API client wrapper
pub struct GitLabClient {
    http: Client,
    api_base: String,
    per_page: u32,
    clone_method: CloneMethod,
}

#[derive(Debug, Deserialize)]
struct ApiGroup {
    id: u64,
    path: String,
}

#[derive(Debug, Deserialize)]
struct ApiProject {
    path: String,
    ssh_url_to_repo: String,
    http_url_to_repo: String,
}

impl GitLabClient {
    /// Create a new GitLab client, authenticated when a token is available
    pub fn new(config: &GitLabConfig, clone_method: CloneMethod) -> Result<Self> {
        let mut headers = HeaderMap::new();

        match config.token() {
            Some(token) => {
                let mut value = HeaderValue::from_str(&token)
                    .context("GitLab token contains characters not allowed in a header")?;
                value.set_sensitive(true);
                headers.insert("private-token", value);
            }
            None => warn!(
                "{} is not set, only public groups and projects will be visible",
                config.token_env
            ),
        }

        let http = Client::builder()
            .user_agent(concat!("labmirror/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create GitLab client")?;

        Ok(Self {
            http,
            api_base: format!("{}/api/v4", config.url.trim_end_matches('/')),
            per_page: config.per_page.clamp(1, 100),
            clone_method,
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response> {
        let url = format!("{}{}", self.api_base, path);

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to reach GitLab at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "GET {} returned {}: {}",
                path,
                status,
                api_message(&body)
            ));
        }

        Ok(response)
    }

    async fn get_one<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        self.get(path, query)
            .await?
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode response of {}", path))
    }

    /// Fetch every page of a listing, following `X-Next-Page`
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            let mut paged_query = query.to_vec();
            paged_query.push(("per_page", self.per_page.to_string()));
            paged_query.push(("page", page.to_string()));

            let response = self.get(path, &paged_query).await?;
            let next_page = response
                .headers()
                .get("x-next-page")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u32>().ok());

            let batch: Vec<T> = response
                .json()
                .await
                .with_context(|| format!("Failed to decode page {} of {}", page, path))?;
            let batch_len = batch.len();
            items.extend(batch);

            match next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }

            if batch_len == 0 {
                break;
            }

            if page > MAX_PAGES {
                warn!("Reached maximum pagination limit ({} pages) for {}", MAX_PAGES, path);
                break;
            }
        }

        debug!("Fetched {} items from {}", items.len(), path);
        Ok(items)
    }

    fn to_remote_project(&self, project: ApiProject) -> RemoteProject {
        let clone_address = match self.clone_method {
            CloneMethod::Ssh => project.ssh_url_to_repo,
            CloneMethod::Https => project.http_url_to_repo,
        };

        RemoteProject {
            path: project.path,
            clone_address,
        }
    }
}

#[async_trait]
impl GroupDirectory for GitLabClient {
    async fn get_group(&self, id: u64) -> Result<RemoteGroup> {
        let group: ApiGroup = self
            .get_one(
                &format!("/groups/{}", id),
                &[("with_projects", "false".to_string())],
            )
            .await?;

        Ok(RemoteGroup {
            id: group.id,
            path: group.path,
        })
    }

    async fn list_projects(&self, group_id: u64) -> Result<Vec<RemoteProject>> {
        let projects: Vec<ApiProject> = self
            .get_all(
                &format!("/groups/{}/projects", group_id),
                &[("with_shared", "false".to_string())],
            )
            .await?;

        Ok(projects
            .into_iter()
            .map(|project| self.to_remote_project(project))
            .collect())
    }

    async fn list_subgroups(&self, group_id: u64) -> Result<Vec<u64>> {
        let groups: Vec<ApiGroup> = self
            .get_all(&format!("/groups/{}/subgroups", group_id), &[])
            .await?;

        Ok(groups.into_iter().map(|group| group.id).collect())
    }

    async fn list_owned_projects(&self) -> Result<Vec<RemoteProject>> {
        let projects: Vec<ApiProject> = self
            .get_all("/projects", &[("owned", "true".to_string())])
            .await?;

        Ok(projects
            .into_iter()
            .map(|project| self.to_remote_project(project))
            .collect())
    }

    fn provider_name(&self) -> &'static str {
        "GitLab"
    }
}

/// Pull the human-readable message out of a GitLab error body
fn api_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.get("error"))
                .map(|message| match message {
                    serde_json::Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
        })
        .unwrap_or_else(|| body.trim().to_string())
}
