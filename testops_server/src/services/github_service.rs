//! GitHub integration: push-hook registration for CI/CD repositories.
//!
//! Hooks point GitHub push events at Jenkins' own `/github-webhook/`
//! endpoint, reachable through `PUBLIC_WEBHOOK_BASE`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::TestOpsConfig;
use crate::error::RemoteError;

const GITHUB_API: &str = "https://api.github.com";
const HOOK_SUFFIX: &str = "/github-webhook/";
const GITHUB_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookRegistration {
    pub message: String,
    pub webhook_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("only GitHub repositories are supported: '{0}'")]
    UnsupportedRepository(String),
    #[error("GITHUB_TOKEN is not configured")]
    MissingToken,
    #[error("PUBLIC_WEBHOOK_BASE is not configured")]
    MissingPublicBase,
    #[error("GitHub token is invalid or expired")]
    Unauthorized,
    #[error("token lacks admin permission to manage hooks on {0}")]
    Forbidden(String),
    #[error("repository {0} does not exist or is not accessible")]
    RepositoryNotFound(String),
    #[error("GitHub API error: {0}")]
    Remote(#[from] RemoteError),
}

impl From<reqwest::Error> for HookError {
    fn from(err: reqwest::Error) -> Self {
        Self::Remote(err.into())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HookRegistrar: Send + Sync {
    /// Make sure `repo_link` delivers push events to Jenkins, replacing hooks
    /// left behind by an earlier public base URL.
    async fn register_push_hook(&self, repo_link: &str) -> Result<HookRegistration, HookError>;
}

/// `owner/repo` from a GitHub URL, with any `.git` suffix removed.
pub fn parse_repo_path(repo_link: &str) -> Result<String, HookError> {
    let trimmed = repo_link.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let path = trimmed
        .split_once("github.com/")
        .map(|(_, path)| path)
        .filter(|path| {
            let mut parts = path.split('/');
            matches!((parts.next(), parts.next(), parts.next()), (Some(o), Some(r), None) if !o.is_empty() && !r.is_empty())
        })
        .ok_or_else(|| HookError::UnsupportedRepository(repo_link.to_string()))?;
    Ok(path.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct ExistingHook {
    id: i64,
    #[serde(default)]
    config: HookConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
struct HookConfig {
    #[serde(default)]
    url: String,
}

/// Jenkins push hooks aimed at a public base other than `public_base`.
fn stale_hooks<'a>(hooks: &'a [ExistingHook], public_base: &str) -> Vec<&'a ExistingHook> {
    hooks
        .iter()
        .filter(|h| h.config.url.ends_with(HOOK_SUFFIX) && !h.config.url.starts_with(public_base))
        .collect()
}

/// The hook a 422 collided with: an exact URL match, else any Jenkins push
/// hook. Unrelated hooks are never picked.
fn matching_hook<'a>(hooks: &'a [ExistingHook], hook_url: &str) -> Option<&'a ExistingHook> {
    hooks
        .iter()
        .find(|h| h.config.url == hook_url)
        .or_else(|| hooks.iter().find(|h| h.config.url.ends_with(HOOK_SUFFIX)))
}

/// [`HookRegistrar`] backed by the GitHub REST API.
pub struct GithubHookRegistrar {
    client: reqwest::Client,
    token: String,
    public_base: String,
    hook_url: String,
}

impl GithubHookRegistrar {
    pub fn new(config: &TestOpsConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("testops")
            .timeout(GITHUB_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            token: config.github_token.clone(),
            public_base: config.public_webhook_base.clone(),
            hook_url: config.push_hook_url(),
        })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
    }

    fn hook_body(&self) -> serde_json::Value {
        serde_json::json!({
            "name": "web",
            "active": true,
            "events": ["push"],
            "config": {
                "url": self.hook_url,
                "content_type": "json",
                "insecure_ssl": "0",
            },
        })
    }

    async fn list_hooks(&self, hooks_url: &str) -> Result<Vec<ExistingHook>, HookError> {
        let resp = self.request(reqwest::Method::GET, hooks_url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RemoteError::http(status.as_u16(), text).into());
        }
        Ok(resp.json().await?)
    }

    /// Delete Jenkins push hooks that still point at a previous public base.
    async fn remove_stale_hooks(&self, hooks_url: &str) {
        let hooks = match self.list_hooks(hooks_url).await {
            Ok(hooks) => hooks,
            Err(e) => {
                tracing::debug!(error = %e, "Could not list existing hooks");
                return;
            }
        };
        for hook in stale_hooks(&hooks, &self.public_base) {
            let url = &hook.config.url;
            let delete_url = format!("{hooks_url}/{}", hook.id);
            match self.request(reqwest::Method::DELETE, &delete_url).send().await {
                Ok(resp) => tracing::info!(hook = hook.id, %url, status = resp.status().as_u16(), "Removed stale push hook"),
                Err(e) => tracing::warn!(hook = hook.id, error = %e, "Failed to remove stale push hook"),
            }
        }
    }

    /// Hook already exists: refresh our own hook in place.
    async fn update_existing(&self, hooks_url: &str, repo: &str) -> Result<HookRegistration, HookError> {
        let already = HookRegistration {
            message: format!("Webhook already exists for repository {repo}"),
            webhook_url: self.hook_url.clone(),
        };
        let hooks = self.list_hooks(hooks_url).await.unwrap_or_default();
        let Some(existing) = matching_hook(&hooks, &self.hook_url) else {
            return Ok(already);
        };
        let update_url = format!("{hooks_url}/{}", existing.id);
        let resp = self
            .request(reqwest::Method::PATCH, &update_url)
            .json(&self.hook_body())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RemoteError::http(status.as_u16(), text).into());
        }
        Ok(HookRegistration {
            message: format!("Updated webhook for repository {repo}"),
            webhook_url: self.hook_url.clone(),
        })
    }
}

#[async_trait]
impl HookRegistrar for GithubHookRegistrar {
    async fn register_push_hook(&self, repo_link: &str) -> Result<HookRegistration, HookError> {
        let repo = parse_repo_path(repo_link)?;
        if self.token.is_empty() {
            return Err(HookError::MissingToken);
        }
        if self.public_base.is_empty() {
            return Err(HookError::MissingPublicBase);
        }

        let hooks_url = format!("{GITHUB_API}/repos/{repo}/hooks");
        self.remove_stale_hooks(&hooks_url).await;

        let resp = self
            .request(reqwest::Method::POST, &hooks_url)
            .json(&self.hook_body())
            .send()
            .await?;
        let status = resp.status().as_u16();
        tracing::info!(%repo, status, "GitHub hook registration answered");

        match status {
            200 | 201 => Ok(HookRegistration {
                message: format!("Added webhook for repository {repo}"),
                webhook_url: self.hook_url.clone(),
            }),
            401 => Err(HookError::Unauthorized),
            403 => Err(HookError::Forbidden(repo)),
            404 => Err(HookError::RepositoryNotFound(repo)),
            422 => self.update_existing(&hooks_url, &repo).await,
            _ => {
                let text = resp.text().await.unwrap_or_default();
                let message = serde_json::from_str::<serde_json::Value>(&text)
                    .ok()
                    .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                    .unwrap_or_else(|| "Unknown error".to_string());
                Err(RemoteError::http(status, message).into())
            }
        }
    }
}
