//! Jenkins REST/XML client.
//!
//! Every call degrades to a sentinel (`None`, `false`, rejected trigger) or a
//! [`RemoteError`] value instead of failing the caller; deciding what a
//! remote failure means for a task is the reconciler's job.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::TestOpsConfig;
use crate::error::RemoteError;
use crate::metrics;

/// Console output handed back to clients is cut to this many trailing chars.
pub const CONSOLE_TAIL_CHARS: usize = 5000;

static BUILD_LOCATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/builds/(\d+)/").unwrap());

/// CSRF header Jenkins expects on mutating calls.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Crumb {
    #[serde(rename = "crumbRequestField")]
    pub field: String,
    #[serde(rename = "crumb")]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildTriggerResult {
    pub accepted: bool,
    pub build_number: Option<i64>,
    /// HTTP status, `None` when Jenkins could not be reached.
    pub raw_status: Option<u16>,
    pub raw_body: String,
}

impl BuildTriggerResult {
    /// Message shown to the caller when the trigger was not accepted.
    pub fn failure_message(&self) -> String {
        match self.raw_status {
            Some(code) => format!("HTTP {code}: {}", self.raw_body),
            None => format!("Connection error: {}", self.raw_body),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub number: i64,
    pub result: Option<String>,
    #[serde(default)]
    pub building: bool,
    pub url: Option<String>,
    /// Milliseconds.
    #[serde(default)]
    pub duration: i64,
    /// Epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub artifacts: Vec<serde_json::Value>,
}

/// Which build of a job a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildRef {
    Last,
    Number(i64),
}

impl From<Option<i64>> for BuildRef {
    fn from(number: Option<i64>) -> Self {
        number.map_or(Self::Last, Self::Number)
    }
}

impl fmt::Display for BuildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Last => f.write_str("lastBuild"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub name: String,
    pub url: String,
}

#[derive(Deserialize)]
struct JobList {
    #[serde(default)]
    jobs: Vec<JobSummary>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JenkinsGateway: Send + Sync {
    /// CSRF crumb, or `None` when Jenkins issues none or is unreachable.
    async fn get_crumb(&self) -> Option<Crumb>;

    /// Start a parameterized build. Rejection is a value, not an error.
    async fn trigger_build(&self, job: &str, params: Vec<(String, String)>) -> BuildTriggerResult;

    /// Build status, `None` when Jenkins cannot tell right now.
    async fn get_build_info(&self, job: &str, build: BuildRef) -> Option<BuildInfo>;

    async fn get_job_config(&self, job: &str) -> Result<String, RemoteError>;

    async fn put_job_config(&self, job: &str, xml: &str) -> Result<(), RemoteError>;

    /// Best-effort stop; `false` on any failure.
    async fn stop_build(&self, job: &str, build: BuildRef) -> bool;

    /// Trailing console text, empty when unavailable.
    async fn fetch_console_log(&self, job: &str, build: BuildRef) -> String;

    /// Robot Framework `output.xml`, `None` when the build has none.
    async fn fetch_test_results(&self, job: &str, build: BuildRef) -> Option<String>;

    async fn list_jobs(&self) -> Result<Vec<JobSummary>, RemoteError>;
}

/// [`JenkinsGateway`] over Jenkins' HTTP API.
pub struct HttpJenkinsGateway {
    client: reqwest::Client,
    base_url: String,
    user: String,
    token: String,
    timeout: Duration,
    config_timeout: Duration,
}

impl HttpJenkinsGateway {
    pub fn new(config: &TestOpsConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("testops/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: config.jenkins_url.clone(),
            user: config.jenkins_user.clone(),
            token: config.jenkins_token.clone(),
            timeout: config.jenkins_timeout,
            config_timeout: config.jenkins_config_timeout,
        })
    }

    fn job_url(&self, job: &str) -> String {
        format!("{}/job/{job}", self.base_url)
    }

    fn request(&self, method: Method, url: &str, timeout: Duration) -> RequestBuilder {
        let builder = self.client.request(method, url).timeout(timeout);
        if self.token.is_empty() {
            builder
        } else {
            builder.basic_auth(&self.user, Some(&self.token))
        }
    }

    async fn with_crumb(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.get_crumb().await {
            Some(crumb) => builder.header(crumb.field, crumb.value),
            None => builder,
        }
    }
}

fn truncate_tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    match text.char_indices().nth(count - max_chars) {
        Some((offset, _)) => &text[offset..],
        None => text,
    }
}

fn build_number_from_location(location: &str) -> Option<i64> {
    BUILD_LOCATION
        .captures(location)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[async_trait]
impl JenkinsGateway for HttpJenkinsGateway {
    async fn get_crumb(&self) -> Option<Crumb> {
        let url = format!("{}/crumbIssuer/api/json", self.base_url);
        let resp = match self.request(Method::GET, &url, self.config_timeout).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!(error = %e, "Crumb request failed");
                metrics::jenkins_call("crumb", false);
                return None;
            }
        };
        if resp.status() != StatusCode::OK {
            tracing::debug!(status = resp.status().as_u16(), "Jenkins issued no crumb");
            metrics::jenkins_call("crumb", false);
            return None;
        }
        let crumb = resp.json::<Crumb>().await.ok();
        metrics::jenkins_call("crumb", crumb.is_some());
        crumb
    }

    async fn trigger_build(&self, job: &str, params: Vec<(String, String)>) -> BuildTriggerResult {
        let url = format!("{}/buildWithParameters", self.job_url(job));
        let builder = self
            .with_crumb(self.request(Method::POST, &url, self.timeout))
            .await
            .form(&params);

        let resp = match builder.send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(job, error = %e, "Jenkins unreachable while triggering build");
                metrics::jenkins_call("trigger", false);
                return BuildTriggerResult {
                    accepted: false,
                    build_number: None,
                    raw_status: None,
                    raw_body: e.to_string(),
                };
            }
        };

        let status = resp.status();
        let build_number = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(build_number_from_location);
        let raw_body = resp.text().await.unwrap_or_default();
        let accepted = status == StatusCode::CREATED;
        metrics::jenkins_call("trigger", accepted);
        if accepted {
            tracing::info!(job, build = ?build_number, "Jenkins accepted build");
        } else {
            tracing::warn!(job, status = status.as_u16(), "Jenkins rejected build");
        }

        BuildTriggerResult {
            accepted,
            build_number,
            raw_status: Some(status.as_u16()),
            raw_body,
        }
    }

    async fn get_build_info(&self, job: &str, build: BuildRef) -> Option<BuildInfo> {
        let url = format!("{}/{build}/api/json", self.job_url(job));
        let resp = match self.request(Method::GET, &url, self.timeout).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(job, %build, error = %e, "Jenkins unreachable reading build info");
                metrics::jenkins_call("build_info", false);
                return None;
            }
        };
        if resp.status() != StatusCode::OK {
            tracing::debug!(job, %build, status = resp.status().as_u16(), "No build info");
            metrics::jenkins_call("build_info", false);
            return None;
        }
        match resp.json::<BuildInfo>().await {
            Ok(info) => {
                metrics::jenkins_call("build_info", true);
                Some(info)
            }
            Err(e) => {
                tracing::warn!(job, %build, error = %e, "Unreadable build info");
                metrics::jenkins_call("build_info", false);
                None
            }
        }
    }

    async fn get_job_config(&self, job: &str) -> Result<String, RemoteError> {
        let url = format!("{}/config.xml", self.job_url(job));
        let result: Result<String, RemoteError> = async {
            let resp = self.request(Method::GET, &url, self.config_timeout).send().await?;
            let status = resp.status();
            let body = resp.text().await?;
            if status != StatusCode::OK {
                return Err(RemoteError::http(status.as_u16(), body));
            }
            Ok(body)
        }
        .await;
        metrics::jenkins_call("get_config", result.is_ok());
        if let Err(e) = &result {
            tracing::warn!(job, error = %e, "Failed to read job config");
        }
        result
    }

    async fn put_job_config(&self, job: &str, xml: &str) -> Result<(), RemoteError> {
        let url = format!("{}/config.xml", self.job_url(job));
        let result: Result<(), RemoteError> = async {
            let resp = self
                .with_crumb(self.request(Method::POST, &url, self.config_timeout))
                .await
                .header(reqwest::header::CONTENT_TYPE, "application/xml")
                .body(xml.to_string())
                .send()
                .await?;
            let status = resp.status();
            if status != StatusCode::OK {
                let body = resp.text().await.unwrap_or_default();
                return Err(RemoteError::http(status.as_u16(), body));
            }
            Ok(())
        }
        .await;
        metrics::jenkins_call("put_config", result.is_ok());
        match &result {
            Ok(()) => tracing::info!(job, "Job config updated"),
            Err(e) => tracing::warn!(job, error = %e, "Failed to write job config"),
        }
        result
    }

    async fn stop_build(&self, job: &str, build: BuildRef) -> bool {
        let url = format!("{}/{build}/stop", self.job_url(job));
        let sent = self
            .with_crumb(self.request(Method::POST, &url, self.timeout))
            .await
            .send()
            .await;
        let stopped = match sent {
            // Jenkins answers a stop with a redirect to the build page.
            Ok(resp) => resp.status().is_success() || resp.status().is_redirection(),
            Err(e) => {
                tracing::warn!(job, %build, error = %e, "Stop request failed");
                false
            }
        };
        metrics::jenkins_call("stop", stopped);
        stopped
    }

    async fn fetch_console_log(&self, job: &str, build: BuildRef) -> String {
        let url = format!("{}/{build}/consoleText", self.job_url(job));
        let text = match self.request(Method::GET, &url, self.timeout).send().await {
            Ok(resp) if resp.status() == StatusCode::OK => resp.text().await.ok(),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(job, %build, error = %e, "Console log unavailable");
                None
            }
        };
        metrics::jenkins_call("console", text.is_some());
        text.map(|t| truncate_tail(&t, CONSOLE_TAIL_CHARS).to_string())
            .unwrap_or_default()
    }

    async fn fetch_test_results(&self, job: &str, build: BuildRef) -> Option<String> {
        let url = format!("{}/{build}/robot/report/output.xml", self.job_url(job));
        let xml = match self.request(Method::GET, &url, self.timeout).send().await {
            Ok(resp) if resp.status() == StatusCode::OK => resp.text().await.ok(),
            Ok(resp) => {
                tracing::info!(job, %build, status = resp.status().as_u16(), "No output.xml for build");
                None
            }
            Err(e) => {
                tracing::warn!(job, %build, error = %e, "Failed to fetch output.xml");
                None
            }
        };
        metrics::jenkins_call("test_results", xml.is_some());
        xml
    }

    async fn list_jobs(&self) -> Result<Vec<JobSummary>, RemoteError> {
        let url = format!("{}/api/json", self.base_url);
        let result: Result<Vec<JobSummary>, RemoteError> = async {
            let resp = self.request(Method::GET, &url, self.timeout).send().await?;
            let status = resp.status();
            if status != StatusCode::OK {
                let body = resp.text().await.unwrap_or_default();
                return Err(RemoteError::http(status.as_u16(), body));
            }
            Ok(resp.json::<JobList>().await?.jobs)
        }
        .await;
        metrics::jenkins_call("list_jobs", result.is_ok());
        result
    }
}
