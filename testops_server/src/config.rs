//! Service configuration, loaded from environment variables.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct TestOpsConfig {
    /// Jenkins base URL, without trailing slash.
    pub jenkins_url: String,
    /// Jenkins user for basic auth (only used when a token is present).
    pub jenkins_user: String,
    /// Jenkins API token. Empty disables basic auth.
    pub jenkins_token: String,
    /// URL Jenkins posts finished-build notifications to.
    pub result_webhook_url: String,
    /// GitHub token for repository hook registration.
    pub github_token: String,
    /// Public base URL of the Jenkins GitHub push endpoint.
    pub public_webhook_base: String,
    /// Timeout for build, status, console and artifact calls.
    pub jenkins_timeout: Duration,
    /// Timeout for crumb and job config calls.
    pub jenkins_config_timeout: Duration,
}

impl TestOpsConfig {
    pub fn from_env() -> Self {
        let jenkins_url = std::env::var("JENKINS_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string())
            .trim_end_matches('/')
            .to_string();
        let jenkins_user = std::env::var("JENKINS_USER").unwrap_or_else(|_| "admin".to_string());
        let jenkins_token = std::env::var("JENKINS_TOKEN").unwrap_or_default();
        let result_webhook_url = std::env::var("TESTOPS_WEBHOOK_URL")
            .unwrap_or_else(|_| "http://backend:8000/api/reports/jenkins/webhook".to_string());
        let github_token = std::env::var("GITHUB_TOKEN").unwrap_or_default();
        let public_webhook_base = std::env::var("PUBLIC_WEBHOOK_BASE")
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string();
        let jenkins_timeout = std::env::var("JENKINS_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));
        let jenkins_config_timeout = std::env::var("JENKINS_CONFIG_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(15));

        if jenkins_token.is_empty() {
            tracing::warn!("JENKINS_TOKEN not set -- calling Jenkins anonymously");
        }
        if github_token.is_empty() {
            tracing::warn!("GITHUB_TOKEN not set -- repository hook registration disabled");
        }
        if public_webhook_base.is_empty() {
            tracing::warn!("PUBLIC_WEBHOOK_BASE not set -- repository hook registration disabled");
        }

        Self {
            jenkins_url,
            jenkins_user,
            jenkins_token,
            result_webhook_url,
            github_token,
            public_webhook_base,
            jenkins_timeout,
            jenkins_config_timeout,
        }
    }

    /// URL GitHub should deliver push events to.
    pub fn push_hook_url(&self) -> String {
        format!("{}/github-webhook/", self.public_webhook_base)
    }
}

#[cfg(test)]
impl TestOpsConfig {
    pub fn for_tests() -> Self {
        Self {
            jenkins_url: "http://jenkins.test".to_string(),
            jenkins_user: "admin".to_string(),
            jenkins_token: String::new(),
            result_webhook_url: "http://testops.test/api/reports/jenkins/webhook".to_string(),
            github_token: String::new(),
            public_webhook_base: "https://hooks.test".to_string(),
            jenkins_timeout: Duration::from_secs(30),
            jenkins_config_timeout: Duration::from_secs(15),
        }
    }
}
