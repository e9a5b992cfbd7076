mod artifacts;
mod config_validate;
mod deploys;
mod http;
mod insights;
mod jobs;
mod me;
pub mod pagination;
mod params;
mod pipelines;
mod projects;
pub mod rate_limit;
pub mod types;
mod usage;
mod workflows;

use log::debug;
use url::{Host, Url};

pub use artifacts::{filter_artifacts, ArtifactsApi};
pub use config_validate::ConfigValidationApi;
pub use deploys::DeploysApi;
pub use http::{HttpClient, ResponseBody};
pub use insights::{InsightsApi, InsightsFilter, ReportingWindow};
pub use job_tests::JobTestsApi;
pub use jobs::{JobDetailsApi, JobsApi, StepOutputApi};
pub use me::MeApi;
pub use pagination::{FilterMode, Page, PaginationOptions};
pub use params::{QueryParams, QueryValue};
pub use pipelines::PipelinesApi;
pub use projects::ProjectsApi;
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use usage::UsageApi;
pub use workflows::WorkflowsApi;

use crate::auth::Token;
use crate::error::{CciError, Result};

pub const DEFAULT_BASE_URL: &str = "https://circleci.com";

/// Everything needed to build the API clients. Read once, passed in explicitly.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub token: Token,
    pub base_url: Url,
    pub pagination: PaginationOptions,
    pub step_output_rate_limit: RateLimitConfig,
    pub user_agent: String,
}

impl ClientConfig {
    /// Configuration for `https://circleci.com` with default limits.
    ///
    /// # Errors
    ///
    /// Never fails for the built-in base URL; kept fallible to share the
    /// validation path with [`ClientConfig::with_base_url`].
    pub fn new(token: Token) -> Result<Self> {
        Ok(Self {
            token,
            base_url: parse_base_url(DEFAULT_BASE_URL)?,
            pagination: PaginationOptions::default(),
            step_output_rate_limit: RateLimitConfig::default(),
            user_agent: format!("cci-tools/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    /// # Errors
    ///
    /// Returns [`CciError::Config`] when `base_url` is not an absolute URL.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = parse_base_url(base_url)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_pagination(mut self, pagination: PaginationOptions) -> Self {
        self.pagination = pagination;
        self
    }

    #[must_use]
    pub fn with_step_output_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.step_output_rate_limit = rate_limit;
        self
    }

    /// REST family root, e.g. `api_url("v2")` -> `https://circleci.com/api/v2`.
    pub fn api_url(&self, family: &str) -> String {
        format!(
            "{}/api/{family}",
            self.base_url.as_str().trim_end_matches('/')
        )
    }

    /// The `api.` subdomain used by config compilation.
    ///
    /// Hosts that are IP addresses, `localhost`, or already on the `api.`
    /// subdomain are used unchanged.
    pub fn subdomain_api_url(&self) -> String {
        let mut url = self.base_url.clone();
        if let Some(Host::Domain(domain)) = self.base_url.host() {
            if domain != "localhost"
                && !domain.starts_with("api.")
                && url.set_host(Some(&format!("api.{domain}"))).is_err()
            {
                debug!("Could not move {domain} to the api. subdomain");
            }
        }
        format!("{}/api/v2", url.as_str().trim_end_matches('/'))
    }

    fn transport(&self, base_url: &str) -> Result<HttpClient> {
        HttpClient::new(base_url, &self.token, &self.user_agent)
    }
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    let url = Url::parse(base_url)
        .map_err(|e| CciError::Config(format!("Invalid base URL {base_url}: {e}")))?;
    if url.cannot_be_a_base() || url.host().is_none() {
        return Err(CciError::Config(format!(
            "Base URL must be an absolute http(s) URL: {base_url}"
        )));
    }
    Ok(url)
}

/// Public API clients (`/api/v2`, `/api/v1.1` and the `api.` subdomain).
#[derive(Clone)]
pub struct CircleCiClients {
    pub pipelines: PipelinesApi,
    pub workflows: WorkflowsApi,
    pub jobs: JobsApi,
    pub job_details: JobDetailsApi,
    pub job_tests: JobTestsApi,
    pub insights: InsightsApi,
    pub artifacts: ArtifactsApi,
    pub projects: ProjectsApi,
    pub usage: UsageApi,
    pub deploys: DeploysApi,
    pub config_validation: ConfigValidationApi,
}

impl CircleCiClients {
    /// Builds every public client from one configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CciError::Config`] if a transport cannot be created.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let v2 = config.transport(&config.api_url("v2"))?;
        let v1 = config.transport(&config.api_url("v1.1"))?;
        let subdomain = config.transport(&config.subdomain_api_url())?;
        let pagination = config.pagination.clone();

        Ok(Self {
            pipelines: PipelinesApi::new(v2.clone(), pagination.clone()),
            workflows: WorkflowsApi::new(v2.clone(), pagination.clone()),
            jobs: JobsApi::new(v2.clone(), pagination.clone()),
            job_details: JobDetailsApi::new(v1),
            job_tests: JobTestsApi::new(v2.clone(), pagination.clone()),
            insights: InsightsApi::new(v2.clone(), pagination.clone()),
            artifacts: ArtifactsApi::new(v2.clone(), pagination.clone()),
            projects: ProjectsApi::new(v2.clone()),
            usage: UsageApi::new(v2.clone()),
            deploys: DeploysApi::new(v2, pagination),
            config_validation: ConfigValidationApi::new(subdomain),
        })
    }
}

/// Clients for the undocumented `/api/private` family.
#[derive(Clone)]
pub struct PrivateClients {
    pub me: MeApi,
    pub step_output: StepOutputApi,
}

impl PrivateClients {
    /// # Errors
    ///
    /// Returns [`CciError::Config`] if a transport cannot be created.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let private = config.transport(&config.api_url("private"))?;
        let throttled = private
            .clone()
            .with_rate_limiter(RateLimiter::from(&config.step_output_rate_limit));

        Ok(Self {
            me: MeApi::new(private, config.pagination.clone()),
            step_output: StepOutputApi::new(throttled),
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::HttpClient;
    use crate::auth::Token;

    /// Transport pointed at `{server}/api/{family}`.
    pub fn transport(server: &mockito::Server, family: &str) -> HttpClient {
        HttpClient::new(
            &format!("{}/api/{family}", server.url()),
            &Token::from("test-token"),
            "cci-tools-test",
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> ClientConfig {
        ClientConfig::new(Token::from("t"))
            .unwrap()
            .with_base_url(base_url)
            .unwrap()
    }

    #[test]
    fn derives_rest_families_from_base_url() {
        let config = config("https://circleci.com/");
        assert_eq!(config.api_url("v2"), "https://circleci.com/api/v2");
        assert_eq!(config.api_url("v1.1"), "https://circleci.com/api/v1.1");
        assert_eq!(config.api_url("private"), "https://circleci.com/api/private");
    }

    #[test]
    fn config_validation_uses_api_subdomain() {
        assert_eq!(
            config("https://circleci.com").subdomain_api_url(),
            "https://api.circleci.com/api/v2"
        );
        assert_eq!(
            config("https://api.circleci.com").subdomain_api_url(),
            "https://api.circleci.com/api/v2"
        );
        assert_eq!(
            config("http://127.0.0.1:1234").subdomain_api_url(),
            "http://127.0.0.1:1234/api/v2"
        );
        assert_eq!(
            config("http://localhost:8080").subdomain_api_url(),
            "http://localhost:8080/api/v2"
        );
        assert_eq!(
            config("https://cci.internal:8443/").subdomain_api_url(),
            "https://api.cci.internal:8443/api/v2"
        );
    }

    #[test]
    fn rejects_relative_base_url() {
        let result = ClientConfig::new(Token::from("t"))
            .unwrap()
            .with_base_url("circleci.com");
        assert!(matches!(result, Err(CciError::Config(_))));
    }

    #[test]
    fn builds_all_clients() {
        let config = config("https://circleci.com");
        assert!(CircleCiClients::new(&config).is_ok());
        assert!(PrivateClients::new(&config).is_ok());
    }
}
