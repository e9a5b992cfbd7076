use serde_json::json;

use super::http::HttpClient;
use super::params::QueryParams;
use super::types::ConfigValidation;
use crate::error::Result;

/// Config compilation, served from the `api.` subdomain.
#[derive(Clone)]
pub struct ConfigValidationApi {
    http: HttpClient,
}

impl ConfigValidationApi {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub async fn validate_config(&self, config_yaml: &str) -> Result<ConfigValidation> {
        self.http
            .post(
                "/compile-config-with-defaults",
                Some(&json!({ "config_yaml": config_yaml })),
                &QueryParams::new(),
            )
            .await?
            .decode("config validation")
    }
}
