use std::sync::Arc;

use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use super::pagination::Page;
use super::params::QueryParams;
use super::rate_limit::RateLimiter;
use crate::auth::Token;
use crate::error::{CciError, Result};

const AUTH_HEADER: &str = "circle-token";

/// A successful response body.
///
/// Most endpoints answer JSON; a few (raw step output) answer plain text.
/// Callers decode into a typed shape or take the text explicitly.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    pub fn parse(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(text),
        }
    }

    /// Validates the body against `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CciError::SchemaValidation`] naming `context` when the body
    /// does not have the expected shape.
    pub fn decode<T: DeserializeOwned>(self, context: &str) -> Result<T> {
        let value = match self {
            Self::Json(value) => value,
            Self::Text(text) => Value::String(text),
        };
        serde_json::from_value(value).map_err(|source| CciError::SchemaValidation {
            context: context.to_string(),
            source,
        })
    }
}

/// Thin REST transport bound to one API family (`/api/v2`, `/api/v1.1`, ...).
///
/// Builds URLs, attaches the auth header, and turns non-2xx statuses into
/// [`CciError::Api`]. Never retries.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    download_client: Client,
    base_url: String,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl HttpClient {
    /// Creates a transport for `base_url` (e.g. `https://circleci.com/api/v2`).
    ///
    /// # Errors
    ///
    /// Returns [`CciError::Config`] if the base URL or token cannot be used.
    pub fn new(base_url: &str, token: &Token, user_agent: &str) -> Result<Self> {
        Url::parse(base_url)
            .map_err(|e| CciError::Config(format!("Invalid base URL {base_url}: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| CciError::Config(format!("Invalid user agent: {e}")))?,
        );
        let mut auth = HeaderValue::from_str(token.as_str())
            .map_err(|e| CciError::Config(format!("Invalid API token: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTH_HEADER, auth);

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| CciError::Config(format!("Failed to create HTTP client: {e}")))?;
        let download_client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| CciError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            download_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter: None,
        })
    }

    /// Throttles every request sent through this instance.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(Arc::new(limiter));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins `path` onto the base URL and appends `params`.
    pub fn build_url(&self, path: &str, params: &QueryParams) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| CciError::Config(format!("Invalid request URL for {path}: {e}")))?;
        params.append_to(&mut url);
        Ok(url)
    }

    pub async fn get(&self, path: &str, params: &QueryParams) -> Result<ResponseBody> {
        self.send::<()>(Method::GET, path, params, None).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
        params: &QueryParams,
    ) -> Result<ResponseBody> {
        self.send(Method::POST, path, params, body).await
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
        params: &QueryParams,
    ) -> Result<ResponseBody> {
        self.send(Method::PUT, path, params, body).await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
        params: &QueryParams,
    ) -> Result<ResponseBody> {
        self.send(Method::PATCH, path, params, body).await
    }

    pub async fn delete(&self, path: &str, params: &QueryParams) -> Result<ResponseBody> {
        self.send::<()>(Method::DELETE, path, params, None).await
    }

    /// GET returning the body verbatim, for endpoints that answer plain text.
    pub async fn get_text(&self, path: &str, params: &QueryParams) -> Result<String> {
        self.send_raw::<()>(Method::GET, path, params, None).await
    }

    /// GET decoded into `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &QueryParams,
        context: &str,
    ) -> Result<T> {
        self.get(path, params).await?.decode(context)
    }

    /// Fetches one page of a `{items, next_page_token}` collection.
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &QueryParams,
        page_token: Option<String>,
        context: &str,
    ) -> Result<Page<T>> {
        let params = params.with_page_token(page_token.as_deref());
        self.get_json(path, &params, context).await
    }

    /// Downloads an absolute URL (pre-signed, so no CircleCI headers are needed).
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        debug!("GET {url} (download)");
        let response = self.download_client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let url = response.url().to_string();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(CciError::Api {
                status: status.as_u16(),
                url,
                message,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        params: &QueryParams,
        body: Option<&B>,
    ) -> Result<ResponseBody> {
        let text = self.send_raw(method, path, params, body).await?;
        Ok(ResponseBody::parse(text))
    }

    async fn send_raw<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        params: &QueryParams,
        body: Option<&B>,
    ) -> Result<String> {
        let url = self.build_url(path, params)?;

        if let Some(limiter) = &self.rate_limiter {
            limiter.throttle().await;
        }

        debug!("{method} {url}");
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        Self::handle_response(request.send().await?).await
    }

    async fn handle_response(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let url = response.url().to_string();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|body| {
                    body.get("message")
                        .and_then(Value::as_str)
                        .map(ToString::to_string)
                })
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("Unknown error")
                        .to_string()
                });
            return Err(CciError::Api {
                status: status.as_u16(),
                url,
                message,
            });
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde::Deserialize;
    use serde_json::json;

    fn client_for(server: &mockito::Server) -> HttpClient {
        HttpClient::new(
            &format!("{}/api/v2", server.url()),
            &Token::from("test-token"),
            "cci-tools-test",
        )
        .unwrap()
    }

    #[test]
    fn build_url_joins_base_and_path() {
        let client = HttpClient::new(
            "https://circleci.com/api/v2/",
            &Token::from("t"),
            "cci-tools-test",
        )
        .unwrap();
        let url = client
            .build_url(
                "/project/gh/org/repo/pipeline",
                &QueryParams::new().push("branch", "main"),
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://circleci.com/api/v2/project/gh/org/repo/pipeline?branch=main"
        );
    }

    #[test]
    fn rejects_invalid_base_url() {
        let result = HttpClient::new("not a url", &Token::from("t"), "cci-tools-test");
        assert!(matches!(result, Err(CciError::Config(_))));
    }

    #[tokio::test]
    async fn sends_auth_header_and_parses_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v2/me")
            .match_header("circle-token", "test-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"octocat"}"#)
            .create_async()
            .await;

        #[derive(Deserialize)]
        struct Me {
            name: String,
        }

        let me: Me = client_for(&server)
            .get_json("/me", &QueryParams::new(), "me")
            .await
            .unwrap();

        assert_eq!(me.name, "octocat");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn falls_back_to_text_for_non_json_bodies() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/raw")
            .with_status(200)
            .with_body("line one\nline two")
            .create_async()
            .await;

        let body = client_for(&server)
            .get("/raw", &QueryParams::new())
            .await
            .unwrap();

        assert_eq!(body, ResponseBody::Text("line one\nline two".to_string()));
    }

    #[tokio::test]
    async fn non_success_carries_status_url_and_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/project/gh/org/missing")
            .with_status(404)
            .with_body(r#"{"message":"Project not found"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .get("/project/gh/org/missing", &QueryParams::new())
            .await
            .unwrap_err();

        match err {
            CciError::Api {
                status,
                url,
                message,
            } => {
                assert_eq!(status, 404);
                assert!(url.ends_with("/api/v2/project/gh/org/missing"));
                assert_eq!(message, "Project not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_error_falls_back_to_status_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/api/v2/thing")
            .with_status(500)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let err = client_for(&server)
            .delete("/thing", &QueryParams::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CciError::Api { status: 500, ref message, .. } if message == "Internal Server Error"
        ));
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v2/workflow/abc/rerun")
            .match_body(Matcher::Json(json!({"from_failed": true})))
            .with_status(202)
            .with_body(r#"{"workflow_id":"def"}"#)
            .create_async()
            .await;

        let body = client_for(&server)
            .post(
                "/workflow/abc/rerun",
                Some(&json!({"from_failed": true})),
                &QueryParams::new(),
            )
            .await
            .unwrap();

        assert_eq!(body, ResponseBody::Json(json!({"workflow_id": "def"})));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn put_sends_json_body_and_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/api/v2/project/gh/org/repo/settings")
            .match_query(Matcher::UrlEncoded("dry-run".into(), "true".into()))
            .match_body(Matcher::Json(json!({"advanced": {"autocancel_builds": true}})))
            .with_status(200)
            .with_body(r#"{"advanced":{"autocancel_builds":true}}"#)
            .create_async()
            .await;

        let params = QueryParams::new().push("dry-run", true);
        let body = client_for(&server)
            .put(
                "/project/gh/org/repo/settings",
                Some(&json!({"advanced": {"autocancel_builds": true}})),
                &params,
            )
            .await
            .unwrap();

        assert_eq!(
            body,
            ResponseBody::Json(json!({"advanced": {"autocancel_builds": true}}))
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn patch_without_body_and_error_status() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("PATCH", "/api/v2/context/c1")
            .with_status(204)
            .create_async()
            .await;
        server
            .mock("PATCH", "/api/v2/context/c2")
            .with_status(403)
            .with_body(r#"{"message":"Permission denied"}"#)
            .create_async()
            .await;
        let client = client_for(&server);

        client
            .patch::<()>("/context/c1", None, &QueryParams::new())
            .await
            .unwrap();
        let err = client
            .patch::<()>("/context/c2", None, &QueryParams::new())
            .await
            .unwrap_err();

        ok.assert_async().await;
        assert!(matches!(
            err,
            CciError::Api { status: 403, ref message, .. } if message == "Permission denied"
        ));
    }

    #[tokio::test]
    async fn schema_mismatch_is_a_validation_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/pipeline/1")
            .with_status(200)
            .with_body(r#"{"unexpected":true}"#)
            .create_async()
            .await;

        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Pipeline {
            id: String,
        }

        let err = client_for(&server)
            .get_json::<Pipeline>("/pipeline/1", &QueryParams::new(), "pipeline")
            .await
            .unwrap_err();

        assert!(matches!(err, CciError::SchemaValidation { ref context, .. } if context == "pipeline"));
    }

    #[tokio::test]
    async fn get_text_keeps_json_looking_output_verbatim() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/raw")
            .with_body("{\"level\": \"error\"}\n")
            .create_async()
            .await;

        let text = client_for(&server)
            .get_text("/raw", &QueryParams::new())
            .await
            .unwrap();

        assert_eq!(text, "{\"level\": \"error\"}\n");
    }

    #[test]
    fn text_body_decodes_into_string() {
        let body = ResponseBody::parse("plain output".to_string());
        let text: String = body.decode("output").unwrap();
        assert_eq!(text, "plain output");
    }
}
