//! HTTP client for the activity-source REST API.
//!
//! Every typed call goes through [`ActivityClient::request`], which
//! classifies the outcome once and never loops:
//!
//! | Response | Error |
//! |---|---|
//! | 429 | `RateLimited` (Retry-After seconds, default 60) |
//! | 401 / 403 | `Unauthorized` |
//! | 5xx | `Upstream` |
//! | other non-2xx | `Rejected` (body verbatim) |
//! | transport failure | `Network` |

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use zeroize::Zeroizing;

use super::types::*;
use super::ProviderConfig;
use crate::errors::ApiError;

pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Client bound to one account's secret.
pub struct ActivityClient {
    http: Client,
    base_url: String,
    token_header: String,
    token: Zeroizing<String>,
}

impl ActivityClient {
    pub fn new(http: Client, config: &ProviderConfig, token: Zeroizing<String>) -> Self {
        Self {
            http,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            token_header: config.token_header.clone(),
            token,
        }
    }

    /// Shared HTTP client with the timeouts every provider call uses.
    pub fn http_client() -> reqwest::Result<Client> {
        Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("activity-digest/", env!("CARGO_PKG_VERSION")))
            .build()
    }

    /// GET `endpoint` (path + query, relative to the API base) and decode
    /// the JSON body.
    pub async fn request<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let resp = self
            .http
            .get(&url)
            .header(self.token_header.as_str(), self.token.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ApiError::Network {
                endpoint: endpoint.to_string(),
                message: e.without_url().to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(classify_failure(status, resp).await);
        }

        let body = resp.text().await.map_err(|e| ApiError::Network {
            endpoint: endpoint.to_string(),
            message: e.without_url().to_string(),
        })?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }

    pub async fn get_identity(&self) -> Result<Identity, ApiError> {
        self.request("/me").await
    }

    pub async fn list_team_projects(&self, team_id: &str) -> Result<TeamProjects, ApiError> {
        self.request(&format!("/teams/{}/projects", urlencoding::encode(team_id)))
            .await
    }

    pub async fn list_project_files(&self, project_id: &str) -> Result<ProjectFiles, ApiError> {
        self.request(&format!("/projects/{}/files", urlencoding::encode(project_id)))
            .await
    }

    /// Versions of a file, filtered server-side to those after `since`.
    pub async fn list_file_versions(
        &self,
        file_key: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<FileVersions, ApiError> {
        self.request(&versions_endpoint(file_key, since)).await
    }

    /// All comments of a file; the API offers no time filter.
    pub async fn list_file_comments(&self, file_key: &str) -> Result<FileComments, ApiError> {
        self.request(&format!("/files/{}/comments", urlencoding::encode(file_key)))
            .await
    }

    pub async fn get_file_meta(&self, file_key: &str) -> Result<FileMeta, ApiError> {
        let resp: FileMetaResponse = self
            .request(&format!("/files/{}/meta", urlencoding::encode(file_key)))
            .await?;
        Ok(resp.file)
    }
}

fn versions_endpoint(file_key: &str, since: Option<DateTime<Utc>>) -> String {
    let mut endpoint = format!("/files/{}/versions", urlencoding::encode(file_key));
    if let Some(since) = since {
        let iso = since.to_rfc3339_opts(SecondsFormat::Millis, true);
        endpoint.push_str("?since=");
        endpoint.push_str(&urlencoding::encode(&iso));
    }
    endpoint
}

async fn classify_failure(status: StatusCode, resp: reqwest::Response) -> ApiError {
    match status.as_u16() {
        429 => ApiError::RateLimited {
            retry_after_secs: parse_retry_after(resp.headers()),
        },
        401 | 403 => ApiError::Unauthorized {
            status: status.as_u16(),
        },
        code if status.is_server_error() => ApiError::Upstream {
            status: code,
            body: resp.text().await.unwrap_or_default(),
        },
        code => ApiError::Rejected {
            status: code,
            body: resp.text().await.unwrap_or_default(),
        },
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ActivityClient {
        let config = ProviderConfig {
            api_base: format!("{}/v1/", server.uri()),
            ..ProviderConfig::default()
        };
        ActivityClient::new(
            ActivityClient::http_client().unwrap(),
            &config,
            Zeroizing::new("figd_test_token".to_string()),
        )
    }

    #[test]
    fn test_versions_endpoint_encodes_since() {
        let since = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            versions_endpoint("abc", Some(since)),
            "/files/abc/versions?since=2024-05-01T10%3A00%3A00.000Z"
        );
        assert_eq!(versions_endpoint("abc", None), "/files/abc/versions");
    }

    #[tokio::test]
    async fn test_identity_sends_token_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/me"))
            .and(header("X-Figma-Token", "figd_test_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "u-1", "email": "ada@example.com", "handle": "Ada"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let me = client_for(&server).get_identity().await.unwrap();
        assert_eq!(me.id, "u-1");
        assert_eq!(me.handle.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_429_uses_retry_after_header() {
        let server = MockServer::start().await;
        Mock::given(path("/v1/me"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "17"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server).get_identity().await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { retry_after_secs: 17 }));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_429_defaults_to_sixty_seconds() {
        let server = MockServer::start().await;
        Mock::given(path("/v1/me"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client_for(&server).get_identity().await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { retry_after_secs: 60 }));
    }

    #[tokio::test]
    async fn test_auth_failures_are_fatal() {
        for status in [401u16, 403] {
            let server = MockServer::start().await;
            Mock::given(path("/v1/me"))
                .respond_with(ResponseTemplate::new(status))
                .expect(1)
                .mount(&server)
                .await;

            let err = client_for(&server).get_identity().await.unwrap_err();
            assert!(matches!(err, ApiError::Unauthorized { status: s } if s == status));
            assert!(!err.is_recoverable());
        }
    }

    #[tokio::test]
    async fn test_5xx_is_recoverable_and_404_fatal_with_body() {
        let server = MockServer::start().await;
        Mock::given(path("/v1/files/aaa/comments"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;
        Mock::given(path("/v1/files/bbb/comments"))
            .respond_with(ResponseTemplate::new(404).set_body_string("{\"err\":\"Not found\"}"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.list_file_comments("aaa").await.unwrap_err();
        assert!(matches!(err, ApiError::Upstream { status: 502, .. }));
        assert!(err.is_recoverable());

        match client.list_file_comments("bbb").await.unwrap_err() {
            ApiError::Rejected { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "{\"err\":\"Not found\"}");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_network_error_is_recoverable() {
        let config = ProviderConfig {
            api_base: "http://127.0.0.1:1/v1".to_string(),
            ..ProviderConfig::default()
        };
        let client = ActivityClient::new(
            ActivityClient::http_client().unwrap(),
            &config,
            Zeroizing::new("figd_test_token".to_string()),
        );
        let err = client.get_identity().await.unwrap_err();
        assert!(matches!(err, ApiError::Network { .. }));
        assert!(err.is_recoverable());
        assert!(!err.to_string().contains("figd_test_token"));
    }

    #[tokio::test]
    async fn test_versions_since_query_and_file_meta() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/files/k1/versions"))
            .and(query_param("since", "2024-05-01T10:00:00.000Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "versions": [{"id": "v1", "created_at": "2024-05-01T11:00:00Z", "label": null}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/v1/files/k1/meta"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "file": {"name": "Home", "last_touched_at": "2024-05-01T11:00:00Z"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let since = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let versions = client.list_file_versions("k1", Some(since)).await.unwrap();
        assert_eq!(versions.versions.len(), 1);

        let meta = client.get_file_meta("k1").await.unwrap();
        assert_eq!(meta.last_touched_at.as_deref(), Some("2024-05-01T11:00:00Z"));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(path("/v1/me"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;
        let err = client_for(&server).get_identity().await.unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
        assert!(!err.is_recoverable());
    }
}
