//! HTTP client for the remote sync service.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tokio::time::timeout;

use super::error::SyncError;
use super::protocol::{
    ChangesResponse, ChangesUpload, RecordsUpload, RemoteChange, TableSnapshot, VersionsResponse,
};
use super::version::SemVer;
use crate::config::SyncSettings;

/// Thin typed wrapper over the remote endpoints. Every request carries the
/// configured timeout; the health probe uses the shorter probe timeout.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    server_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
    probe_timeout: Duration,
}

impl RemoteClient {
    pub fn new(
        server_url: impl Into<String>,
        api_key: Option<String>,
        settings: &SyncSettings,
    ) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| SyncError::Connectivity(e.to_string()))?;

        Ok(Self {
            server_url: server_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            http,
            probe_timeout: settings.probe_timeout(),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn build_http_url(&self, path: &str) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.build_http_url(path));
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }

    fn table_path(prefix: &str, table: &str) -> String {
        format!("{}/{}", prefix, urlencoding::encode(table))
    }

    async fn send(builder: RequestBuilder, what: &str) -> Result<Response, SyncError> {
        let response = builder.send().await.map_err(SyncError::from_http)?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            Ok(response)
        } else {
            Err(SyncError::Protocol(format!(
                "{} returned status {}",
                what, status
            )))
        }
    }

    /// `GET /health`, bounded by the probe timeout.
    pub async fn check_health(&self) -> Result<(), SyncError> {
        let request = self
            .request(Method::GET, "/health")
            .timeout(self.probe_timeout)
            .send();

        let response = timeout(self.probe_timeout, request)
            .await
            .map_err(|_| SyncError::Connectivity("health check timed out".to_string()))?
            .map_err(|e| SyncError::Connectivity(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SyncError::Connectivity(format!(
                "health check returned status {}",
                response.status()
            )))
        }
    }

    pub async fn fetch_versions(&self) -> Result<BTreeMap<String, SemVer>, SyncError> {
        let response = Self::send(self.request(Method::GET, "/versions"), "GET /versions").await?;
        let body: VersionsResponse = response.json().await.map_err(SyncError::from_http)?;
        Ok(body.versions)
    }

    /// Downloads a whole table. `None` means the server reported the local
    /// version as current.
    pub async fn download_table(
        &self,
        table: &str,
        local_version: &SemVer,
    ) -> Result<Option<TableSnapshot>, SyncError> {
        let path = Self::table_path("/data", table);
        let builder = self
            .request(Method::GET, &path)
            .header("If-Modified-Since", local_version.to_string());
        let response = Self::send(builder, &format!("GET {}", path)).await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(None);
        }
        let snapshot = response.json().await.map_err(SyncError::from_http)?;
        Ok(Some(snapshot))
    }

    pub async fn upload_records(
        &self,
        table: &str,
        records: Vec<serde_json::Value>,
    ) -> Result<(), SyncError> {
        let path = Self::table_path("/data", table);
        let builder = self
            .request(Method::POST, &path)
            .json(&RecordsUpload { records });
        Self::send(builder, &format!("POST {}", path)).await?;
        Ok(())
    }

    /// Remote changes since `since`, or all of them when there is no cursor.
    pub async fn fetch_changes(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteChange>, SyncError> {
        let mut builder = self.request(Method::GET, "/sync/changes");
        if let Some(since) = since {
            builder = builder.header("If-Modified-Since", since.to_rfc3339());
        }
        let response = Self::send(builder, "GET /sync/changes").await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(Vec::new());
        }
        let body: ChangesResponse = response.json().await.map_err(SyncError::from_http)?;
        Ok(body.changes)
    }

    pub async fn upload_changes(
        &self,
        table: &str,
        changes: Vec<RemoteChange>,
    ) -> Result<(), SyncError> {
        let path = Self::table_path("/sync/changes", table);
        let builder = self
            .request(Method::POST, &path)
            .json(&ChangesUpload { changes });
        Self::send(builder, &format!("POST {}", path)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> RemoteClient {
        RemoteClient::new(url, Some(String::new()), &SyncSettings::default()).unwrap()
    }

    #[test]
    fn test_build_http_url() {
        assert_eq!(
            client("http://localhost:8080/").build_http_url("/versions"),
            "http://localhost:8080/versions"
        );
    }

    #[test]
    fn test_table_path_is_encoded() {
        assert_eq!(
            RemoteClient::table_path("/data", "my table"),
            "/data/my%20table"
        );
    }

    #[test]
    fn test_empty_api_key_is_dropped() {
        assert!(client("http://localhost").api_key.is_none());
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        // Port 9 (discard) is closed on test machines.
        let settings = SyncSettings {
            probe_timeout_secs: 1,
            ..SyncSettings::default()
        };
        let client = RemoteClient::new("http://127.0.0.1:9", None, &settings).unwrap();
        assert!(matches!(
            client.check_health().await,
            Err(SyncError::Connectivity(_))
        ));
    }
}
