//! REST client for the edge network API
//!
//! Resources live under `/edges/tls` and `/backends/tunnel_group`; list
//! responses are paged through `next_page_uri`.

use super::{ApiError, BackendParams, EdgeApi, RemoteBackend, RemoteTlsEdge, TlsEdgeParams};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpEdgeApi {
    base_url: String,
    http: HttpClient,
    api_key: Option<String>,
}

impl HttpEdgeApi {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ApiError> {
        let http = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Request(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn with_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response, ApiError> {
        let response = self
            .with_auth(builder)
            .send()
            .await
            .map_err(|e| ApiError::Request(format!("{}: {}", what, e)))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, what, &body))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T, ApiError> {
        self.send(builder, what)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::Request(format!("{}: invalid response: {}", what, e)))
    }

    async fn empty(&self, builder: RequestBuilder, what: &str) -> Result<(), ApiError> {
        self.send(builder, what).await.map(|_| ())
    }
}

/// 404 maps to `NotFound`; every other failure is a request error carrying
/// the server's message
fn status_error(status: StatusCode, what: &str, body: &str) -> ApiError {
    if status == StatusCode::NOT_FOUND {
        return ApiError::NotFound(what.to_string());
    }
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v["msg"]
                .as_str()
                .or_else(|| v["message"].as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string());
    ApiError::Request(format!("{}: status {}: {}", what, status.as_u16(), message))
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct TlsEdgeList {
    #[serde(default)]
    tls_edges: Vec<WireTlsEdge>,
    next_page_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireTlsEdge {
    id: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    hostports: Vec<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    metadata: String,
    backend: Option<WireEdgeBackend>,
}

#[derive(Debug, Deserialize)]
struct WireEdgeBackend {
    backend: WireRef,
}

#[derive(Debug, Deserialize)]
struct WireRef {
    id: String,
}

impl From<WireTlsEdge> for RemoteTlsEdge {
    fn from(edge: WireTlsEdge) -> Self {
        RemoteTlsEdge {
            id: edge.id,
            uri: edge.uri,
            hostports: edge.hostports,
            backend_id: edge
                .backend
                .map(|b| b.backend.id)
                .filter(|id| !id.is_empty()),
            description: edge.description,
            metadata: edge.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
struct TlsEdgeBody<'a> {
    hostports: &'a [String],
    description: &'a str,
    metadata: &'a str,
    backend: BackendRefBody<'a>,
}

#[derive(Debug, Serialize)]
struct BackendRefBody<'a> {
    backend_id: &'a str,
}

impl<'a> From<&'a TlsEdgeParams> for TlsEdgeBody<'a> {
    fn from(params: &'a TlsEdgeParams) -> Self {
        TlsEdgeBody {
            hostports: &params.hostports,
            description: &params.description,
            metadata: &params.metadata,
            backend: BackendRefBody {
                backend_id: &params.backend_id,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireBackend {
    id: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    metadata: String,
}

impl From<WireBackend> for RemoteBackend {
    fn from(backend: WireBackend) -> Self {
        RemoteBackend {
            id: backend.id,
            labels: backend.labels,
            description: backend.description,
            metadata: backend.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
struct IpRestrictionBody<'a> {
    ip_policy_ids: &'a [String],
}

// =============================================================================
// EdgeApi
// =============================================================================

#[async_trait]
impl EdgeApi for HttpEdgeApi {
    async fn list_tls_edges(&self) -> Result<Vec<RemoteTlsEdge>, ApiError> {
        let mut edges = Vec::new();
        let mut next = Some(self.url("edges/tls"));
        while let Some(url) = next {
            let page: TlsEdgeList = self.fetch(self.http.get(&url), "list tls edges").await?;
            edges.extend(page.tls_edges.into_iter().map(RemoteTlsEdge::from));
            next = page.next_page_uri.filter(|u| !u.is_empty());
        }
        debug!("Listed {} remote TLS edges", edges.len());
        Ok(edges)
    }

    async fn get_tls_edge(&self, id: &str) -> Result<RemoteTlsEdge, ApiError> {
        let url = self.url(&format!("edges/tls/{}", id));
        let edge: WireTlsEdge = self.fetch(self.http.get(url), id).await?;
        Ok(edge.into())
    }

    async fn create_tls_edge(&self, params: &TlsEdgeParams) -> Result<RemoteTlsEdge, ApiError> {
        let request = self
            .http
            .post(self.url("edges/tls"))
            .json(&TlsEdgeBody::from(params));
        let edge: WireTlsEdge = self.fetch(request, "create tls edge").await?;
        Ok(edge.into())
    }

    async fn update_tls_edge(
        &self,
        id: &str,
        params: &TlsEdgeParams,
    ) -> Result<RemoteTlsEdge, ApiError> {
        let request = self
            .http
            .patch(self.url(&format!("edges/tls/{}", id)))
            .json(&TlsEdgeBody::from(params));
        let edge: WireTlsEdge = self.fetch(request, id).await?;
        Ok(edge.into())
    }

    async fn delete_tls_edge(&self, id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("edges/tls/{}", id));
        self.empty(self.http.delete(url), id).await
    }

    async fn get_backend(&self, id: &str) -> Result<RemoteBackend, ApiError> {
        let url = self.url(&format!("backends/tunnel_group/{}", id));
        let backend: WireBackend = self.fetch(self.http.get(url), id).await?;
        Ok(backend.into())
    }

    async fn create_backend(&self, params: &BackendParams) -> Result<RemoteBackend, ApiError> {
        let request = self
            .http
            .post(self.url("backends/tunnel_group"))
            .json(&backend_body(params));
        let backend: WireBackend = self.fetch(request, "create tunnel group backend").await?;
        Ok(backend.into())
    }

    async fn update_backend(
        &self,
        id: &str,
        params: &BackendParams,
    ) -> Result<RemoteBackend, ApiError> {
        let request = self
            .http
            .patch(self.url(&format!("backends/tunnel_group/{}", id)))
            .json(&backend_body(params));
        let backend: WireBackend = self.fetch(request, id).await?;
        Ok(backend.into())
    }

    async fn replace_ip_restriction(
        &self,
        edge_id: &str,
        policy_ids: &[String],
    ) -> Result<(), ApiError> {
        let request = self
            .http
            .put(self.url(&format!("edges/tls/{}/ip_restriction", edge_id)))
            .json(&IpRestrictionBody {
                ip_policy_ids: policy_ids,
            });
        self.empty(request, edge_id).await
    }

    async fn delete_ip_restriction(&self, edge_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("edges/tls/{}/ip_restriction", edge_id));
        match self.empty(self.http.delete(url), edge_id).await {
            Err(ApiError::NotFound(_)) => Ok(()),
            other => other,
        }
    }
}

fn backend_body(params: &BackendParams) -> serde_json::Value {
    serde_json::json!({
        "labels": params.labels,
        "description": params.description,
        "metadata": params.metadata,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_joins_without_double_slash() {
        let api = HttpEdgeApi::new("https://api.edge.example.com/", None).unwrap();
        assert_eq!(
            api.url("/edges/tls/edghts_1"),
            "https://api.edge.example.com/edges/tls/edghts_1"
        );
        assert_eq!(
            api.url("backends/tunnel_group"),
            "https://api.edge.example.com/backends/tunnel_group"
        );
    }

    #[test]
    fn test_status_error_mapping() {
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, "edghts_1", ""),
            ApiError::NotFound("edghts_1".to_string())
        );

        let err = status_error(
            StatusCode::BAD_REQUEST,
            "create tls edge",
            r#"{"error_code": "ERR_400", "msg": "hostport already in use"}"#,
        );
        assert_eq!(
            err,
            ApiError::Request("create tls edge: status 400: hostport already in use".to_string())
        );

        let err = status_error(StatusCode::BAD_GATEWAY, "edghts_1", "upstream down");
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("upstream down"));
    }

    #[test]
    fn test_tls_edge_from_wire() {
        let page: TlsEdgeList = serde_json::from_value(json!({
            "tls_edges": [
                {
                    "id": "edghts_1",
                    "uri": "/edges/tls/edghts_1",
                    "hostports": ["db.example.com:443"],
                    "backend": {"enabled": true, "backend": {"id": "bkdtg_1", "uri": "/backends/tunnel_group/bkdtg_1"}}
                },
                {"id": "edghts_2", "hostports": []}
            ],
            "next_page_uri": null
        }))
        .unwrap();

        let edges: Vec<RemoteTlsEdge> = page.tls_edges.into_iter().map(Into::into).collect();
        assert_eq!(edges[0].backend_id.as_deref(), Some("bkdtg_1"));
        assert_eq!(edges[0].hostports, vec!["db.example.com:443"]);
        assert_eq!(edges[1].backend_id, None);
        assert!(page.next_page_uri.is_none());
    }

    #[test]
    fn test_request_bodies() {
        let params = TlsEdgeParams {
            hostports: vec!["db.example.com:443".to_string()],
            backend_id: "bkdtg_1".to_string(),
            description: "db".to_string(),
            metadata: "{}".to_string(),
        };
        assert_eq!(
            serde_json::to_value(TlsEdgeBody::from(&params)).unwrap(),
            json!({
                "hostports": ["db.example.com:443"],
                "description": "db",
                "metadata": "{}",
                "backend": {"backend_id": "bkdtg_1"}
            })
        );

        let ids = vec!["ipp_1".to_string()];
        assert_eq!(
            serde_json::to_value(IpRestrictionBody {
                ip_policy_ids: &ids
            })
            .unwrap(),
            json!({"ip_policy_ids": ["ipp_1"]})
        );
    }
}
