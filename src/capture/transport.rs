//! HTTP boundary to the street view capture pipeline.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info};

use crate::cache::freshness::CachedState;
use crate::config::ClientConfig;
use crate::error::CaptureError;
use crate::models::{CacheMetadata, CacheStats, CaptureEnvelope, CaptureRequest, FreshnessHint};

/// One call per method against the capture service; no retries here.
#[async_trait]
pub trait CaptureTransport: Send + Sync {
    /// `POST /analytics/streetview/capture`
    async fn capture(&self, request: &CaptureRequest) -> Result<CaptureEnvelope, CaptureError>;

    /// `GET /analytics/streetview/check/{projectId}`
    async fn check(&self, project_id: &str) -> Result<FreshnessHint, CaptureError>;

    /// `GET /analytics/streetview/metadata/{projectId}`; 404 is `Absent`.
    async fn metadata(&self, project_id: &str) -> Result<CachedState, CaptureError>;

    /// `DELETE /analytics/streetview/cache/{projectId}`
    async fn clear(&self, project_id: &str) -> Result<bool, CaptureError>;

    /// `GET /analytics/streetview/cache/stats[?companyId=]`
    async fn stats(&self, company_id: Option<&str>) -> Result<CacheStats, CaptureError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Deserialize)]
struct ClearResponse {
    #[serde(default)]
    success: Option<bool>,
}

impl HttpTransport {
    /// `config.base_url` should be like `http://localhost:3000/api`.
    pub fn new(config: &ClientConfig) -> Result<Self, CaptureError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| CaptureError::Endpoint(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(CaptureError::Endpoint(config.base_url.clone()));
        }
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        info!("Initializing capture transport with endpoint: {}", base_url);
        Ok(Self { client, base_url })
    }

    /// Endpoint under `/analytics/streetview/`. Each segment is
    /// percent-encoded, so ids cannot add path, query or fragment parts.
    fn url(&self, segments: &[&str]) -> Result<Url, CaptureError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CaptureError::Endpoint(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["analytics", "streetview"])
            .extend(segments);
        Ok(url)
    }
}

/// Turn a non-2xx response into `CaptureError::Server`.
async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, CaptureError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(CaptureError::Server {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl CaptureTransport for HttpTransport {
    async fn capture(&self, request: &CaptureRequest) -> Result<CaptureEnvelope, CaptureError> {
        let url = self.url(&["capture"])?;
        debug!(url = %url, project_id = %request.project_id, "posting capture request");
        let resp = self.client.post(url).json(request).send().await?;
        let resp = ensure_success(resp).await?;
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn check(&self, project_id: &str) -> Result<FreshnessHint, CaptureError> {
        let url = self.url(&["check", project_id])?;
        let resp = ensure_success(self.client.get(url).send().await?).await?;
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn metadata(&self, project_id: &str) -> Result<CachedState, CaptureError> {
        let url = self.url(&["metadata", project_id])?;
        let resp = self.client.get(url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!("No cached metadata for project {}", project_id);
            return Ok(CachedState::Absent);
        }
        let resp = ensure_success(resp).await?;
        let body = resp.bytes().await?;
        let metadata: CacheMetadata = serde_json::from_slice(&body)?;
        Ok(CachedState::Present(metadata))
    }

    async fn clear(&self, project_id: &str) -> Result<bool, CaptureError> {
        let url = self.url(&["cache", project_id])?;
        let resp = ensure_success(self.client.delete(url).send().await?).await?;
        let body = resp.bytes().await?;
        // Some deployments answer 204 with no body.
        let cleared = serde_json::from_slice::<ClearResponse>(&body)
            .ok()
            .and_then(|r| r.success)
            .unwrap_or(true);
        Ok(cleared)
    }

    async fn stats(&self, company_id: Option<&str>) -> Result<CacheStats, CaptureError> {
        let url = self.url(&["cache", "stats"])?;
        let mut req = self.client.get(url);
        if let Some(company_id) = company_id {
            req = req.query(&[("companyId", company_id)]);
        }
        let resp = ensure_success(req.send().await?).await?;
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_endpoint_urls() {
        let config = ClientConfig {
            base_url: "http://capture.local/api/".into(),
            ..ClientConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(
            transport.url(&["capture"]).unwrap().as_str(),
            "http://capture.local/api/analytics/streetview/capture"
        );
        assert_eq!(
            transport.url(&["metadata", "p-1"]).unwrap().as_str(),
            "http://capture.local/api/analytics/streetview/metadata/p-1"
        );
    }

    #[test]
    fn project_ids_stay_inside_their_path_segment() {
        let transport = HttpTransport::new(&ClientConfig {
            base_url: "http://capture.local/api".into(),
            ..ClientConfig::default()
        })
        .unwrap();

        let url = transport.url(&["metadata", "p1#x"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://capture.local/api/analytics/streetview/metadata/p1%23x"
        );
        assert_eq!(url.fragment(), None);

        let url = transport.url(&["cache", "p1?all=1 %"]).unwrap();
        assert_eq!(url.query(), None);
        assert_eq!(url.path_segments().unwrap().last(), Some("p1%3Fall=1%20%25"));
    }

    #[test]
    fn rejects_unusable_base_url() {
        let config = ClientConfig {
            base_url: "mailto:capture@example.com".into(),
            ..ClientConfig::default()
        };
        assert!(matches!(
            HttpTransport::new(&config),
            Err(CaptureError::Endpoint(_))
        ));
    }
}
