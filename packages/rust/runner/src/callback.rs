//! Status callback delivery.
//!
//! One authenticated `PATCH {status_url}/{job_id}` per job. Delivery is a
//! single attempt; the caller decides what a lost callback means.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};

use geoasset_shared::{GeoAssetError, JobId, Result, StatusUpdate};

/// User-Agent string for callback requests.
const USER_AGENT: &str = concat!("geoasset/", env!("CARGO_PKG_VERSION"));

/// Client for the job status endpoint.
#[derive(Debug, Clone)]
pub struct CallbackClient {
    client: Client,
    status_url: String,
    token: String,
}

impl CallbackClient {
    pub fn new(status_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| GeoAssetError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            status_url: status_url.into(),
            token: token.into(),
        })
    }

    /// Endpoint for one job.
    pub fn job_url(&self, job_id: &JobId) -> String {
        format!("{}/{}", self.status_url.trim_end_matches('/'), job_id)
    }

    /// Deliver `update` for `job_id`. Non-2xx responses are errors.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn send(&self, job_id: &JobId, update: &StatusUpdate) -> Result<()> {
        let url = self.job_url(job_id);
        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.token)
            .json(update)
            .send()
            .await
            .map_err(|e| GeoAssetError::Network(format!("PATCH {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeoAssetError::Network(format!(
                "PATCH {url} returned {status}"
            )));
        }

        debug!(%status, "status callback delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoasset_shared::{ChangeLog, ChangeLogStatus};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn update() -> StatusUpdate {
        StatusUpdate::single(ChangeLog {
            date_time: chrono::Utc::now(),
            status: ChangeLogStatus::Success,
            message: "Successfully ran echo hi".into(),
            detail: String::new(),
        })
    }

    #[test]
    fn job_url_joins_without_double_slash() {
        let client = CallbackClient::new("http://api/jobs/", "t", Duration::from_secs(1)).unwrap();
        assert_eq!(client.job_url(&JobId::from("abc")), "http://api/jobs/abc");
    }

    #[tokio::test]
    async fn patches_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/jobs/job-1"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = CallbackClient::new(
            format!("{}/jobs", server.uri()),
            "secret-token",
            Duration::from_secs(5),
        )
        .unwrap();
        client.send(&JobId::from("job-1"), &update()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["change_log"][0]["status"], "success");
        assert_eq!(body["change_log"][0]["detail"], "");
    }

    #[tokio::test]
    async fn server_error_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = CallbackClient::new(server.uri(), "t", Duration::from_secs(5)).unwrap();
        let err = client.send(&JobId::from("j"), &update()).await.unwrap_err();
        assert!(matches!(err, GeoAssetError::Network(_)));
        assert!(err.to_string().contains("503"));
    }
}
