//! HTTP client for the control plane REST API.

use std::time::Duration;

use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use labrun_core::RunId;

use crate::error::ClientError;
use crate::types::{
    ErrorReply, RunDetail, RunStatusView, RunSummary, StartRunBody, StartRunReply,
};

/// HTTP client for the labrun control plane.
#[derive(Clone)]
pub struct LabrunClient {
    inner: reqwest::Client,
    base_url: String,
}

impl LabrunClient {
    /// Create a new client.
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Check if the control plane is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let url = self.url(["health"])?;
        debug!(url = %url, "Checking health");

        let response = self.inner.get(url).send().await?;
        Ok(response.status().is_success())
    }

    /// Start a run and return its id.
    pub async fn start_run(&self, body: &StartRunBody) -> Result<RunId, ClientError> {
        let url = self.url(["runs"])?;
        debug!(url = %url, model = %body.model, experiment = %body.experiment, "Starting run");

        let response = self.inner.post(url).json(body).send().await?;
        let reply: StartRunReply = decode(check(response).await?).await?;
        Ok(reply.run_id)
    }

    /// Reconciled status of a run.
    pub async fn status(&self, run_id: RunId) -> Result<RunStatusView, ClientError> {
        let id = run_id.to_string();
        decode(self.get(self.url(["runs", id.as_str(), "status"])?).await?).await
    }

    /// All runs, most recent first.
    pub async fn list_runs(&self) -> Result<Vec<RunSummary>, ClientError> {
        self.get_json("/runs").await
    }

    /// Run detail with its output files.
    pub async fn get_run(&self, run_id: RunId) -> Result<RunDetail, ClientError> {
        let id = run_id.to_string();
        decode(self.get(self.url(["runs", id.as_str()])?).await?).await
    }

    /// Contents of a run's log (`stdout` or `stderr`).
    pub async fn log(&self, run_id: RunId, stream: &str) -> Result<String, ClientError> {
        let id = run_id.to_string();
        let mut url = self.url(["runs", id.as_str(), "log"])?;
        url.query_pairs_mut().append_pair("stream", stream);
        let response = self.get(url).await?;
        Ok(response.text().await?)
    }

    /// Raw contents of a result file.
    ///
    /// The name is sent as a single escaped path segment.
    pub async fn fetch(&self, run_id: RunId, file_name: &str) -> Result<Vec<u8>, ClientError> {
        let id = run_id.to_string();
        let url = self.url(["runs", id.as_str(), "results", file_name])?;
        let response = self.get(url).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Wait until a run is terminal.
    ///
    /// Uses the server's long-poll endpoint; each request is held open for
    /// up to `poll_timeout` (at least one second).
    pub async fn wait(
        &self,
        run_id: RunId,
        poll_timeout: Duration,
    ) -> Result<RunStatusView, ClientError> {
        let id = run_id.to_string();
        let timeout_secs = poll_timeout.as_secs().max(1).to_string();
        loop {
            let mut url = self.url(["runs", id.as_str(), "wait"])?;
            url.query_pairs_mut().append_pair("timeoutSecs", &timeout_secs);

            let status: RunStatusView = decode(self.get(url).await?).await?;
            if status.status.is_terminal() {
                return Ok(status);
            }
            debug!(run_id = %run_id, status = %status.status, "Run still active");
        }
    }

    /// Get JSON from an endpoint given as a `/`-separated path.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.url(path.split('/').filter(|s| !s.is_empty()))?;
        decode(self.get(url).await?).await
    }

    /// Base URL with `segments` appended, each percent-encoded on its own.
    fn url<I>(&self, segments: I) -> Result<Url, ClientError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Response, ClientError> {
        debug!(url = %url, "GET request");

        let response = self.inner.get(url).send().await?;
        check(response).await
    }
}

/// Turn a non-success reply into a [`ClientError`].
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(response.url().path().to_string()));
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorReply>(&text)
        .map(|reply| reply.error)
        .unwrap_or(text);
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    response
        .json()
        .await
        .map_err(|e| ClientError::Serialization(e.to_string()))
}
