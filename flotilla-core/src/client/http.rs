//! JSON-over-HTTP remote.
//!
//! Resources live at `{endpoint}/v1/{kind}/{name}`; the scope and delete
//! options travel as query parameters. Provider errors are mapped from the
//! HTTP status and an optional `{"code": ..., "message": ...}` body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use super::{ObservedState, Payload, RemoteClient, RemoteHandle};
use crate::descriptor::DeleteOptions;
use crate::error::RemoteError;

/// Error body returned by the remote API.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// [`RemoteClient`] over a REST endpoint.
pub struct HttpClient {
    endpoint: Url,
    http: Client,
}

impl HttpClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| RemoteError::Fatal(format!("invalid endpoint {endpoint}: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(RemoteError::Fatal(format!("invalid endpoint {endpoint}")));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Fatal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { endpoint, http })
    }

    fn resource_url(&self, kind: &str, name: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["v1", kind, name]);
        }
        url
    }

    fn request(&self, method: Method, kind: &str, name: &str, scope: Option<&str>) -> RequestBuilder {
        let url = self.resource_url(kind, name);
        debug!(%method, %url, ?scope, "remote request");
        let builder = self.http.request(method, url);
        match scope {
            Some(scope) => builder.query(&[("scope", scope)]),
            None => builder,
        }
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        RemoteError::Throttled(format!("transport: {e}"))
    } else {
        RemoteError::Fatal(format!("transport: {e}"))
    }
}

/// Map a non-success response onto the error taxonomy.
async fn status_error(response: Response) -> RemoteError {
    let status = response.status();
    let body: ErrorBody = response.json().await.unwrap_or_default();
    let message = body
        .message
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());

    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        StatusCode::CONFLICT if body.code.as_deref() == Some("AlreadyExists") => {
            RemoteError::AlreadyExists(message)
        }
        StatusCode::CONFLICT => RemoteError::Conflict(message),
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => RemoteError::Throttled(message),
        _ => RemoteError::Fatal(format!("{status}: {message}")),
    }
}

#[async_trait]
impl RemoteClient for HttpClient {
    async fn create(
        &self,
        kind: &str,
        name: &str,
        scope: Option<&str>,
        payload: &Payload,
    ) -> Result<RemoteHandle, RemoteError> {
        let response = self
            .request(Method::POST, kind, name, scope)
            .json(payload)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        // Some providers answer with an empty body.
        let handle = response.json::<RemoteHandle>().await.unwrap_or_else(|_| RemoteHandle {
            name: name.to_string(),
            arn: None,
        });
        Ok(handle)
    }

    async fn describe(
        &self,
        kind: &str,
        name: &str,
        scope: Option<&str>,
    ) -> Result<Option<ObservedState>, RemoteError> {
        let response = self
            .request(Method::GET, kind, name, scope)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        response
            .json::<ObservedState>()
            .await
            .map(Some)
            .map_err(|e| RemoteError::Fatal(format!("malformed describe response: {e}")))
    }

    async fn update(
        &self,
        kind: &str,
        name: &str,
        scope: Option<&str>,
        payload: &Payload,
    ) -> Result<(), RemoteError> {
        let response = self
            .request(Method::PATCH, kind, name, scope)
            .json(payload)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }

    async fn delete(
        &self,
        kind: &str,
        name: &str,
        scope: Option<&str>,
        options: &DeleteOptions,
    ) -> Result<(), RemoteError> {
        let mut request = self.request(Method::DELETE, kind, name, scope);
        if let Some(force) = options.force {
            request = request.query(&[("force", force)]);
        }
        let response = request.send().await.map_err(transport_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }
}
