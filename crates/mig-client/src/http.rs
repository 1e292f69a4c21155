// crates/mig-client/src/http.rs
// ============================================================================
// Module: HTTP Transport
// Description: reqwest-backed implementation of the MIG API.
// Purpose: Submit actions and retrieve records over HTTP(S).
// Dependencies: reqwest, serde_json, url, mig-config
// ============================================================================

//! ## Overview
//! [`HttpMigApi`] talks to the MIG API with a single reqwest client that
//! never follows redirects and enforces the configured timeout. Response
//! bodies are read incrementally and rejected once they exceed the configured
//! size limit. Actions are submitted as a form field `action=<json>` to
//! `action/create/`, which must answer `202 Accepted`.
//!
//! Security posture: API responses are untrusted; sizes are bounded and every
//! record is decoded into a typed value before use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use mig_auth::Investigator;
use mig_config::ApiConfig;
use mig_core::Action;
use mig_core::ActionId;
use mig_core::Command;
use mig_core::CommandId;
use mig_core::InvestigatorId;
use mig_core::format_instant;
use reqwest::Client;
use reqwest::RequestBuilder;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use reqwest::redirect::Policy;
use tracing::debug;
use url::Url;
use url::form_urlencoded;

use crate::Authenticator;
use crate::ClientError;
use crate::CommandSearch;
use crate::MigApi;
use crate::collection::ApiError;
use crate::collection::Resource;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Content type of action submissions.
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Longest error body excerpt kept in protocol errors.
const MAX_BODY_PREVIEW: usize = 256;

// ============================================================================
// SECTION: Client
// ============================================================================

/// HTTP client for the MIG API.
///
/// # Invariants
/// - `base_url` ends with `/` so endpoint paths join beneath it.
#[derive(Debug, Clone)]
pub struct HttpMigApi {
    /// API root.
    base_url: Url,
    /// HTTP client configured with the timeout and redirect policy.
    client: Client,
    /// Maximum response body size.
    max_response_bytes: usize,
}

impl HttpMigApi {
    /// Builds a client from API settings.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] when the URL is missing or invalid
    /// or the HTTP client cannot be built.
    pub fn from_config(config: &ApiConfig) -> Result<Self, ClientError> {
        let base_url = config.base_url().map_err(|err| ClientError::Transport(err.to_string()))?;
        let client = Client::builder()
            .timeout(config.timeout())
            .redirect(Policy::none())
            .build()
            .map_err(|err| ClientError::Transport(format!("failed to build http client: {err}")))?;
        Ok(Self::with_client(base_url, client, config.max_response_bytes))
    }

    /// Wraps an existing reqwest client.
    #[must_use]
    pub fn with_client(mut base_url: Url, client: Client, max_response_bytes: usize) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            base_url,
            client,
            max_response_bytes,
        }
    }

    /// Returns the API root.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves an endpoint path beneath the API root.
    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ClientError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|err| ClientError::Transport(format!("invalid endpoint {path}: {err}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Attaches the authentication header to a request.
    fn authorize(
        request: RequestBuilder,
        auth: &dyn Authenticator,
    ) -> Result<RequestBuilder, ClientError> {
        let header = auth.authenticate()?;
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|err| ClientError::Transport(format!("invalid auth header name: {err}")))?;
        let value = HeaderValue::from_str(&header.value)
            .map_err(|err| ClientError::Transport(format!("invalid auth header value: {err}")))?;
        Ok(request.header(name, value))
    }

    /// Sends a request and returns the status and decoded document.
    async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, Resource), ClientError> {
        let mut response = request
            .send()
            .await
            .map_err(|err| ClientError::Transport(format!("http request failed: {err}")))?;
        let status = response.status();
        let body = self.read_body_with_limit(&mut response).await?;
        match serde_json::from_slice::<Resource>(&body) {
            Ok(resource) => Ok((status, resource)),
            Err(_) if !status.is_success() => {
                let mut resource = Resource::default();
                resource.collection.error = Some(ApiError {
                    code: String::new(),
                    message: body_preview(&body),
                });
                Ok((status, resource))
            }
            Err(err) => Err(ClientError::Protocol(format!(
                "http status {status} with undecodable body ({err}): {}",
                body_preview(&body)
            ))),
        }
    }

    /// Issues an authenticated GET and returns the document on `200 OK`.
    async fn get_resource(
        &self,
        path: &str,
        query: &[(&str, String)],
        auth: &dyn Authenticator,
    ) -> Result<Resource, ClientError> {
        let url = self.endpoint(path, query)?;
        debug!(url = %url, "fetching api resource");
        let request = Self::authorize(self.client.get(url), auth)?;
        let (status, resource) = self.send(request).await?;
        if status != StatusCode::OK {
            if resource.is_no_results() {
                return Err(ClientError::NoResults);
            }
            return Err(ClientError::Http {
                status: status.as_u16(),
                code: resource.error_code().to_string(),
                message: resource.error_message().to_string(),
            });
        }
        Ok(resource)
    }

    /// Reads the response body, enforcing the size limit.
    async fn read_body_with_limit(&self, response: &mut Response) -> Result<Vec<u8>, ClientError> {
        let too_large = ClientError::ResponseTooLarge {
            limit: self.max_response_bytes,
        };
        let limit = u64::try_from(self.max_response_bytes)
            .map_err(|_| ClientError::Internal("response size limit out of range".to_string()))?;
        if let Some(length) = response.content_length()
            && length > limit
        {
            return Err(too_large);
        }
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| ClientError::Transport(format!("failed to read response body: {err}")))?
        {
            let next_len = body.len().checked_add(chunk.len()).ok_or_else(|| too_large.clone())?;
            if next_len > self.max_response_bytes {
                return Err(too_large);
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl MigApi for HttpMigApi {
    async fn post_action(
        &self,
        action: &Action,
        auth: &dyn Authenticator,
    ) -> Result<Action, ClientError> {
        let encoded = serde_json::to_string(action)
            .map_err(|err| ClientError::Internal(format!("failed to encode action: {err}")))?;
        let form = form_urlencoded::Serializer::new(String::new())
            .append_pair("action", &encoded)
            .finish();
        let url = self.endpoint("action/create/", &[])?;
        debug!(url = %url, action = %action.name, "submitting action");
        let request = self.client.post(url).header(CONTENT_TYPE, FORM_CONTENT_TYPE).body(form);
        let request = Self::authorize(request, auth)?;
        let (status, resource) = self.send(request).await?;
        if status != StatusCode::ACCEPTED {
            return Err(ClientError::DispatchRejected {
                status: status.as_u16(),
                code: resource.error_code().to_string(),
                message: resource.error_message().to_string(),
            });
        }
        resource.first_record("action")
    }

    async fn get_action(
        &self,
        id: ActionId,
        auth: &dyn Authenticator,
    ) -> Result<Action, ClientError> {
        let resource = self.get_resource("action", &[("actionid", id.to_string())], auth).await?;
        resource.first_record("action")
    }

    async fn get_command(
        &self,
        id: CommandId,
        auth: &dyn Authenticator,
    ) -> Result<Command, ClientError> {
        let resource = self.get_resource("command", &[("commandid", id.to_string())], auth).await?;
        resource.first_record("command")
    }

    async fn get_investigator(
        &self,
        id: InvestigatorId,
        auth: &dyn Authenticator,
    ) -> Result<Investigator, ClientError> {
        let resource =
            self.get_resource("investigator", &[("investigatorid", id.to_string())], auth).await?;
        resource.first_record("investigator")
    }

    async fn search_commands(
        &self,
        search: &CommandSearch,
        auth: &dyn Authenticator,
    ) -> Result<Vec<Command>, ClientError> {
        let resource = self.get_resource("search", &search_query(search), auth).await?;
        resource.records("command")
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the query parameters of a command search.
fn search_query(search: &CommandSearch) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("type", "command".to_string()),
        ("limit", search.limit.to_string()),
        ("offset", search.offset.to_string()),
        ("actionid", search.action_id.to_string()),
    ];
    if let Some(found) = search.found_anything {
        query.push(("foundanything", found.to_string()));
    }
    if let Some(status) = search.status {
        query.push(("status", status.as_str().to_string()));
    }
    if let Some(after) = search.after {
        query.push(("after", format_instant(after)));
    }
    if let Some(before) = search.before {
        query.push(("before", format_instant(before)));
    }
    query
}

/// Returns a printable excerpt of a response body.
fn body_preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    text.chars().take(MAX_BODY_PREVIEW).collect()
}
