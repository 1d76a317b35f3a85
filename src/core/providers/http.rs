//! Request plumbing shared by the vendor adapters.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::core::chat_stream::format_api_error;
use crate::core::error::ChatError;
use crate::core::providers::{AuthMode, ProviderSession};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Join a base URL and an endpoint without doubling slashes.
pub fn endpoint_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Add the vendor's authentication headers.
///
/// Bearer-mode vendors without a credential are sent unauthenticated.
pub fn apply_auth(
    request: reqwest::RequestBuilder,
    session: &ProviderSession,
) -> reqwest::RequestBuilder {
    match (session.kind.auth_mode(), session.credential()) {
        (AuthMode::Anthropic, credential) => request
            .header("x-api-key", credential.unwrap_or_default())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("anthropic-dangerous-direct-browser-access", "true"),
        (AuthMode::Bearer, Some(credential)) => {
            request.header("Authorization", format!("Bearer {credential}"))
        }
        (AuthMode::Bearer, None) => request,
    }
}

/// Send a request, mapping timeouts, transport failures and non-2xx
/// statuses into [`ChatError`].
///
/// The deadline covers both the send and, for rejected requests, reading the
/// error body.
pub async fn send_checked(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<reqwest::Response, ChatError> {
    match tokio::time::timeout(timeout, send_and_check(request, timeout)).await {
        Err(_) => Err(ChatError::Timeout(timeout)),
        Ok(result) => result,
    }
}

async fn send_and_check(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<reqwest::Response, ChatError> {
    let response = match request.send().await {
        Err(err) if err.is_timeout() => return Err(ChatError::Timeout(timeout)),
        Err(err) => return Err(ChatError::network(None, err.to_string())),
        Ok(response) => response,
    };

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    debug!(status = status.as_u16(), "request rejected by provider");
    Err(ChatError::network(
        Some(status.as_u16()),
        format_api_error(&error_text),
    ))
}

/// Read and decode a JSON body under the same timeout.
pub async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    timeout: Duration,
) -> Result<T, ChatError> {
    let body = match tokio::time::timeout(timeout, response.text()).await {
        Err(_) => return Err(ChatError::Timeout(timeout)),
        Ok(Err(err)) => return Err(ChatError::network(None, err.to_string())),
        Ok(Ok(body)) => body,
    };
    serde_json::from_str(&body)
        .map_err(|err| ChatError::ProtocolParse(format!("unexpected response body: {err}")))
}
