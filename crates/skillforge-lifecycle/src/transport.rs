//! Shared JSON-over-HTTP plumbing for the service clients.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, Result};

const USER_AGENT: &str = concat!("skillforge/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client used by the service clients.
pub(crate) fn build_client(config: &LifecycleConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| LifecycleError::Config(format!("failed to build HTTP client: {e}")))
}

/// POST `body` as JSON and parse the JSON reply.
///
/// Connection failures map to [`LifecycleError::Transport`], non-2xx
/// statuses to [`LifecycleError::Http`], and unparsable bodies to
/// [`LifecycleError::InvalidJson`].
pub(crate) async fn post_json<B, R>(
    http: &reqwest::Client,
    service: &'static str,
    url: &str,
    body: &B,
) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    debug!(service, url, "POST");

    let response = http
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| LifecycleError::from_reqwest(service, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(LifecycleError::Http {
            service,
            status: status.as_u16(),
        });
    }

    let text = response
        .text()
        .await
        .map_err(|e| LifecycleError::from_reqwest(service, e))?;

    serde_json::from_str(&text).map_err(|e| LifecycleError::InvalidJson {
        service,
        reason: e.to_string(),
    })
}
