//! Identity gateway client.
//!
//! User accounts live in a separate identity service; this module is the
//! only place that talks to it.  The check fails closed: any transport
//! error, timeout, or non-success status is reported as "user does not
//! exist" so a dead identity service cannot be used to bypass validation.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// How long to wait for the identity service before failing closed.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Lookup seam for the external identity service.
///
/// The friend graph only ever asks one question of it.
pub trait UserDirectory: Send + Sync {
    fn user_exists(&self, username: &str) -> impl Future<Output = bool> + Send;
}

/// HTTP client for the identity service.
///
/// Queries `GET <base_url>/user-exists/<username>`, which answers with a
/// bare JSON boolean.
#[derive(Clone)]
pub struct IdentityGateway {
    client: reqwest::Client,
    base_url: String,
}

impl IdentityGateway {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl UserDirectory for IdentityGateway {
    async fn user_exists(&self, username: &str) -> bool {
        let url = format!("{}/user-exists/{}", self.base_url, username);

        let response = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(user = %username, error = %e, "identity service unreachable, failing closed");
                return false;
            }
        };

        if !response.status().is_success() {
            warn!(
                user = %username,
                status = %response.status(),
                "identity service returned an error, failing closed"
            );
            return false;
        }

        match response.json::<bool>().await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(user = %username, error = %e, "invalid identity service response, failing closed");
                false
            }
        }
    }
}
