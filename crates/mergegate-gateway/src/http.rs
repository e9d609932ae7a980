//! HTTP implementations of the dependency clients.
//!
//! Response classification is shared: 429 maps to a rate limit with any
//! Retry-After hint, 401/403 to unauthorized, 404 to not-found, other 4xx
//! to definitive, and 5xx/network errors to transient.

use async_trait::async_trait;
use serde::Deserialize;

use mergegate_core::{ChangeRef, CheckerVerdict};

use crate::clients::{
    CheckRequest, CheckerClient, CodeHostClient, StatusCheck, TicketClient, TicketCreate,
};
use crate::error::{GatewayError, GatewayResult};

fn network_error(dependency: &str, err: reqwest::Error) -> GatewayError {
    GatewayError::Transient {
        dependency: dependency.to_string(),
        detail: err.to_string(),
    }
}

async fn classify_response(
    dependency: &str,
    response: reqwest::Response,
) -> GatewayResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_ms = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(|secs| secs * 1000);
    let detail = format!("HTTP {}", status.as_u16());

    Err(match status.as_u16() {
        429 => GatewayError::RateLimited {
            dependency: dependency.to_string(),
            retry_after_ms,
        },
        401 | 403 => GatewayError::Unauthorized {
            dependency: dependency.to_string(),
            detail,
        },
        404 => GatewayError::NotFound {
            dependency: dependency.to_string(),
            detail,
        },
        400..=499 => GatewayError::Definitive {
            dependency: dependency.to_string(),
            detail,
        },
        _ => GatewayError::Transient {
            dependency: dependency.to_string(),
            detail,
        },
    })
}

fn build_client(token: Option<&str>) -> GatewayResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().user_agent(concat!(
        "mergegate/",
        env!("CARGO_PKG_VERSION")
    ));
    if let Some(token) = token {
        let mut headers = reqwest::header::HeaderMap::new();
        let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| GatewayError::Definitive {
                dependency: "client".into(),
                detail: format!("invalid auth token: {e}"),
            })?;
        headers.insert(reqwest::header::AUTHORIZATION, value);
        builder = builder.default_headers(headers);
    }
    builder.build().map_err(|e| GatewayError::Definitive {
        dependency: "client".into(),
        detail: format!("failed to build HTTP client: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Checker
// ---------------------------------------------------------------------------

/// HTTP checker client. POSTs the check request to the checker endpoint and
/// expects a `CheckerVerdict` JSON body.
pub struct HttpCheckerClient {
    name: String,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpCheckerClient {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        token: Option<&str>,
    ) -> GatewayResult<Self> {
        Ok(Self {
            name: name.into(),
            endpoint: endpoint.into(),
            client: build_client(token)?,
        })
    }
}

#[async_trait]
impl CheckerClient for HttpCheckerClient {
    async fn run_check(&self, request: &CheckRequest) -> GatewayResult<CheckerVerdict> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| network_error(&self.name, e))?;
        let response = classify_response(&self.name, response).await?;
        response
            .json::<CheckerVerdict>()
            .await
            .map_err(|e| GatewayError::Definitive {
                dependency: self.name.clone(),
                detail: format!("malformed verdict: {e}"),
            })
    }
}

// ---------------------------------------------------------------------------
// Code host
// ---------------------------------------------------------------------------

/// HTTP code-host client.
pub struct HttpCodeHostClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCodeHostClient {
    pub const DEPENDENCY: &'static str = "code_host";

    pub fn new(base_url: impl Into<String>, token: Option<&str>) -> GatewayResult<Self> {
        Ok(Self {
            base_url: base_url.into(),
            client: build_client(token)?,
        })
    }

    fn change_url(&self, change: &ChangeRef, tail: &str) -> String {
        format!(
            "{}/repos/{}/changes/{}/{}",
            self.base_url, change.repository, change.change_id, tail
        )
    }
}

#[async_trait]
impl CodeHostClient for HttpCodeHostClient {
    async fn post_status(&self, change: &ChangeRef, status: &StatusCheck) -> GatewayResult<()> {
        let url = self.change_url(change, &format!("revisions/{}/status", change.head_revision));
        let response = self
            .client
            .post(url)
            .json(status)
            .send()
            .await
            .map_err(|e| network_error(Self::DEPENDENCY, e))?;
        classify_response(Self::DEPENDENCY, response).await?;
        Ok(())
    }

    async fn post_comment(&self, change: &ChangeRef, body: &str) -> GatewayResult<()> {
        let url = self.change_url(change, "comments");
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await
            .map_err(|e| network_error(Self::DEPENDENCY, e))?;
        classify_response(Self::DEPENDENCY, response).await?;
        Ok(())
    }

    async fn request_merge(&self, change: &ChangeRef) -> GatewayResult<()> {
        let url = self.change_url(change, "merge");
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "revision": change.head_revision }))
            .send()
            .await
            .map_err(|e| network_error(Self::DEPENDENCY, e))?;
        classify_response(Self::DEPENDENCY, response).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ticketing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreatedTicket {
    key: String,
}

#[derive(Debug, Deserialize)]
struct AccountHit {
    account_id: String,
}

/// HTTP ticketing client.
pub struct HttpTicketClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTicketClient {
    pub const DEPENDENCY: &'static str = "ticketing";

    pub fn new(base_url: impl Into<String>, token: Option<&str>) -> GatewayResult<Self> {
        Ok(Self {
            base_url: base_url.into(),
            client: build_client(token)?,
        })
    }
}

#[async_trait]
impl TicketClient for HttpTicketClient {
    async fn create(&self, request: &TicketCreate) -> GatewayResult<String> {
        let url = format!("{}/issues", self.base_url);
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| network_error(Self::DEPENDENCY, e))?;
        let response = classify_response(Self::DEPENDENCY, response).await?;
        let created: CreatedTicket =
            response.json().await.map_err(|e| GatewayError::Definitive {
                dependency: Self::DEPENDENCY.into(),
                detail: format!("malformed create response: {e}"),
            })?;
        Ok(created.key)
    }

    async fn link(&self, ticket_key: &str, external_ref: &str) -> GatewayResult<()> {
        let url = format!("{}/issues/{}/links", self.base_url, ticket_key);
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "external_ref": external_ref }))
            .send()
            .await
            .map_err(|e| network_error(Self::DEPENDENCY, e))?;
        classify_response(Self::DEPENDENCY, response).await?;
        Ok(())
    }

    async fn comment(&self, ticket_key: &str, body: &str) -> GatewayResult<()> {
        let url = format!("{}/issues/{}/comments", self.base_url, ticket_key);
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await
            .map_err(|e| network_error(Self::DEPENDENCY, e))?;
        classify_response(Self::DEPENDENCY, response).await?;
        Ok(())
    }

    async fn search_account(&self, identifier: &str) -> GatewayResult<Option<String>> {
        let url = format!("{}/accounts", self.base_url);
        let response = self
            .client
            .get(url)
            .query(&[("identifier", identifier)])
            .send()
            .await
            .map_err(|e| network_error(Self::DEPENDENCY, e))?;

        match classify_response(Self::DEPENDENCY, response).await {
            Ok(response) => {
                let hit: AccountHit =
                    response.json().await.map_err(|e| GatewayError::Definitive {
                        dependency: Self::DEPENDENCY.into(),
                        detail: format!("malformed account response: {e}"),
                    })?;
                Ok(Some(hit.account_id))
            }
            // An unknown identifier is a miss, not an error.
            Err(GatewayError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
