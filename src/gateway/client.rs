use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::errors::GatewayError;

/// Header carrying the tenant id on every bridge request. The same value is
/// duplicated as `userId` in the JSON body — the external service reads both.
pub const TENANT_HEADER: &str = "X-User-ID";

/// One call initiation, addressed to a single prospect.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub tenant_id: String,
    pub phone_number: String,
    pub prospect_name: String,
    pub prompt_id: String,
}

/// The bridge's synchronous answer. `success` means the request was accepted
/// for dialing; it says nothing about whether the call completed.
#[derive(Debug, Clone)]
pub struct CallAcceptance {
    pub success: bool,
    /// Upstream HTTP status, preserved so the local API can relay it.
    pub status: u16,
    pub message: Option<String>,
    /// The response body as relayed to callers: the upstream body with a
    /// `success` flag folded in (an explicit `success: false` from the
    /// bridge is kept as-is).
    pub body: Value,
}

impl CallAcceptance {
    fn from_upstream(status: u16, upstream: Value) -> Self {
        if (200..300).contains(&status) {
            let success = upstream.get("success") != Some(&Value::Bool(false));
            let message = upstream
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string);
            let body = match upstream {
                Value::Object(mut map) => {
                    map.entry("success").or_insert(Value::Bool(success));
                    Value::Object(map)
                }
                other => json!({ "success": success, "result": other }),
            };
            Self {
                success,
                status,
                message,
                body,
            }
        } else {
            let message = upstream
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Call service rejected the request")
                .to_string();
            let body = json!({
                "success": false,
                "message": message,
                "details": upstream,
            });
            Self {
                success: false,
                status,
                message: Some(message),
                body,
            }
        }
    }
}

/// The seam between the sequencer and the outside world. Production uses
/// [`HttpCallGateway`]; tests substitute scripted implementations.
#[async_trait]
pub trait CallGateway: Send + Sync {
    async fn start_call(&self, request: &CallRequest) -> Result<CallAcceptance, GatewayError>;
}

/// Thin POST wrapper around `{base}/api/start-call`.
///
/// No retry and no circuit breaking; the configured timeout is the only
/// bound on a hung upstream call.
pub struct HttpCallGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCallGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/start-call", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CallGateway for HttpCallGateway {
    async fn start_call(&self, request: &CallRequest) -> Result<CallAcceptance, GatewayError> {
        let payload = json!({
            "phoneNumber": request.phone_number,
            "prospectName": request.prospect_name,
            "promptId": request.prompt_id,
            "userId": request.tenant_id,
        });

        let response = self
            .client
            .post(self.endpoint())
            .header(TENANT_HEADER, &request.tenant_id)
            .json(&payload)
            .send()
            .await
            .map_err(GatewayError::Transport)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(GatewayError::Transport)?;
        let upstream: Value =
            serde_json::from_str(&text).map_err(|_| GatewayError::UpstreamBody {
                status,
                snippet: snippet(&text),
            })?;

        Ok(CallAcceptance::from_upstream(status, upstream))
    }
}

/// Truncate a non-JSON upstream body for error reporting.
fn snippet(text: &str) -> String {
    text.chars().take(200).collect()
}
