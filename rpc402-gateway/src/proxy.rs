use std::time::Duration;

use rpc402_core::{
    jsonrpc::{INTERNAL_ERROR, JsonRpcRequest, JsonRpcResponse},
    types::AnyJson,
};
use serde_json::json;
use url::Url;

use crate::range::SlotResolver;

/// Default bound on one upstream call.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);

/// Forwards authorized calls to the upstream JSON-RPC provider.
///
/// Never fails: transport problems and upstream errors come back as JSON-RPC error
/// envelopes carrying the request's id.
#[derive(Debug, Clone)]
pub struct UpstreamProxy {
    client: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl UpstreamProxy {
    pub fn new(url: Url) -> Self {
        UpstreamProxy {
            client: reqwest::Client::new(),
            url,
            timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn forward(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        #[cfg(feature = "tracing")]
        let started = std::time::Instant::now();

        let id = Some(request.id.clone());
        let sent = self
            .client
            .post(self.url.clone())
            .timeout(self.timeout)
            .json(request)
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(method = %request.method, %err, "Upstream request failed");
                return JsonRpcResponse::error(id, INTERNAL_ERROR, err.to_string(), None);
            }
        };

        let status = response.status();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => return JsonRpcResponse::error(id, INTERNAL_ERROR, err.to_string(), None),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            method = %request.method,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Upstream responded"
        );

        if !status.is_success() {
            let data = serde_json::from_slice::<AnyJson>(&body)
                .unwrap_or_else(|_| json!(String::from_utf8_lossy(&body)));
            return JsonRpcResponse::error(
                id,
                status.as_u16() as i64,
                format!("Request failed with status code {}", status.as_u16()),
                Some(data),
            );
        }

        serde_json::from_slice(&body).unwrap_or_else(|err| {
            JsonRpcResponse::error(
                id,
                INTERNAL_ERROR,
                "Internal error",
                Some(json!(err.to_string())),
            )
        })
    }
}

/// Validate an untyped body as a JSON-RPC 2.0 request.
pub fn validate(body: AnyJson) -> Option<JsonRpcRequest> {
    JsonRpcRequest::from_value(body)
}

impl SlotResolver for UpstreamProxy {
    /// Looks the transaction up with `getTransaction` and reads its `slot`.
    async fn slot_of(&self, signature: &str) -> Option<u64> {
        let request = JsonRpcRequest::new(
            "slot-lookup",
            "getTransaction",
            Some(json!([
                signature,
                { "encoding": "json", "maxSupportedTransactionVersion": 0 }
            ])),
        );
        self.forward(&request)
            .await
            .result?
            .get("slot")?
            .as_u64()
    }
}
