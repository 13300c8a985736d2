use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue};
use rpc402_core::{
    facilitator::{
        Facilitator, SettleRequest, SettleResponse, SupportedResponse, VerifyRequest,
        VerifyResponse,
    },
    transport::PaymentFailure,
};
use serde::de::DeserializeOwned;
use url::Url;

/// Default bound on every call to a remote facilitator but `/settle`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on `/settle`. Longer than the facilitator's own
/// [`DEFAULT_SETTLE_TIMEOUT`](crate::config::DEFAULT_SETTLE_TIMEOUT), so the
/// facilitator reports a confirmation timeout before the client gives up.
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(90);

/// A remote facilitator client that communicates over HTTP.
///
/// Talks to `GET /supported`, `POST /verify` and `POST /settle` below `base_url`.
/// `/settle` is bounded by `settle_timeout`, every other request by `timeout`.
#[derive(Debug, Clone)]
pub struct RemoteFacilitatorClient {
    pub base_url: Url,
    pub client: reqwest::Client,
    pub headers: HeaderMap,
    pub timeout: Duration,
    pub settle_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteFacilitatorClientError {
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
    #[error("HTTP request error: {0}")]
    HttpRequestError(#[from] reqwest::Error),
    #[error("Serialization/Deserialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("Facilitator responded {status}: {message}")]
    Status {
        status: http::StatusCode,
        message: String,
    },
}

impl RemoteFacilitatorClient {
    pub fn from_url(base_url: Url) -> Self {
        RemoteFacilitatorClient {
            base_url,
            client: reqwest::Client::new(),
            headers: HeaderMap::new(),
            timeout: DEFAULT_TIMEOUT,
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
        }
    }

    pub fn header(mut self, key: &HeaderName, value: &HeaderValue) -> Self {
        self.headers.insert(key, value.to_owned());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn settle_timeout(mut self, timeout: Duration) -> Self {
        self.settle_timeout = timeout;
        self
    }

    async fn read<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RemoteFacilitatorClientError> {
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let message = match serde_json::from_slice::<PaymentFailure>(&body) {
                Ok(PaymentFailure {
                    error,
                    details: Some(details),
                }) => format!("{error}: {details}"),
                Ok(PaymentFailure { error, .. }) => error,
                Err(_) => String::from_utf8_lossy(&body).into_owned(),
            };
            return Err(RemoteFacilitatorClientError::Status { status, message });
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

impl Facilitator for RemoteFacilitatorClient {
    type Error = RemoteFacilitatorClientError;

    async fn supported(&self) -> Result<SupportedResponse, Self::Error> {
        let response = self
            .client
            .get(self.base_url.join("supported")?)
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .send()
            .await?;

        Self::read(response).await
    }

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, Self::Error> {
        let response = self
            .client
            .post(self.base_url.join("verify")?)
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .json(request)
            .send()
            .await?;

        Self::read(response).await
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, Self::Error> {
        let response = self
            .client
            .post(self.base_url.join("settle")?)
            .headers(self.headers.clone())
            .timeout(self.settle_timeout)
            .json(request)
            .send()
            .await?;

        Self::read(response).await
    }
}
