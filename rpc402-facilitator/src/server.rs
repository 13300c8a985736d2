//! HTTP surface of the settlement authority.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use http::StatusCode;
use rpc402_core::{
    facilitator::{Facilitator, VerifyRequest},
    transport::{PaymentFailure, PaymentPayload, PaymentRequirements},
    types::{AnyJson, Network, unix_millis},
};
use serde_json::json;

/// Shared state of the facilitator routes.
#[derive(Debug)]
pub struct ServerState<F> {
    pub facilitator: F,
    pub network: Network,
    pub solana_rpc_url: String,
}

/// A failed facilitator call, rendered as `{error, details}`.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub body: PaymentFailure,
}

impl ErrorResponse {
    fn new(status: StatusCode, error: &str, details: Option<String>) -> Self {
        ErrorResponse {
            status,
            body: PaymentFailure {
                error: error.to_string(),
                details,
            },
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn router<F>(state: Arc<ServerState<F>>) -> Router
where
    F: Facilitator + Send + Sync + 'static,
{
    Router::new()
        .route("/supported", get(supported::<F>))
        .route("/verify", post(verify::<F>))
        .route("/settle", post(settle::<F>))
        .route("/health", get(health::<F>))
        .with_state(state)
}

/// Split a `{payment, requirements}` body, rejecting it when either half is absent.
fn parse_request(mut body: AnyJson) -> Result<VerifyRequest, ErrorResponse> {
    let missing = || {
        ErrorResponse::new(
            StatusCode::BAD_REQUEST,
            "Missing payment or requirements",
            None,
        )
    };
    let payment = body.get_mut("payment").map(AnyJson::take);
    let requirements = body.get_mut("requirements").map(AnyJson::take);

    match (payment, requirements) {
        (Some(payment), Some(requirements)) if !payment.is_null() && !requirements.is_null() => {
            let malformed = |err: serde_json::Error| {
                ErrorResponse::new(
                    StatusCode::BAD_REQUEST,
                    "Malformed payment or requirements",
                    Some(err.to_string()),
                )
            };
            Ok(VerifyRequest {
                payment: serde_json::from_value::<PaymentPayload>(payment).map_err(malformed)?,
                requirements: serde_json::from_value::<PaymentRequirements>(requirements)
                    .map_err(malformed)?,
            })
        }
        _ => Err(missing()),
    }
}

async fn supported<F: Facilitator>(State(state): State<Arc<ServerState<F>>>) -> Response {
    match state.facilitator.supported().await {
        Ok(supported) => Json(supported).into_response(),
        Err(err) => ErrorResponse::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Supported lookup failed",
            Some(err.to_string()),
        )
        .into_response(),
    }
}

async fn verify<F: Facilitator>(
    State(state): State<Arc<ServerState<F>>>,
    Json(body): Json<AnyJson>,
) -> Result<Response, ErrorResponse> {
    let request = parse_request(body)?;

    match state.facilitator.verify(&request).await {
        Ok(response) => Ok(Json(response).into_response()),
        Err(err) => {
            #[cfg(feature = "tracing")]
            tracing::error!(invoice_id = %request.payment.invoice_id, %err, "Verification failed");
            Err(ErrorResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed",
                Some(err.to_string()),
            ))
        }
    }
}

async fn settle<F: Facilitator>(
    State(state): State<Arc<ServerState<F>>>,
    Json(body): Json<AnyJson>,
) -> Result<Response, ErrorResponse> {
    let request = parse_request(body)?;

    match state.facilitator.settle(&request).await {
        Ok(response) => Ok(Json(response).into_response()),
        Err(err) => {
            #[cfg(feature = "tracing")]
            tracing::error!(invoice_id = %request.payment.invoice_id, %err, "Settlement failed");
            Err(ErrorResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Settlement failed",
                Some(err.to_string()),
            ))
        }
    }
}

async fn health<F>(State(state): State<Arc<ServerState<F>>>) -> Json<AnyJson> {
    Json(json!({
        "status": "ok",
        "timestamp": unix_millis(),
        "network": state.network,
        "solanaRpcUrl": state.solana_rpc_url,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::Request;
    use http_body_util::BodyExt;
    use rpc402_core::facilitator::{SettleResponse, SupportedResponse, VerifyResponse};
    use tower::ServiceExt;

    use super::*;
    use crate::stub::StubFacilitator;

    #[derive(Debug, thiserror::Error)]
    #[error("node unreachable")]
    struct Unreachable;

    /// Verifies nothing and fails every settlement.
    struct BrokenFacilitator;

    impl Facilitator for BrokenFacilitator {
        type Error = Unreachable;

        async fn supported(&self) -> Result<SupportedResponse, Self::Error> {
            Err(Unreachable)
        }

        async fn verify(&self, _request: &VerifyRequest) -> Result<VerifyResponse, Self::Error> {
            Ok(VerifyResponse::invalid("Not a token transfer instruction"))
        }

        async fn settle(&self, _request: &VerifyRequest) -> Result<SettleResponse, Self::Error> {
            Err(Unreachable)
        }
    }

    fn app<F: Facilitator + Send + Sync + 'static>(facilitator: F) -> Router {
        router(Arc::new(ServerState {
            facilitator,
            network: Network::Devnet,
            solana_rpc_url: "https://api.devnet.solana.com".to_string(),
        }))
    }

    fn valid_body() -> AnyJson {
        json!({
            "payment": {
                "version": 1,
                "network": "devnet",
                "transaction": "AAAA",
                "invoiceId": "inv-1"
            },
            "requirements": {
                "version": 1,
                "recipient": "62pyPYsdSLah2vDSeenEep2R2hP9jz98eDbnz4Zyb1Lf",
                "amount": "20",
                "currency": "USDC",
                "network": "devnet",
                "invoiceId": "inv-1"
            }
        })
    }

    async fn post(app: Router, path: &str, body: AnyJson) -> (StatusCode, AnyJson) {
        let response = app
            .oneshot(
                Request::post(path)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn verify_requires_both_halves() {
        let (status, body) = post(
            app(StubFacilitator::default()),
            "/verify",
            json!({ "payment": valid_body()["payment"] }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing payment or requirements");
    }

    #[tokio::test]
    async fn verify_passes_through_invalid_verdicts() {
        let (status, body) = post(app(BrokenFacilitator), "/verify", valid_body()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isValid"], false);
        assert_eq!(body["error"], "Not a token transfer instruction");
    }

    #[tokio::test]
    async fn settle_failure_is_a_server_error_with_details() {
        let (status, body) = post(app(BrokenFacilitator), "/settle", valid_body()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({ "error": "Settlement failed", "details": "node unreachable" })
        );
    }

    #[tokio::test]
    async fn stub_settles() {
        let (status, body) = post(app(StubFacilitator::default()), "/settle", valid_body()).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["signature"].as_str().is_some_and(|s| !s.is_empty()));
    }

    #[tokio::test]
    async fn health_and_supported() {
        let response = app(StubFacilitator::default())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: AnyJson = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["network"], "devnet");

        let response = app(StubFacilitator::default())
            .oneshot(Request::get("/supported").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: AnyJson = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["scheme"], json!(["exact"]));
    }
}
