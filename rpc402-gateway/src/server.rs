//! HTTP surface of the gateway.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use rpc402_core::{
    facilitator::Facilitator,
    jsonrpc::JsonRpcResponse,
    receipt::{Receipt, UsageStats},
    transport::{PAYMENT_HEADER, PAYMENT_RESPONSE_HEADER, RANGE_TOKEN_HEADER},
    types::{AnyJson, unix_millis},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    errors::GateRejection,
    gate::{GateCall, PaymentGate},
    range::{PurchaseRangeRequest, RangePricing, RangeToken},
    receipts::DEFAULT_RECENT_LIMIT,
};

pub fn router<F>(gate: Arc<PaymentGate<F>>) -> Router
where
    F: Facilitator + Send + Sync + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(PAYMENT_RESPONSE_HEADER)]);

    Router::new()
        .route("/rpc", post(rpc::<F>))
        .route("/purchase-range", post(purchase_range::<F>))
        .route("/ranges", get(ranges::<F>))
        .route("/receipts", get(receipts::<F>))
        .route("/stats", get(stats::<F>))
        .route("/health", get(health::<F>))
        .layer(cors)
        .with_state(gate)
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn rpc<F>(
    State(gate): State<Arc<PaymentGate<F>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    F: Facilitator + Send + Sync + 'static,
{
    let request = serde_json::from_slice::<AnyJson>(&body)
        .ok()
        .and_then(crate::proxy::validate);
    let Some(request) = request else {
        return (
            StatusCode::BAD_REQUEST,
            Json(JsonRpcResponse::invalid_request()),
        )
            .into_response();
    };

    let id = request.id.clone();
    let call = GateCall {
        request,
        payment: header(&headers, PAYMENT_HEADER),
        range_token: header(&headers, RANGE_TOKEN_HEADER),
        endpoint: "/rpc".to_string(),
        payload_size: body.len(),
    };

    match gate.handle(call).await {
        Ok(outcome) => {
            let payment = outcome
                .payment_response()
                .and_then(|payment| serde_json::to_string(payment).ok())
                .and_then(|json| HeaderValue::from_str(&json).ok());

            let mut response = Json(outcome.response).into_response();
            if let Some(value) = payment {
                response.headers_mut().insert(PAYMENT_RESPONSE_HEADER, value);
            }
            response
        }
        Err(GateRejection::Internal) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(JsonRpcResponse::internal_error(Some(id))),
        )
            .into_response(),
        Err(rejection) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(%rejection, "Call rejected");
            rejection.into_response()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSpan {
    pub start_slot: u64,
    pub end_slot: u64,
    pub block_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeAccess {
    /// Milliseconds since the unix epoch
    pub expires_at: u64,
    /// Seconds
    pub duration: u64,
}

/// Body of a successful `POST /purchase-range`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangePurchaseResponse {
    pub success: bool,
    pub token: String,
    pub range: SlotSpan,
    pub pricing: RangePricing,
    pub access: RangeAccess,
}

fn range_failure(error: impl std::fmt::Display) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": error.to_string() })),
    )
        .into_response()
}

async fn purchase_range<F>(
    State(gate): State<Arc<PaymentGate<F>>>,
    Json(body): Json<AnyJson>,
) -> Response
where
    F: Facilitator + Send + Sync + 'static,
{
    let request = match serde_json::from_value::<PurchaseRangeRequest>(body) {
        Ok(request) => request,
        Err(err) => return range_failure(err),
    };
    let duration = request.duration;

    match gate.ranges().purchase(request) {
        Ok(purchase) => Json(RangePurchaseResponse {
            success: true,
            token: purchase.token,
            range: SlotSpan {
                start_slot: purchase.claims.start_slot,
                end_slot: purchase.claims.end_slot,
                block_count: purchase.claims.end_slot - purchase.claims.start_slot + 1,
            },
            pricing: purchase.pricing,
            access: RangeAccess {
                expires_at: purchase.claims.expires_at,
                duration,
            },
        })
        .into_response(),
        Err(err) => range_failure(err),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RangesQuery {
    pub payer: String,
}

/// Body of `GET /ranges`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRanges {
    pub payer: String,
    pub ranges: Vec<RangeToken>,
}

async fn ranges<F>(
    State(gate): State<Arc<PaymentGate<F>>>,
    Query(query): Query<RangesQuery>,
) -> Json<ActiveRanges>
where
    F: Facilitator + Send + Sync + 'static,
{
    let ranges = gate.ranges().active_ranges(&query.payer);
    Json(ActiveRanges {
        payer: query.payer,
        ranges,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptsQuery {
    pub limit: Option<String>,
}

async fn receipts<F>(
    State(gate): State<Arc<PaymentGate<F>>>,
    Query(query): Query<ReceiptsQuery>,
) -> Json<Vec<Receipt>>
where
    F: Facilitator + Send + Sync + 'static,
{
    let limit = query
        .limit
        .and_then(|limit| limit.parse::<usize>().ok())
        .filter(|limit| *limit > 0)
        .unwrap_or(DEFAULT_RECENT_LIMIT);
    Json(gate.ledger().get_recent(limit))
}

async fn stats<F>(State(gate): State<Arc<PaymentGate<F>>>) -> Json<UsageStats>
where
    F: Facilitator + Send + Sync + 'static,
{
    Json(gate.ledger().get_stats())
}

async fn health<F>(State(gate): State<Arc<PaymentGate<F>>>) -> Json<AnyJson>
where
    F: Facilitator + Send + Sync + 'static,
{
    Json(json!({
        "status": "ok",
        "timestamp": unix_millis(),
        "upstreamUrl": gate.proxy().url().as_str(),
        "network": gate.network(),
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use http::Request;
    use http_body_util::BodyExt;
    use rpc402_facilitator::stub::StubFacilitator;
    use tower::ServiceExt;
    use url::Url;

    use super::*;
    use crate::{proxy::UpstreamProxy, range::RangeAuthority};

    fn app() -> Router {
        let proxy = UpstreamProxy::new(Url::parse("http://127.0.0.1:9/").unwrap())
            .timeout(Duration::from_secs(2));
        router(Arc::new(
            PaymentGate::builder()
                .facilitator(StubFacilitator::default())
                .ranges(Arc::new(RangeAuthority::new("secret")))
                .proxy(Arc::new(proxy))
                .recipient("recipient-wallet")
                .token_account("recipient-token-account")
                .mint("mint")
                .build(),
        ))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, AnyJson) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post(path: &str, body: impl Into<Body>) -> Request<Body> {
        Request::post(path)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    #[tokio::test]
    async fn invalid_envelopes_are_rejected() {
        for body in ["not json", r#"{"jsonrpc":"1.0","id":1,"method":"getBlock"}"#] {
            let (status, body) = send(app(), post("/rpc", body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(
                body,
                json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": { "code": -32600, "message": "Invalid JSON-RPC request" }
                })
            );
        }
    }

    #[tokio::test]
    async fn priced_calls_get_a_challenge() {
        let (status, body) = send(
            app(),
            post(
                "/rpc",
                r#"{"jsonrpc":"2.0","id":1,"method":"getBlock","params":[430]}"#,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["error"], "Payment Required");
        assert_eq!(body["method"], "getBlock");
        assert_eq!(body["payment"]["amount"], "50");
        assert_eq!(body["payment"]["currency"], "USDC");
        assert!(body["payment"]["invoiceId"].as_str().is_some());
    }

    #[tokio::test]
    async fn malformed_payment_header_is_a_bad_request() {
        let request = Request::post("/rpc")
            .header("content-type", "application/json")
            .header(PAYMENT_HEADER, "not-base64!")
            .body(Body::from(
                r#"{"jsonrpc":"2.0","id":1,"method":"getBlock","params":[430]}"#,
            ))
            .unwrap();
        let (status, body) = send(app(), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid X-PAYMENT header: failed to parse");
    }

    #[tokio::test]
    async fn range_purchase() {
        let (status, body) = send(
            app(),
            post(
                "/purchase-range",
                json!({
                    "startSlot": 100,
                    "endSlot": 200,
                    "duration": 3600,
                    "paymentTxSignature": "5sig",
                    "payer": "wallet"
                })
                .to_string(),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["range"]["blockCount"], 101);
        assert_eq!(body["pricing"]["currency"], "USDC");
        assert_eq!(body["access"]["duration"], 3600);
        assert!(body["token"].as_str().is_some_and(|t| t.contains('.')));
    }

    #[tokio::test]
    async fn active_ranges_are_listed_per_payer() {
        let app = app();
        for payer in ["wallet", "wallet", "other"] {
            let (status, _) = send(
                app.clone(),
                post(
                    "/purchase-range",
                    json!({
                        "startSlot": 100,
                        "endSlot": if payer == "other" { 300 } else { 200 },
                        "duration": 3600,
                        "paymentTxSignature": "5sig",
                        "payer": payer
                    })
                    .to_string(),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = send(
            app.clone(),
            Request::get("/ranges?payer=wallet").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["payer"], "wallet");
        // Same range bought twice is one entry.
        assert_eq!(body["ranges"].as_array().unwrap().len(), 1);
        assert_eq!(body["ranges"][0]["rangeId"], "100-200-wallet");

        let (_, body) = send(
            app.clone(),
            Request::get("/ranges?payer=nobody").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(body["ranges"], json!([]));

        let response = app
            .oneshot(Request::get("/ranges").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_range_purchase_is_rejected() {
        let (status, body) = send(
            app(),
            post(
                "/purchase-range",
                json!({
                    "startSlot": 0,
                    "endSlot": 10_001,
                    "duration": 60,
                    "paymentTxSignature": "5sig",
                    "payer": "wallet"
                })
                .to_string(),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Range too large"));
    }

    #[tokio::test]
    async fn dashboard_endpoints() {
        let (status, body) = send(app(), Request::get("/receipts?limit=abc").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let (_, body) = send(app(), Request::get("/stats").body(Body::empty()).unwrap()).await;
        assert_eq!(body["totalRequests"], 0);
        assert_eq!(body["failureRate"], 0.0);

        let (_, body) = send(app(), Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["network"], "devnet");
        assert_eq!(body["upstreamUrl"], "http://127.0.0.1:9/");
    }
}
