//! The payment gate.
//!
//! Every call to `/rpc` goes through [`PaymentGate::handle`]:
//!
//! 1. **Price** the method. Free methods are forwarded at once.
//! 2. **Range token**: a valid token covering the addressed slots forwards the call with
//!    no invoice.
//! 3. **Challenge**: without an `X-PAYMENT` header the caller receives a fresh invoice in a
//!    `402` response.
//! 4. **Verify and settle**: under a per-invoice lock the payment is recorded, verified and
//!    settled by the facilitator. The call is forwarded only after settlement succeeds.
//!
//! Step 4 runs on its own task, so a caller that hangs up cannot abort a settlement
//! that may already be moving funds.

use std::{sync::Arc, time::Instant};

use bon::Builder;
use dashmap::DashMap;
use rpc402_core::{
    facilitator::{Facilitator, VerifyRequest},
    jsonrpc::{JsonRpcRequest, JsonRpcResponse},
    receipt::{Receipt, ReceiptStatus, ReceiptUpdate},
    transport::{PaymentChallenge, PaymentPayload, PaymentRequirements, PaymentResponse},
    types::{Base64EncodedHeader, Network, unix_millis},
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    cache::{ResponseCache, cache_key},
    config::PricingMode,
    errors::GateRejection,
    pricing::{MethodPrice, PricingResolver, usd_to_smallest_unit},
    proxy::UpstreamProxy,
    range::{RangeAuthority, RangeToken, SignatureRangeCheck, is_slot_in_range, is_transaction_in_range},
    receipts::ReceiptLedger,
};

/// Per-invoice mutual exclusion.
#[derive(Debug, Default)]
pub struct InvoiceLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Held while an invoice is being processed. Unused entries are dropped on release.
pub struct InvoiceGuard<'a> {
    locks: &'a InvoiceLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl InvoiceLocks {
    pub async fn acquire(&self, invoice_id: &str) -> InvoiceGuard<'_> {
        let lock = self
            .locks
            .entry(invoice_id.to_string())
            .or_default()
            .clone();
        InvoiceGuard {
            locks: self,
            key: invoice_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for InvoiceGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Where a call addresses the ledger, for matching against range tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotTarget {
    Slot(u64),
    /// Inclusive
    Range(u64, u64),
    Signature(String),
}

impl SlotTarget {
    pub fn of(request: &JsonRpcRequest) -> Option<Self> {
        let slot = |i| request.param(i).and_then(|v| v.as_u64());
        match request.method.as_str() {
            "getBlock" | "getConfirmedBlock" | "getBlockTime" => slot(0).map(SlotTarget::Slot),
            "getBlocks" => {
                let start = slot(0)?;
                let end = slot(1)?;
                Some(SlotTarget::Range(start, end))
            }
            "getBlocksWithLimit" => {
                let start = slot(0)?;
                let limit = slot(1)?;
                Some(SlotTarget::Range(start, start.saturating_add(limit.max(1) - 1)))
            }
            "getTransaction" | "getConfirmedTransaction" => request
                .param(0)?
                .as_str()
                .map(|sig| SlotTarget::Signature(sig.to_string())),
            _ => None,
        }
    }
}

/// One inbound call as seen by the gate.
#[derive(Debug, Clone)]
pub struct GateCall {
    pub request: JsonRpcRequest,
    /// Raw `X-PAYMENT` header
    pub payment: Option<String>,
    /// Raw `X-Range-Token` header
    pub range_token: Option<String>,
    pub endpoint: String,
    /// Size of the request body in bytes
    pub payload_size: usize,
}

/// How a forwarded call was authorized.
#[derive(Debug, Clone, PartialEq)]
pub enum Authorization {
    Free,
    Range(RangeToken),
    Paid(PaymentResponse),
}

/// A call the gate let through, with the upstream response.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub response: JsonRpcResponse,
    pub authorization: Authorization,
}

impl GateOutcome {
    /// Value of `X-PAYMENT-RESPONSE`, present for paid calls.
    pub fn payment_response(&self) -> Option<&PaymentResponse> {
        match &self.authorization {
            Authorization::Paid(payment) => Some(payment),
            _ => None,
        }
    }
}

/// The payment gate.
///
/// Stores are injected; the gate owns only the invoice locks.
#[derive(Builder, Debug)]
pub struct PaymentGate<F> {
    facilitator: F,
    #[builder(default)]
    pricing: PricingResolver,
    #[builder(default)]
    ledger: Arc<ReceiptLedger>,
    ranges: Arc<RangeAuthority>,
    #[builder(default)]
    cache: Arc<ResponseCache>,
    proxy: Arc<UpstreamProxy>,
    #[builder(into)]
    recipient: String,
    /// Token account every payment must credit
    #[builder(into)]
    token_account: String,
    #[builder(into)]
    mint: String,
    #[builder(default)]
    network: Network,
    /// Seconds a caller has to pay an invoice
    #[builder(default = 60)]
    invoice_timeout: u64,
    #[builder(default)]
    pricing_mode: PricingMode,
    #[builder(default)]
    signature_range_check: SignatureRangeCheck,
    #[builder(skip)]
    locks: InvoiceLocks,
}

impl<F> PaymentGate<F>
where
    F: Facilitator + Send + Sync + 'static,
{
    pub fn ledger(&self) -> &Arc<ReceiptLedger> {
        &self.ledger
    }

    pub fn ranges(&self) -> &Arc<RangeAuthority> {
        &self.ranges
    }

    pub fn proxy(&self) -> &Arc<UpstreamProxy> {
        &self.proxy
    }

    pub fn pricing(&self) -> &PricingResolver {
        &self.pricing
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Run a call through the gate and forward it if it is authorized.
    pub async fn handle(self: Arc<Self>, call: GateCall) -> Result<GateOutcome, GateRejection> {
        let price = self.pricing.price_of(&call.request.method);

        if !price.requires_payment {
            let response = self.proxy.forward(&call.request).await;
            return Ok(GateOutcome {
                response,
                authorization: Authorization::Free,
            });
        }

        if let Some(claims) = self.range_authorization(&call).await {
            #[cfg(feature = "tracing")]
            tracing::debug!(method = %call.request.method, range_id = %claims.range_id, "Covered by range token");
            let response = self.proxy.forward(&call.request).await;
            return Ok(GateOutcome {
                response,
                authorization: Authorization::Range(claims),
            });
        }

        let Some(header) = call.payment.clone() else {
            return Err(self.challenge(&call.request, &price).await);
        };

        let payload = PaymentPayload::try_from(Base64EncodedHeader(header))
            .map_err(|_| GateRejection::MalformedPayment)?;

        let gate = self.clone();
        tokio::spawn(async move { gate.process_payment(call, price, payload).await })
            .await
            .map_err(|_err| {
                #[cfg(feature = "tracing")]
                tracing::error!(err = %_err, "Payment task aborted");
                GateRejection::Internal
            })?
    }

    async fn range_authorization(&self, call: &GateCall) -> Option<RangeToken> {
        let claims = self.ranges.validate(call.range_token.as_deref()?)?;

        let covered = match SlotTarget::of(&call.request)? {
            SlotTarget::Slot(slot) => is_slot_in_range(slot, &claims),
            SlotTarget::Range(start, end) => {
                start <= end && is_slot_in_range(start, &claims) && is_slot_in_range(end, &claims)
            }
            SlotTarget::Signature(signature) => {
                is_transaction_in_range(
                    &signature,
                    &claims,
                    self.signature_range_check,
                    self.proxy.as_ref(),
                )
                .await
            }
        };
        covered.then_some(claims)
    }

    /// Invoice terms, built from configuration only.
    fn requirements(
        &self,
        invoice_id: &str,
        price_usd: f64,
        timeout: Option<u64>,
    ) -> PaymentRequirements {
        PaymentRequirements::builder()
            .recipient(self.recipient.clone())
            .token_account(self.token_account.clone())
            .mint(self.mint.clone())
            .amount(usd_to_smallest_unit(price_usd))
            .network(self.network)
            .invoice_id(invoice_id)
            .maybe_timeout(timeout)
            .build()
    }

    async fn challenge(&self, request: &JsonRpcRequest, price: &MethodPrice) -> GateRejection {
        let invoice_id = Uuid::new_v4().to_string();

        let price_usd = match self.pricing_mode {
            PricingMode::Flat => price.price_usd,
            PricingMode::Bandwidth => {
                let response = self.proxy.forward(request).await;
                let size = self.cache.put(cache_key(&invoice_id), request, response);
                self.pricing.dynamic_price(&request.method, size)
            }
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(method = %request.method, %invoice_id, price_usd, "Issuing invoice");

        GateRejection::PaymentRequired(Box::new(PaymentChallenge {
            error: "Payment Required".to_string(),
            message: format!("This endpoint requires payment: {price_usd} USDC"),
            method: request.method.clone(),
            payment: self.requirements(&invoice_id, price_usd, Some(self.invoice_timeout)),
        }))
    }

    /// Price the payment of a bandwidth-priced invoice, reusing the quoted response when
    /// it answers this very request.
    async fn bandwidth_quote(
        &self,
        request: &JsonRpcRequest,
        invoice_id: &str,
    ) -> (f64, JsonRpcResponse) {
        let key = cache_key(invoice_id);
        let (size, mut response) = match self.cache.get(&key) {
            Some(cached) if cached.answers(request) => (cached.size_bytes, cached.response),
            _cached => {
                #[cfg(feature = "tracing")]
                if _cached.is_some() {
                    tracing::debug!(
                        %invoice_id,
                        method = %request.method,
                        "Quoted response answers another request, fetching again"
                    );
                }
                let response = self.proxy.forward(request).await;
                let size = self.cache.put(key, request, response.clone());
                (size, response)
            }
        };
        response.id = Some(request.id.clone());
        (self.pricing.dynamic_price(&request.method, size), response)
    }

    fn fail(&self, receipt: &Receipt, reason: &str, started: Instant) {
        let update = ReceiptUpdate::builder()
            .status(ReceiptStatus::Failed)
            .error(reason)
            .latency_ms(started.elapsed().as_millis() as u64)
            .build();
        if let Err(_err) = self.ledger.update(&receipt.id, update) {
            #[cfg(feature = "tracing")]
            tracing::error!(receipt_id = %receipt.id, err = %_err, "Could not record failure");
        }
    }

    async fn process_payment(
        &self,
        call: GateCall,
        price: MethodPrice,
        payment: PaymentPayload,
    ) -> Result<GateOutcome, GateRejection> {
        let started = Instant::now();
        let invoice_id = payment.invoice_id.clone();
        let lock = self.locks.acquire(&invoice_id).await;

        if let Some(existing) = self.ledger.get_by_invoice_id(&invoice_id) {
            match existing.status {
                ReceiptStatus::Settled => return Err(GateRejection::AlreadySettled(invoice_id)),
                ReceiptStatus::Failed => return Err(GateRejection::AlreadyFailed(invoice_id)),
                _ => {}
            }
        }

        let (price_usd, quoted) = match self.pricing_mode {
            PricingMode::Flat => (price.price_usd, None),
            PricingMode::Bandwidth => {
                let (price_usd, response) = self.bandwidth_quote(&call.request, &invoice_id).await;
                (price_usd, Some(response))
            }
        };

        let (receipt, _) = self.ledger.insert_if_absent(
            Receipt::builder()
                .id(Uuid::new_v4().to_string())
                .invoice_id(invoice_id.clone())
                .method(call.request.method.clone())
                .endpoint(call.endpoint.clone())
                .amount_usd(price_usd)
                .payload_size(call.payload_size)
                .timestamp(unix_millis())
                .payer(rpc402_facilitator::svm::payer_of(&payment.transaction))
                .recipient(self.recipient.clone())
                .network(self.network)
                .build(),
        );

        let request = VerifyRequest {
            payment,
            requirements: self.requirements(&invoice_id, price_usd, None),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(%invoice_id, method = %call.request.method, "Verifying payment");

        let verified = match self.facilitator.verify(&request).await {
            Ok(response) if response.is_valid => response,
            Ok(response) => {
                let reason = opaque_policy_reason(response.invalid_reason());
                self.fail(&receipt, &reason, started);
                return Err(GateRejection::VerificationFailed(reason));
            }
            Err(err) => {
                let reason = err.to_string();
                self.fail(&receipt, &reason, started);
                return Err(GateRejection::ProcessingFailed(reason));
            }
        };

        let mut update = ReceiptUpdate::builder().status(ReceiptStatus::Verified).build();
        update.payer = verified.payer;
        self.ledger
            .update(&receipt.id, update)
            .map_err(|_| GateRejection::Internal)?;

        let settled = match self.facilitator.settle(&request).await {
            Ok(settled) => settled,
            Err(err) => {
                let reason = err.to_string();
                self.fail(&receipt, &reason, started);
                return Err(GateRejection::ProcessingFailed(reason));
            }
        };

        self.ledger
            .update(
                &receipt.id,
                ReceiptUpdate::builder()
                    .status(ReceiptStatus::Settled)
                    .tx_signature(settled.signature.clone())
                    .latency_ms(started.elapsed().as_millis() as u64)
                    .build(),
            )
            .map_err(|_| GateRejection::Internal)?;
        drop(lock);

        #[cfg(feature = "tracing")]
        tracing::info!(
            %invoice_id,
            method = %call.request.method,
            signature = %settled.signature,
            price_usd,
            "Payment settled"
        );

        let response = match quoted {
            Some(response) => {
                self.cache.delete(&cache_key(&invoice_id));
                response
            }
            None => self.proxy.forward(&call.request).await,
        };

        Ok(GateOutcome {
            response,
            authorization: Authorization::Paid(PaymentResponse {
                signature: settled.signature,
                amount: price_usd,
                invoice_id,
            }),
        })
    }
}

/// Policy rejections are reported without the policy's own explanation.
fn opaque_policy_reason(reason: &str) -> String {
    const POLICY_PREFIX: &str = "Transaction rejected by policy";
    if reason.starts_with(POLICY_PREFIX) {
        POLICY_PREFIX.to_string()
    } else {
        reason.to_string()
    }
}
