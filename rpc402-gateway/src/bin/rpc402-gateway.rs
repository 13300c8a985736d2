use std::sync::Arc;

use rpc402_core::facilitator::Facilitator;
use rpc402_facilitator::{facilitator_client::RemoteFacilitatorClient, stub::StubFacilitator};
use rpc402_gateway::{
    cache::ResponseCache,
    config::{GatewayConfig, VerificationMode},
    gate::PaymentGate,
    pricing::PricingResolver,
    proxy::UpstreamProxy,
    range::RangeAuthority,
    receipts::ReceiptLedger,
    server::router,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env().expect("Invalid gateway configuration");

    match config.verification {
        VerificationMode::Remote => {
            let facilitator = RemoteFacilitatorClient::from_url(config.facilitator_url.clone())
                .timeout(config.facilitator_timeout)
                .settle_timeout(config.settle_timeout);
            run(config, facilitator).await
        }
        VerificationMode::Stub => {
            tracing::warn!("Stub verification enabled: payments are accepted without checks");
            let facilitator = StubFacilitator::new(config.network);
            run(config, facilitator).await
        }
    }
}

async fn run<F>(config: GatewayConfig, facilitator: F)
where
    F: Facilitator + Send + Sync + 'static,
{
    let ledger = match &config.receipts_path {
        Some(path) => ReceiptLedger::open(path).await,
        None => ReceiptLedger::in_memory(),
    };
    let proxy = UpstreamProxy::new(config.upstream_rpc_url.clone()).timeout(config.upstream_timeout);

    let gate = PaymentGate::builder()
        .facilitator(facilitator)
        .pricing(PricingResolver::new(config.prices))
        .ledger(Arc::new(ledger))
        .ranges(Arc::new(RangeAuthority::new(&config.range_token_secret)))
        .cache(Arc::new(ResponseCache::new(config.cache_ttl, config.cache_capacity)))
        .proxy(Arc::new(proxy))
        .recipient(config.recipient_wallet.clone())
        .token_account(config.token_account().expect("Invalid recipient token account"))
        .mint(config.mint())
        .network(config.network)
        .invoice_timeout(config.invoice_timeout)
        .pricing_mode(config.pricing_mode)
        .signature_range_check(config.signature_range_check)
        .build();
    let gate = Arc::new(gate);

    let app = router(gate.clone()).layer(TraceLayer::new_for_http());

    let addr = config.socket_addr().expect("Invalid gateway address");
    tracing::info!(
        network = %config.network,
        upstream = %config.upstream_rpc_url,
        facilitator = %config.facilitator_url,
        recipient = %config.recipient_wallet,
        settle_timeout = ?config.settle_timeout,
        pricing = ?config.pricing_mode,
        "Starting gateway on {}",
        addr
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .expect("Server failed");

    gate.ledger().flush().await;
}
