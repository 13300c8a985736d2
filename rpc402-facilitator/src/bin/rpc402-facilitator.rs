use std::sync::Arc;

use rpc402_facilitator::{
    config::{FacilitatorConfig, PolicyMode},
    policy::{AllowAllPolicy, Policy, SimulationPolicy},
    rpc::RpcClientAdapter,
    server::{ServerState, router},
    solana::SolanaFacilitator,
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

    let config = FacilitatorConfig::from_env().expect("Invalid facilitator configuration");
    let rpc = Arc::new(RpcClientAdapter::new(config.solana_rpc_url.as_str()));

    let policy = match config.policy {
        PolicyMode::AllowAll => Policy::AllowAll(AllowAllPolicy),
        PolicyMode::Simulate => Policy::Simulate(SimulationPolicy::new(rpc.clone())),
    };

    let facilitator = SolanaFacilitator::builder()
        .rpc(rpc)
        .policy(policy)
        .network(config.network)
        .fee_payer(config.fee_payer.clone())
        .settle_timeout(config.settle_timeout)
        .build();

    let state = Arc::new(ServerState {
        facilitator,
        network: config.network,
        solana_rpc_url: config.solana_rpc_url.to_string(),
    });
    let app = router(state).layer(TraceLayer::new_for_http());

    let addr = config.socket_addr().expect("Invalid facilitator address");
    tracing::info!(
        network = %config.network,
        rpc = %config.solana_rpc_url,
        policy = ?config.policy,
        "Starting facilitator on {}",
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
}
