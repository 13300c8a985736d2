//! # rpc402 Facilitator
//!
//! The settlement authority of the rpc402 payment protocol, and the clients the gateway
//! uses to talk to one.
//!
//! ## Modules
//!
//! - [`svm`]: Decoding of signed Solana transactions and structural checks of the SPL token
//!   transfer they carry.
//! - [`policy`]: Policy checks applied after the structural checks pass.
//! - [`rpc`]: The Solana RPC seam used for simulation and broadcasting.
//! - [`solana`]: [`SolanaFacilitator`](solana::SolanaFacilitator), the authority itself.
//! - [`facilitator_client`]: [`RemoteFacilitatorClient`](facilitator_client::RemoteFacilitatorClient),
//!   an HTTP client for a remote authority.
//! - [`stub`]: [`StubFacilitator`](stub::StubFacilitator), which accepts everything.
//! - [`server`]: Axum routes exposing `/supported`, `/verify`, `/settle` and `/health`.
//!
//! ## Choosing a verification strategy
//!
//! The gateway picks one [`Facilitator`](rpc402_core::facilitator::Facilitator) at start-up
//! and never branches on the choice while handling requests.

pub mod config;
pub mod errors;
pub mod stub;

#[cfg(feature = "svm")]
pub mod policy;
#[cfg(feature = "svm")]
pub mod rpc;
#[cfg(feature = "svm")]
pub mod solana;
#[cfg(feature = "svm")]
pub mod svm;

#[cfg(feature = "facilitator-client")]
pub mod facilitator_client;

#[cfg(feature = "axum")]
pub mod server;
