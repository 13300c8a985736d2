//! # rpc402 Gateway
//!
//! A pay-per-call gateway in front of a historical Solana JSON-RPC provider. Priced
//! methods answer `402 Payment Required` with an invoice until the caller presents a
//! signed USDC transfer that a facilitator verifies and settles; a signed range token
//! can pre-pay every call inside a slot range.
//!
//! ## Modules
//!
//! - [`pricing`]: Per-method prices and the bandwidth surcharge.
//! - [`gate`]: [`PaymentGate`](gate::PaymentGate), the per-call state machine.
//! - [`receipts`]: The receipt ledger, optionally mirrored to a JSON file.
//! - [`range`] and [`capability`]: Range purchases and the HMAC-signed tokens they yield.
//! - [`cache`]: A TTL-bounded LRU of upstream responses.
//! - [`proxy`]: Forwarding to the upstream provider.
//! - [`config`]: Environment-driven configuration.
//! - [`server`]: Axum routes for `/rpc`, `/purchase-range`, `/ranges`, `/receipts`,
//!   `/stats` and `/health`.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rpc402_facilitator::stub::StubFacilitator;
//! use rpc402_gateway::{gate::PaymentGate, proxy::UpstreamProxy, range::RangeAuthority};
//! use url::Url;
//!
//! let gate = PaymentGate::builder()
//!     .facilitator(StubFacilitator::default())
//!     .ranges(Arc::new(RangeAuthority::new("secret")))
//!     .proxy(Arc::new(UpstreamProxy::new(
//!         Url::parse("https://api.devnet.solana.com").unwrap(),
//!     )))
//!     .recipient("62pyPYsdSLah2vDSeenEep2R2hP9jz98eDbnz4Zyb1Lf")
//!     .token_account(
//!         rpc402_facilitator::svm::associated_token_address(
//!             "62pyPYsdSLah2vDSeenEep2R2hP9jz98eDbnz4Zyb1Lf",
//!             "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU",
//!         )
//!         .unwrap(),
//!     )
//!     .mint("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU")
//!     .build();
//! ```

pub mod cache;
pub mod capability;
pub mod config;
pub mod errors;
pub mod gate;
pub mod pricing;
pub mod proxy;
pub mod range;
pub mod receipts;

#[cfg(feature = "axum")]
pub mod server;
