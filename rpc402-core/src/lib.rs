//! rpc402 core library.
//!
//! Protocol types shared by the payment gateway and the settlement facilitator:
//! invoices, payment payloads, facilitator messages, JSON-RPC envelopes and receipts.

pub mod errors;
pub mod facilitator;
pub mod jsonrpc;
pub mod receipt;
pub mod transport;
pub mod types;
