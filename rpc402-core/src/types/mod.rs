//! Core types used across rpc402.

mod amount;
mod common;

pub use amount::*;
pub use common::*;
