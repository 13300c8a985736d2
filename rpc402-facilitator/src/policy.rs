//! Policy checks run after a payment passes structural verification.

use std::{future::Future, sync::Arc};

use solana_transaction::versioned::VersionedTransaction;

use crate::rpc::SolanaRpc;

pub trait PolicyCheck {
    /// Approve the transaction or return the reason it is refused.
    fn approve(
        &self,
        tx: &VersionedTransaction,
    ) -> impl Future<Output = Result<(), String>> + Send;
}

/// Approves every structurally valid payment.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllPolicy;

impl PolicyCheck for AllowAllPolicy {
    async fn approve(&self, _tx: &VersionedTransaction) -> Result<(), String> {
        Ok(())
    }
}

/// Approves payments the cluster reports would execute successfully.
#[derive(Debug, Clone)]
pub struct SimulationPolicy<R> {
    rpc: Arc<R>,
}

impl<R> SimulationPolicy<R> {
    pub fn new(rpc: Arc<R>) -> Self {
        SimulationPolicy { rpc }
    }
}

impl<R: SolanaRpc + Send + Sync> PolicyCheck for SimulationPolicy<R> {
    fn approve(
        &self,
        tx: &VersionedTransaction,
    ) -> impl Future<Output = Result<(), String>> + Send {
        self.rpc.simulate(tx)
    }
}

/// The policy selected at start-up.
#[derive(Debug, Clone)]
pub enum Policy<R> {
    AllowAll(AllowAllPolicy),
    Simulate(SimulationPolicy<R>),
}

impl<R: SolanaRpc + Send + Sync> PolicyCheck for Policy<R> {
    async fn approve(&self, tx: &VersionedTransaction) -> Result<(), String> {
        match self {
            Policy::AllowAll(policy) => policy.approve(tx).await,
            Policy::Simulate(policy) => policy.approve(tx).await,
        }
    }
}
