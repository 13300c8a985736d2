//! The receipt ledger.
//!
//! One [`Receipt`] per invoice, held in memory and optionally mirrored to a JSON file.
//! The in-memory view is authoritative: every mutation hands a snapshot to a single
//! writer task, and failed writes are logged and otherwise ignored.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use parking_lot::RwLock;
use rpc402_core::{
    receipt::{Receipt, ReceiptUpdate, UsageStats},
    types::unix_millis,
};
use tokio::sync::{mpsc, oneshot};

use crate::errors::LedgerError;

/// Number of receipts `get_recent` returns when no limit is given.
pub const DEFAULT_RECENT_LIMIT: usize = 50;

#[derive(Debug, Default)]
struct Inner {
    receipts: Vec<Receipt>,
    by_id: HashMap<String, usize>,
    by_invoice: HashMap<String, usize>,
}

impl Inner {
    fn from_receipts(receipts: Vec<Receipt>) -> Self {
        let mut inner = Inner::default();
        for receipt in receipts {
            if !inner.by_invoice.contains_key(&receipt.invoice_id) {
                inner.push(receipt);
            }
        }
        inner
    }

    fn push(&mut self, receipt: Receipt) {
        let index = self.receipts.len();
        self.by_id.insert(receipt.id.clone(), index);
        self.by_invoice.insert(receipt.invoice_id.clone(), index);
        self.receipts.push(receipt);
    }
}

enum WriterMessage {
    Snapshot(Vec<Receipt>),
    Flush(oneshot::Sender<()>),
}

#[derive(Debug)]
pub struct ReceiptLedger {
    inner: RwLock<Inner>,
    writer: Option<mpsc::UnboundedSender<WriterMessage>>,
}

impl std::fmt::Debug for WriterMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriterMessage::Snapshot(receipts) => write!(f, "Snapshot({})", receipts.len()),
            WriterMessage::Flush(_) => write!(f, "Flush"),
        }
    }
}

impl Default for ReceiptLedger {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl ReceiptLedger {
    /// A ledger without persistence.
    pub fn in_memory() -> Self {
        ReceiptLedger {
            inner: RwLock::new(Inner::default()),
            writer: None,
        }
    }

    /// Open a ledger mirrored to `path`, loading whatever the file already holds.
    ///
    /// A missing file starts an empty ledger. An unreadable one is moved aside to
    /// `<name>.corrupt-<millis>` first, so the next snapshot cannot overwrite it. Must be
    /// called inside a tokio runtime, which runs the writer task.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let receipts = load(&path).await;

        #[cfg(feature = "tracing")]
        tracing::info!(path = %path.display(), count = receipts.len(), "Receipt ledger opened");

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(path, rx));

        ReceiptLedger {
            inner: RwLock::new(Inner::from_receipts(receipts)),
            writer: Some(tx),
        }
    }

    fn persist(&self, inner: &Inner) {
        if let Some(writer) = &self.writer {
            let _ = writer.send(WriterMessage::Snapshot(inner.receipts.clone()));
        }
    }

    /// Wait until every snapshot scheduled so far has been written.
    pub async fn flush(&self) {
        if let Some(writer) = &self.writer {
            let (tx, rx) = oneshot::channel();
            if writer.send(WriterMessage::Flush(tx)).is_ok() {
                let _ = rx.await;
            }
        }
    }

    /// Store a new receipt. Fails if its invoice already has one.
    pub fn save(&self, receipt: Receipt) -> Result<(), LedgerError> {
        let mut inner = self.inner.write();
        if inner.by_invoice.contains_key(&receipt.invoice_id) {
            return Err(LedgerError::DuplicateInvoice(receipt.invoice_id));
        }
        inner.push(receipt);
        self.persist(&inner);
        Ok(())
    }

    /// Store `receipt` unless its invoice already has one.
    ///
    /// Returns the stored receipt and whether it was inserted by this call.
    pub fn insert_if_absent(&self, receipt: Receipt) -> (Receipt, bool) {
        let mut inner = self.inner.write();
        if let Some(&index) = inner.by_invoice.get(&receipt.invoice_id) {
            return (inner.receipts[index].clone(), false);
        }
        inner.push(receipt.clone());
        self.persist(&inner);
        (receipt, true)
    }

    /// Apply an update, refusing status changes that move backwards or leave a terminal state.
    pub fn update(&self, id: &str, update: ReceiptUpdate) -> Result<Receipt, LedgerError> {
        let mut inner = self.inner.write();
        let index = *inner
            .by_id
            .get(id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

        let receipt = &mut inner.receipts[index];
        if let Some(next) = update.status {
            if !receipt.status.can_transition_to(next) {
                return Err(LedgerError::InvalidTransition {
                    id: id.to_string(),
                    from: receipt.status,
                    to: next,
                });
            }
        }
        update.apply(receipt);
        let updated = receipt.clone();

        self.persist(&inner);
        Ok(updated)
    }

    pub fn get(&self, id: &str) -> Option<Receipt> {
        let inner = self.inner.read();
        inner.by_id.get(id).map(|&i| inner.receipts[i].clone())
    }

    pub fn get_by_invoice_id(&self, invoice_id: &str) -> Option<Receipt> {
        let inner = self.inner.read();
        inner
            .by_invoice
            .get(invoice_id)
            .map(|&i| inner.receipts[i].clone())
    }

    pub fn get_all(&self) -> Vec<Receipt> {
        self.inner.read().receipts.clone()
    }

    /// Newest first.
    pub fn get_recent(&self, limit: usize) -> Vec<Receipt> {
        let mut receipts = self.get_all();
        receipts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        receipts.truncate(limit);
        receipts
    }

    pub fn get_stats(&self) -> UsageStats {
        UsageStats::from_receipts(&self.inner.read().receipts)
    }

    pub fn len(&self) -> usize {
        self.inner.read().receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn load(path: &Path) -> Vec<Receipt> {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(receipts) => receipts,
            Err(_err) => {
                let aside = corrupt_path(path);
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    err = %_err,
                    "Receipt file is unreadable, starting an empty ledger"
                );
                if let Err(_err) = tokio::fs::rename(path, &aside).await {
                    #[cfg(feature = "tracing")]
                    tracing::error!(path = %path.display(), err = %_err, "Could not move unreadable receipt file aside");
                }
                Vec::new()
            }
        },
        Err(_) => {
            if let Some(parent) = path.parent() {
                if let Err(_err) = tokio::fs::create_dir_all(parent).await {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(path = %parent.display(), err = %_err, "Could not create receipt directory");
                }
            }
            Vec::new()
        }
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".corrupt-{}", unix_millis()));
    path.with_file_name(name)
}

async fn write_snapshot(path: &Path, receipts: &[Receipt]) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(receipts)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await
}

async fn run_writer(path: PathBuf, mut rx: mpsc::UnboundedReceiver<WriterMessage>) {
    while let Some(message) = rx.recv().await {
        let mut latest = None;
        let mut waiters = Vec::new();

        // Only the newest pending snapshot is worth writing.
        let mut next = Some(message);
        while let Some(message) = next {
            match message {
                WriterMessage::Snapshot(receipts) => latest = Some(receipts),
                WriterMessage::Flush(done) => waiters.push(done),
            }
            next = rx.try_recv().ok();
        }

        if let Some(receipts) = latest {
            if let Err(_err) = write_snapshot(&path, &receipts).await {
                #[cfg(feature = "tracing")]
                tracing::warn!(path = %path.display(), err = %_err, "Failed to persist receipts");
            }
        }
        for done in waiters {
            let _ = done.send(());
        }
    }
}
