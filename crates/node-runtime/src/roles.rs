//! Background roles.
//!
//! Cross-role coordination is all typed messages: peer plumbing feeds
//! verified inventory into the single persister's queue, the timer
//! drives mempool re-verification, and nothing shares mutable state
//! outside the ledger's own synchronization.

use crate::system::SystemContext;
use neo_ledger::VerifyResult;
use neo_types::{Block, Transaction};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Inventory handed to the ledger roles.
pub enum LedgerMessage {
    /// A block received (and frame-validated) from a peer.
    NewBlock(Block),
    /// A transaction received from a peer or local submission.
    NewTransaction(Transaction),
}

/// Queue depth between peer plumbing and the persister.
pub const LEDGER_QUEUE_DEPTH: usize = 512;

/// Spawn the single persister role: the only writer to the store. It
/// drains the ledger queue in arrival order, which (with the ledger's
/// own height checks) yields the block-after-block total order.
pub fn spawn_persister(
    system: Arc<SystemContext>,
    mut inbox: mpsc::Receiver<LedgerMessage>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while let Some(message) = inbox.blocking_recv() {
            match message {
                LedgerMessage::NewBlock(block) => {
                    let index = block.index();
                    match system.blockchain.on_new_block(block) {
                        Ok(VerifyResult::Succeed) => {}
                        Ok(VerifyResult::AlreadyExists) => {
                            debug!(index, "duplicate block ignored");
                        }
                        Ok(VerifyResult::UnableToVerify) => {
                            debug!(index, "future block parked");
                        }
                        Ok(other) => warn!(index, result = ?other, "block rejected"),
                        Err(error) => warn!(index, %error, "block persistence failed"),
                    }
                }
                LedgerMessage::NewTransaction(tx) => {
                    let hash = tx.hash();
                    match system.blockchain.on_new_transaction(tx) {
                        Ok(VerifyResult::Succeed) => debug!(%hash, "transaction pooled"),
                        Ok(result) => debug!(%hash, ?result, "transaction not pooled"),
                        Err(error) => warn!(%hash, %error, "transaction ingest failed"),
                    }
                }
            }
        }
        info!("ledger queue closed, persister exiting");
    })
}

/// Spawn the idle timer: periodic mempool re-verification.
pub fn spawn_timer(system: Arc<SystemContext>) -> JoinHandle<()> {
    let interval = std::time::Duration::from_millis(system.settings.milliseconds_per_block);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let chain = system.blockchain.clone();
            let result = tokio::task::spawn_blocking(move || chain.reverify_mempool()).await;
            match result {
                Ok(Ok(promoted)) if promoted > 0 => {
                    debug!(promoted, "mempool entries re-verified");
                }
                Ok(Ok(_)) => {}
                Ok(Err(error)) => warn!(%error, "mempool re-verification failed"),
                Err(error) => warn!(%error, "timer task join error"),
            }
        }
    })
}

/// Create the ledger queue: the sender side goes to peer plumbing and
/// local submission, the receiver to the persister.
#[must_use]
pub fn ledger_queue() -> (mpsc::Sender<LedgerMessage>, mpsc::Receiver<LedgerMessage>) {
    mpsc::channel(LEDGER_QUEUE_DEPTH)
}
