//! The blockchain: ingest, verification, persistence, import.
//!
//! One `Blockchain` owns the canonical state. Persistence is strictly
//! sequential (the single-persister rule); verifiers run against cheap
//! snapshots and never mutate shared state. `Committing` handlers may
//! append writes to the block's cache before the atomic batch lands;
//! `Committed` handlers observe the finished block. Handler panics are
//! contained so the persister survives misbehaving subscribers.

use crate::error::{LedgerError, VerifyResult};
use crate::genesis::genesis_block;
use crate::mempool::Mempool;
use crate::verification::{
    verify_block_witness, verify_transaction, VerifierContext,
};
use neo_contract::natives::{ledger_contract, neo_token, policy};
use neo_contract::{
    ApplicationEngine, CallFlags, LogEvent, NativeRegistry, NotifyEvent, TriggerType,
};
use neo_store::{DataCache, MptTrie, Store, StorageItem, StorageKey};
use neo_types::io::Serializable;
use neo_types::{Block, Hash256, Header, ProtocolSettings, Transaction};
use neo_vm::VMState;
use num_bigint::BigInt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Tunables of the pipeline.
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// Cap on parked future blocks.
    pub max_unverified_blocks: usize,
    /// Unverified mempool entries re-checked per idle tick.
    pub max_tx_to_reverify_per_idle: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_unverified_blocks: 100,
            max_tx_to_reverify_per_idle: 10,
        }
    }
}

/// Outcome of one script run during block persistence.
pub struct ApplicationExecuted {
    /// The transaction, absent for OnPersist / PostPersist runs.
    pub tx: Option<Transaction>,
    /// Which trigger ran.
    pub trigger: TriggerType,
    /// Final machine state.
    pub vm_state: VMState,
    /// Gas consumed by the run.
    pub gas_consumed: i64,
    /// Fault reason when `vm_state` is `Fault`.
    pub exception: Option<String>,
    /// Captured notifications.
    pub notifications: Vec<NotifyEvent>,
    /// Captured log events.
    pub logs: Vec<LogEvent>,
}

type CommittingHandler =
    Box<dyn Fn(&Block, &mut DataCache, &[ApplicationExecuted]) + Send + Sync>;
type CommittedHandler = Box<dyn Fn(&Block) + Send + Sync>;
type RelayHandler = Box<dyn Fn(&Transaction, &VerifyResult) + Send + Sync>;

/// The canonical ledger.
pub struct Blockchain {
    store: Arc<dyn Store>,
    settings: Arc<ProtocolSettings>,
    natives: Arc<NativeRegistry>,
    config: LedgerConfig,
    mempool: Mutex<Mempool>,
    /// Blocks we cannot verify yet, keyed by height.
    unverified_blocks: Mutex<BTreeMap<u32, Vec<Block>>>,
    /// Validated header chain ahead of the block height.
    header_hashes: Mutex<HashMap<u32, Hash256>>,
    header_height: AtomicU32,
    committing_handlers: Mutex<Vec<CommittingHandler>>,
    committed_handlers: Mutex<Vec<CommittedHandler>>,
    relay_handlers: Mutex<Vec<RelayHandler>>,
}

impl Blockchain {
    /// Open (or bootstrap) a ledger over `store`. When the store holds no
    /// genesis, one is constructed from `settings` and persisted through
    /// the normal path.
    pub fn new(
        store: Arc<dyn Store>,
        settings: Arc<ProtocolSettings>,
        natives: Arc<NativeRegistry>,
        config: LedgerConfig,
    ) -> Result<Self, LedgerError> {
        let chain = Self {
            mempool: Mutex::new(Mempool::new(settings.memory_pool_max_transactions)),
            store,
            settings,
            natives,
            config,
            unverified_blocks: Mutex::new(BTreeMap::new()),
            header_hashes: Mutex::new(HashMap::new()),
            header_height: AtomicU32::new(0),
            committing_handlers: Mutex::new(Vec::new()),
            committed_handlers: Mutex::new(Vec::new()),
            relay_handlers: Mutex::new(Vec::new()),
        };

        let mut snapshot = chain.snapshot();
        if ledger_contract::current_index(&mut snapshot)?.is_none() {
            let genesis = genesis_block(&chain.settings)?;
            info!(hash = %genesis.hash(), "persisting genesis block");
            chain.persist_block(&genesis)?;
        }
        let current = chain.current_index()?;
        chain.header_height.store(current, Ordering::SeqCst);
        Ok(chain)
    }

    /// A fresh read snapshot.
    #[must_use]
    pub fn snapshot(&self) -> DataCache {
        DataCache::new(self.store.clone())
    }

    /// The verifier context for this chain.
    #[must_use]
    pub fn verifier_context(&self) -> VerifierContext {
        VerifierContext::new(self.settings.clone(), self.natives.clone())
    }

    /// Current block height.
    pub fn current_index(&self) -> Result<u32, LedgerError> {
        let mut snapshot = self.snapshot();
        Ok(ledger_contract::current_index(&mut snapshot)?.unwrap_or(0))
    }

    /// Current tip hash.
    pub fn current_hash(&self) -> Result<Hash256, LedgerError> {
        let mut snapshot = self.snapshot();
        let index = ledger_contract::current_index(&mut snapshot)?.unwrap_or(0);
        ledger_contract::block_hash_at(&mut snapshot, index)?
            .ok_or_else(|| LedgerError::SystemScriptFault("missing tip hash".into()))
    }

    /// Highest validated header.
    #[must_use]
    pub fn header_height(&self) -> u32 {
        self.header_height.load(Ordering::SeqCst)
    }

    /// The mempool, for inspection.
    pub fn with_mempool<R>(&self, f: impl FnOnce(&mut Mempool) -> R) -> R {
        f(&mut self.mempool.lock())
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Subscribe to the pre-commit event; the handler may append writes
    /// to the block's cache.
    pub fn on_committing(&self, handler: CommittingHandler) {
        self.committing_handlers.lock().push(handler);
    }

    /// Subscribe to the post-commit event.
    pub fn on_committed(&self, handler: CommittedHandler) {
        self.committed_handlers.lock().push(handler);
    }

    /// Subscribe to transaction relay results.
    pub fn on_transaction_relayed(&self, handler: RelayHandler) {
        self.relay_handlers.lock().push(handler);
    }

    fn fire_committing(
        &self,
        block: &Block,
        cache: &mut DataCache,
        executions: &[ApplicationExecuted],
    ) {
        for handler in self.committing_handlers.lock().iter() {
            if catch_unwind(AssertUnwindSafe(|| handler(block, cache, executions))).is_err() {
                error!("committing handler panicked; isolated");
            }
        }
    }

    fn fire_committed(&self, block: &Block) {
        for handler in self.committed_handlers.lock().iter() {
            if catch_unwind(AssertUnwindSafe(|| handler(block))).is_err() {
                error!("committed handler panicked; isolated");
            }
        }
    }

    fn fire_relayed(&self, tx: &Transaction, result: &VerifyResult) {
        for handler in self.relay_handlers.lock().iter() {
            if catch_unwind(AssertUnwindSafe(|| handler(tx, result))).is_err() {
                error!("relay handler panicked; isolated");
            }
        }
    }

    // =========================================================================
    // HEADERS
    // =========================================================================

    /// Accept a batch of headers extending the validated header chain.
    pub fn on_new_headers(&self, headers: &[Header]) -> Result<usize, LedgerError> {
        let mut accepted = 0;
        let mut map = self.header_hashes.lock();
        for header in headers {
            let height = self.header_height.load(Ordering::SeqCst);
            if header.index != height + 1 {
                continue;
            }
            let prev = match map.get(&height) {
                Some(hash) => *hash,
                None => {
                    let mut snapshot = self.snapshot();
                    ledger_contract::block_hash_at(&mut snapshot, height)?
                        .unwrap_or_else(Hash256::zero)
                }
            };
            if header.prev_hash != prev {
                break;
            }
            map.insert(header.index, header.hash());
            self.header_height.store(header.index, Ordering::SeqCst);
            accepted += 1;
        }
        Ok(accepted)
    }

    // =========================================================================
    // INGEST
    // =========================================================================

    /// Offer a block received from the network.
    pub fn on_new_block(&self, block: Block) -> Result<VerifyResult, LedgerError> {
        let current = self.current_index()?;
        if block.index() <= current {
            return Ok(VerifyResult::AlreadyExists);
        }
        if block.index() > current + 1 {
            // A future block: park it until its ancestors arrive.
            let mut parked = self.unverified_blocks.lock();
            let total: usize = parked.values().map(Vec::len).sum();
            if total < self.config.max_unverified_blocks {
                let slot = parked.entry(block.index()).or_default();
                if !slot.iter().any(|b| b.hash() == block.hash()) {
                    slot.push(block);
                }
            } else {
                warn!("unverified block cache full, dropping future block");
            }
            return Ok(VerifyResult::UnableToVerify);
        }

        let result = self.verify_block(&block)?;
        if !result.is_ok() {
            return Ok(result);
        }
        self.persist_block(&block)?;

        // Drain parked successors now in reach.
        loop {
            let next_index = self.current_index()? + 1;
            let candidates = {
                let mut parked = self.unverified_blocks.lock();
                parked.remove(&next_index)
            };
            let Some(candidates) = candidates else { break };
            let mut advanced = false;
            for candidate in candidates {
                if self.verify_block(&candidate)?.is_ok() {
                    self.persist_block(&candidate)?;
                    advanced = true;
                    break;
                }
            }
            if !advanced {
                break;
            }
        }
        Ok(VerifyResult::Succeed)
    }

    /// Offer a transaction received from the network.
    pub fn on_new_transaction(&self, tx: Transaction) -> Result<VerifyResult, LedgerError> {
        let mut snapshot = self.snapshot();
        let height = self.current_index()?;
        if ledger_contract::transaction_height(&mut snapshot, &tx.hash())?.is_some() {
            let result = VerifyResult::AlreadyExists;
            self.fire_relayed(&tx, &result);
            return Ok(result);
        }
        let context = self.verifier_context();
        let result = self
            .mempool
            .lock()
            .try_add(tx.clone(), &context, &mut snapshot, height);
        self.fire_relayed(&tx, &result);
        Ok(result)
    }

    /// Re-verify a slice of unverified mempool entries; the idle timer
    /// calls this.
    pub fn reverify_mempool(&self) -> Result<usize, LedgerError> {
        let mut snapshot = self.snapshot();
        let height = self.current_index()?;
        let context = self.verifier_context();
        Ok(self.mempool.lock().reverify(
            self.config.max_tx_to_reverify_per_idle,
            &context,
            &mut snapshot,
            height,
        ))
    }

    // =========================================================================
    // VERIFICATION
    // =========================================================================

    /// Full block verification against the current tip.
    pub fn verify_block(&self, block: &Block) -> Result<VerifyResult, LedgerError> {
        let current = self.current_index()?;
        if block.index() != current + 1 {
            return Ok(VerifyResult::Invalid(format!(
                "index {} does not extend {current}",
                block.index()
            )));
        }
        let tip_hash = self.current_hash()?;
        if block.header.prev_hash != tip_hash {
            return Ok(VerifyResult::Invalid("prev_hash mismatch".into()));
        }
        if !block.merkle_root_valid() {
            return Ok(VerifyResult::Invalid("merkle root mismatch".into()));
        }
        let mut snapshot = self.snapshot();
        if block.size() > policy::max_block_size(&mut snapshot) as usize {
            return Ok(VerifyResult::PolicyFailed("block too large".into()));
        }
        if block.transactions.len() > policy::max_transactions_per_block(&mut snapshot) as usize {
            return Ok(VerifyResult::PolicyFailed("too many transactions".into()));
        }
        let system_fees: i64 = block.transactions.iter().map(|tx| tx.system_fee).sum();
        if system_fees > policy::max_block_system_fee(&mut snapshot) {
            return Ok(VerifyResult::PolicyFailed("system fee budget exceeded".into()));
        }

        // The consensus witness must hash to the tip's next_consensus.
        let tip = ledger_contract::block_by_hash(&mut snapshot, &tip_hash)?
            .ok_or_else(|| LedgerError::SystemScriptFault("missing tip block".into()))?;
        let context = self.verifier_context();
        let witness_result =
            verify_block_witness(&context, &mut snapshot, block, tip.header.next_consensus);
        if !witness_result.is_ok() {
            return Ok(witness_result);
        }

        for tx in &block.transactions {
            let result = verify_transaction(&context, &mut snapshot, tx, current);
            if !result.is_ok() {
                return Ok(VerifyResult::Invalid(format!(
                    "transaction {} rejected: {result:?}",
                    tx.hash()
                )));
            }
        }
        Ok(VerifyResult::Succeed)
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    fn system_script(name: &str) -> Vec<u8> {
        let mut script = Vec::with_capacity(5);
        script.push(0x41); // SYSCALL
        script.extend_from_slice(&neo_contract::syscalls::syscall_number(name).to_le_bytes());
        script
    }

    fn run_system_script(
        &self,
        trigger: TriggerType,
        block: &Block,
        cache: DataCache,
    ) -> Result<(DataCache, ApplicationExecuted), LedgerError> {
        let name = match trigger {
            TriggerType::OnPersist => "System.Contract.NativeOnPersist",
            _ => "System.Contract.NativePostPersist",
        };
        let mut engine = ApplicationEngine::new(
            trigger,
            None,
            cache,
            Some(block.clone()),
            self.settings.clone(),
            self.natives.clone(),
            i64::MAX / 2,
        );
        engine
            .load_entry_script(Self::system_script(name), CallFlags::ALL)
            .map_err(|e| LedgerError::SystemScriptFault(e.to_string()))?;
        let state = engine.execute();
        if state != VMState::Halt {
            return Err(LedgerError::SystemScriptFault(
                engine.exception().unwrap_or("unknown fault").to_string(),
            ));
        }
        let record = ApplicationExecuted {
            tx: None,
            trigger,
            vm_state: state,
            gas_consumed: engine.gas_consumed(),
            exception: None,
            notifications: engine.host.notifications.clone(),
            logs: engine.host.logs.clone(),
        };
        Ok((engine.into_snapshot(), record))
    }

    /// Persist one verified block: the single writer's entry point.
    pub fn persist_block(&self, block: &Block) -> Result<(), LedgerError> {
        let mut cache = DataCache::new(self.store.clone());
        let mut executions = Vec::with_capacity(block.transactions.len() + 2);

        // Genesis seeds the token state before anything executes.
        if block.index() == 0 {
            neo_token::initialize(&mut cache, &self.settings)?;
            let committee = neo_token::committee_address(&mut cache, &self.settings)?;
            neo_contract::natives::gas_token::mint(
                &mut cache,
                &committee,
                &BigInt::from(self.settings.initial_gas_distribution),
            )?;
        }

        let (after_on_persist, record) =
            self.run_system_script(TriggerType::OnPersist, block, cache)?;
        cache = after_on_persist;
        executions.push(record);

        // Transactions execute sequentially, each in its own child cache
        // so a FAULT discards its writes but keeps its fee burn.
        for tx in &block.transactions {
            let child = cache.snapshot();
            let mut engine = ApplicationEngine::new(
                TriggerType::Application,
                Some(tx.clone()),
                child,
                Some(block.clone()),
                self.settings.clone(),
                self.natives.clone(),
                tx.system_fee,
            );
            let state = match engine.load_entry_script(tx.script.clone(), CallFlags::ALL) {
                Ok(()) => engine.execute(),
                Err(_) => VMState::Fault,
            };
            let record = ApplicationExecuted {
                tx: Some(tx.clone()),
                trigger: TriggerType::Application,
                vm_state: state,
                gas_consumed: engine.gas_consumed(),
                exception: engine.exception().map(str::to_string),
                notifications: engine.host.notifications.clone(),
                logs: engine.host.logs.clone(),
            };
            if state == VMState::Halt {
                engine.into_snapshot().commit_into(&mut cache)?;
            } else {
                debug!(tx = %tx.hash(), reason = ?record.exception, "transaction faulted");
            }
            executions.push(record);
        }

        let (after_post_persist, record) =
            self.run_system_script(TriggerType::PostPersist, block, cache)?;
        cache = after_post_persist;
        executions.push(record);

        // Interested observers may append auxiliary writes to the cache.
        self.fire_committing(block, &mut cache, &executions);

        // Fold the block's state delta into the trie for the new root.
        let mut snapshot = self.snapshot();
        let previous_root = snapshot
            .get(&StorageKey::new(
                ledger_contract::LEDGER_META_ID,
                ledger_contract::KEY_STATE_ROOT.to_vec(),
            ))?
            .and_then(|item| item.value.try_into().ok().map(Hash256));
        let mut trie = MptTrie::new(previous_root, self.store.clone());
        for (key, item) in cache.dirty_entries() {
            match item {
                Some(item) => trie.put(&key.to_store_key(), &item.to_bytes())?,
                None => trie.delete(&key.to_store_key())?,
            }
        }

        // One atomic batch: state delta, trie nodes, block bytes and
        // indices, the new current height and the state root.
        let mut batch = cache.build_batch();
        batch.ops.extend(trie.commit().ops);

        let block_hash = block.hash();
        let mut block_key = vec![ledger_contract::KEY_BLOCK];
        block_key.extend_from_slice(block_hash.as_bytes());
        batch.put(
            StorageKey::new(ledger_contract::LEDGER_META_ID, block_key).to_store_key(),
            StorageItem::new(block.to_bytes()).to_bytes(),
        );

        let mut index_key = vec![ledger_contract::KEY_INDEX_TO_HASH];
        index_key.extend_from_slice(&block.index().to_le_bytes());
        batch.put(
            StorageKey::new(ledger_contract::LEDGER_META_ID, index_key).to_store_key(),
            StorageItem::new(block_hash.as_bytes().to_vec()).to_bytes(),
        );

        for (offset, tx) in block.transactions.iter().enumerate() {
            let mut tx_key = vec![ledger_contract::KEY_TRANSACTION];
            tx_key.extend_from_slice(tx.hash().as_bytes());
            let mut meta = Vec::with_capacity(8);
            meta.extend_from_slice(&block.index().to_le_bytes());
            meta.extend_from_slice(&(offset as u32).to_le_bytes());
            batch.put(
                StorageKey::new(ledger_contract::LEDGER_META_ID, tx_key).to_store_key(),
                StorageItem::new(meta).to_bytes(),
            );
        }

        batch.put(
            StorageKey::new(
                ledger_contract::LEDGER_META_ID,
                ledger_contract::KEY_CURRENT_INDEX.to_vec(),
            )
            .to_store_key(),
            StorageItem::new(block.index().to_le_bytes().to_vec()).to_bytes(),
        );
        batch.put(
            StorageKey::new(
                ledger_contract::LEDGER_META_ID,
                ledger_contract::KEY_STATE_ROOT.to_vec(),
            )
            .to_store_key(),
            StorageItem::new(trie.root_hash().as_bytes().to_vec()).to_bytes(),
        );

        self.store.write_batch(batch)?;

        if self.header_height.load(Ordering::SeqCst) < block.index() {
            self.header_height.store(block.index(), Ordering::SeqCst);
        }
        self.mempool.lock().on_block_persisted(&block.transactions);
        info!(
            index = block.index(),
            hash = %block_hash,
            txs = block.transactions.len(),
            "block persisted"
        );
        self.fire_committed(block);
        Ok(())
    }

    // =========================================================================
    // IMPORT
    // =========================================================================

    /// Import a pre-fetched batch of consecutive blocks; stops at the
    /// first failure and reports its height.
    pub fn import_blocks(&self, blocks: &[Block], verify: bool) -> Result<(), LedgerError> {
        for block in blocks {
            let expected = self.current_index()? + 1;
            if block.index() != expected {
                return Err(LedgerError::ImportAborted {
                    index: block.index(),
                    reason: format!("expected index {expected}"),
                });
            }
            if verify {
                let result = self.verify_block(block)?;
                if !result.is_ok() {
                    return Err(LedgerError::ImportAborted {
                        index: block.index(),
                        reason: format!("{result:?}"),
                    });
                }
            }
            self.persist_block(block)?;
        }
        Ok(())
    }
}
