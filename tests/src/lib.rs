//! Shared fixtures for the cross-crate suite: a single-validator chain
//! whose committee key the tests hold, plus builders for signed
//! transactions and blocks.

use neo_contract::NativeRegistry;
use neo_crypto::KeyPair;
use neo_ledger::{Blockchain, LedgerConfig};
use neo_store::MemoryStore;
use neo_types::contract_script::multisig_redeem_script;
use neo_types::io::{BinaryWriter, Serializable};
use neo_types::signer::Signer;
use neo_types::witness::{Witness, WitnessScopes};
use neo_types::{Block, Hash160, Header, ProtocolSettings, Transaction};
use std::sync::Arc;

/// A bootstrapped single-validator chain plus its secret material.
pub struct TestChain {
    /// The ledger, genesis persisted.
    pub blockchain: Arc<Blockchain>,
    /// The sole committee / validator key.
    pub validator: KeyPair,
    /// Settings behind the chain.
    pub settings: Arc<ProtocolSettings>,
    /// The native set.
    pub natives: Arc<NativeRegistry>,
    /// The backing store.
    pub store: Arc<MemoryStore>,
}

impl TestChain {
    /// Bootstrap a chain with one validator and the given mempool
    /// capacity.
    #[must_use]
    pub fn new(mempool_capacity: usize) -> Self {
        let validator = KeyPair::generate();
        let settings = Arc::new(ProtocolSettings {
            network: 0x7465_7374,
            standby_committee: vec![validator.public_key().clone()],
            validators_count: 1,
            memory_pool_max_transactions: mempool_capacity,
            ..ProtocolSettings::default()
        });
        let natives = Arc::new(NativeRegistry::new());
        let store = Arc::new(MemoryStore::new());
        let blockchain = Arc::new(
            Blockchain::new(
                store.clone(),
                settings.clone(),
                natives.clone(),
                LedgerConfig::default(),
            )
            .expect("genesis bootstrap"),
        );
        Self {
            blockchain,
            validator,
            settings,
            natives,
            store,
        }
    }

    /// The committee's (and consensus) account.
    #[must_use]
    pub fn consensus_account(&self) -> Hash160 {
        self.settings
            .next_consensus_address()
            .expect("single validator address")
    }

    /// The data every witness signature covers: magic plus entity hash.
    #[must_use]
    pub fn sign_data(&self, hash: &neo_types::Hash256) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        writer.write_u32(self.settings.network);
        hash.serialize(&mut writer);
        writer.into_bytes()
    }

    /// A transaction signed by a fresh throwaway account.
    ///
    /// `fee_per_byte` shapes mempool priority: the network fee is set to
    /// exactly `fee_per_byte * size`.
    #[must_use]
    pub fn signed_transaction(&self, nonce: u32, fee_per_byte: i64) -> Transaction {
        let account = KeyPair::generate();
        self.transaction_from(&account, nonce, fee_per_byte, vec![])
    }

    /// A signed transaction from a specific account with attributes.
    #[must_use]
    pub fn transaction_from(
        &self,
        account: &KeyPair,
        nonce: u32,
        fee_per_byte: i64,
        attributes: Vec<neo_types::TransactionAttribute>,
    ) -> Transaction {
        let verification =
            neo_types::contract_script::signature_redeem_script(account.public_key());
        let account_hash = Hash160::from_script(&verification);
        let height = self.blockchain.current_index().expect("height");

        let mut tx = Transaction {
            version: 0,
            nonce,
            system_fee: 0,
            network_fee: 0,
            valid_until_block: height + 100,
            signers: vec![Signer::with_scope(
                account_hash,
                WitnessScopes::CALLED_BY_ENTRY,
            )],
            attributes,
            script: vec![0x11], // PUSH1
            witnesses: vec![Witness {
                invocation_script: vec![0u8; 66],
                verification_script: verification.clone(),
            }],
        };
        // Fix the size first (witness already at its final length), then
        // derive the fee and re-sign.
        tx.network_fee = fee_per_byte * tx.size() as i64;
        let signature = account.sign(&self.sign_data(&tx.hash()));
        let mut invocation = Vec::with_capacity(66);
        invocation.push(0x0C); // PUSHDATA1
        invocation.push(64);
        invocation.extend_from_slice(signature.as_bytes());
        tx.witnesses[0].invocation_script = invocation;
        tx
    }

    /// Build and sign the next block holding `transactions`.
    #[must_use]
    pub fn next_block(&self, transactions: Vec<Transaction>) -> Block {
        let height = self.blockchain.current_index().expect("height");
        let prev_hash = self.blockchain.current_hash().expect("tip");
        let verification = multisig_redeem_script(1, &[self.validator.public_key().clone()])
            .expect("1-of-1 script");

        let mut block = Block {
            header: Header {
                version: 0,
                prev_hash,
                merkle_root: neo_types::Hash256::zero(),
                timestamp_ms: self.settings.genesis_timestamp_ms
                    + u64::from(height + 1) * self.settings.milliseconds_per_block,
                nonce: u64::from(height) + 7,
                index: height + 1,
                primary_index: 0,
                next_consensus: self.consensus_account(),
                witness: Witness::default(),
            },
            transactions,
        };
        block.header.merkle_root = block.compute_merkle_root();

        let signature = self.validator.sign(&self.sign_data(&block.hash()));
        let mut invocation = Vec::with_capacity(66);
        invocation.push(0x0C); // PUSHDATA1
        invocation.push(64);
        invocation.extend_from_slice(signature.as_bytes());
        block.header.witness = Witness {
            invocation_script: invocation,
            verification_script: verification,
        };
        block
    }
}
