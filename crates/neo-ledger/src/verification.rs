//! Transaction and witness verification.
//!
//! Stateless shape checks live in the codec; this module holds the
//! stateful rules: expiry, policy limits, fee coverage, conflict
//! attributes, and the execution of witness verification scripts under
//! the `Verification` trigger with the network fee as the gas budget.

use crate::error::VerifyResult;
use neo_contract::natives::{ledger_contract, policy};
use neo_contract::{ApplicationEngine, CallFlags, NativeRegistry, TriggerType};
use neo_store::DataCache;
use neo_types::io::Serializable;
use neo_types::transaction::MAX_TRANSACTION_SIZE;
use neo_types::{Block, Hash256, ProtocolSettings, Transaction};
use neo_vm::VMState;
use std::sync::Arc;
use tracing::debug;

/// Immutable context shared by every verifier.
pub struct VerifierContext {
    /// Network parameters.
    pub settings: Arc<ProtocolSettings>,
    /// The native set.
    pub natives: Arc<NativeRegistry>,
}

impl VerifierContext {
    /// Bundle settings and natives.
    #[must_use]
    pub fn new(settings: Arc<ProtocolSettings>, natives: Arc<NativeRegistry>) -> Self {
        Self { settings, natives }
    }
}

/// Verify one transaction against `snapshot` at height `height`.
///
/// Runs the full rule set; the caller decides what to do with the
/// result (pool it, reject the block, penalize the peer).
pub fn verify_transaction(
    context: &VerifierContext,
    snapshot: &mut DataCache,
    tx: &Transaction,
    height: u32,
) -> VerifyResult {
    let size = tx.size();
    if size > MAX_TRANSACTION_SIZE {
        return VerifyResult::Invalid(format!("{size} bytes exceeds the transaction cap"));
    }

    // Expiry window.
    if tx.valid_until_block <= height {
        return VerifyResult::Expired;
    }
    let max_increment = context.settings.max_valid_until_block_increment;
    if tx.valid_until_block > height + max_increment {
        return VerifyResult::Invalid(format!(
            "valid_until_block {} too far ahead",
            tx.valid_until_block
        ));
    }

    // Policy checks.
    if tx.system_fee > policy::max_block_system_fee(snapshot) {
        return VerifyResult::PolicyFailed("system fee above block budget".into());
    }
    for signer in &tx.signers {
        if policy::is_blocked(snapshot, &signer.account) {
            return VerifyResult::PolicyFailed(format!("account {} blocked", signer.account));
        }
    }

    // The flat part of the network fee: size plus attribute surcharges.
    let mut required_fee = tx.size() as i64 * policy::fee_per_byte(snapshot);
    for attribute in &tx.attributes {
        required_fee =
            required_fee.saturating_add(policy::attribute_fee(snapshot, attribute.type_byte()));
    }
    if tx.network_fee < required_fee {
        return VerifyResult::InsufficientFunds;
    }

    // Conflicts already settled on-chain block the transaction.
    for conflict in tx.conflicts() {
        if conflict == tx.hash() {
            return VerifyResult::Invalid("transaction conflicts with itself".into());
        }
        if let Ok(Some(_)) = ledger_contract::transaction_height(snapshot, &conflict) {
            return VerifyResult::HasConflicts;
        }
    }

    // Witness scripts run inside the remaining network-fee budget.
    let witness_budget = tx.network_fee - required_fee;
    verify_witnesses(context, snapshot, tx, witness_budget)
}

/// Run every witness verification script of `tx`.
pub fn verify_witnesses(
    context: &VerifierContext,
    snapshot: &mut DataCache,
    tx: &Transaction,
    gas_budget: i64,
) -> VerifyResult {
    let mut remaining = gas_budget;
    for (signer, witness) in tx.signers.iter().zip(&tx.witnesses) {
        if witness.verification_script.is_empty() {
            return VerifyResult::Invalid("contract witnesses are not verifiable here".into());
        }
        if witness.script_hash() != signer.account {
            return VerifyResult::Invalid(format!(
                "witness hash mismatch for signer {}",
                signer.account
            ));
        }

        let mut engine = ApplicationEngine::new(
            TriggerType::Verification,
            Some(tx.clone()),
            snapshot.snapshot(),
            None,
            context.settings.clone(),
            context.natives.clone(),
            remaining,
        );
        let loaded = engine
            .load_entry_script(witness.verification_script.clone(), CallFlags::READ_ONLY)
            .and_then(|()| {
                engine
                    .load_invocation_script(witness.invocation_script.clone())
                    .map_err(Into::into)
            });
        if let Err(error) = loaded {
            return VerifyResult::Invalid(error.to_string());
        }
        let state = engine.execute();
        remaining -= engine.gas_consumed();
        if state != VMState::Halt {
            debug!(reason = ?engine.exception(), "witness script did not halt");
            return VerifyResult::Invalid("witness verification faulted".into());
        }
        let accepted = engine
            .result_stack()
            .last()
            .map(neo_vm::StackItem::to_boolean)
            .unwrap_or(false);
        if !accepted {
            return VerifyResult::Invalid("witness verification returned false".into());
        }
        if remaining < 0 {
            return VerifyResult::InsufficientFunds;
        }
    }
    VerifyResult::Succeed
}

/// Verify a block header's consensus witness against the previous tip.
pub fn verify_block_witness(
    context: &VerifierContext,
    snapshot: &mut DataCache,
    block: &Block,
    expected_consensus: neo_types::Hash160,
) -> VerifyResult {
    let witness = &block.header.witness;
    if witness.script_hash() != expected_consensus {
        return VerifyResult::Invalid("consensus witness hash mismatch".into());
    }
    let mut engine = ApplicationEngine::new(
        TriggerType::Verification,
        None,
        snapshot.snapshot(),
        None,
        context.settings.clone(),
        context.natives.clone(),
        neo_contract::engine::MAX_VERIFICATION_GAS,
    );
    engine.host.container_hash = Some(block.hash());
    let loaded = engine
        .load_entry_script(witness.verification_script.clone(), CallFlags::READ_ONLY)
        .and_then(|()| {
            engine
                .load_invocation_script(witness.invocation_script.clone())
                .map_err(Into::into)
        });
    if let Err(error) = loaded {
        return VerifyResult::Invalid(error.to_string());
    }
    if engine.execute() != VMState::Halt {
        return VerifyResult::Invalid("consensus witness faulted".into());
    }
    let accepted = engine
        .result_stack()
        .last()
        .map(neo_vm::StackItem::to_boolean)
        .unwrap_or(false);
    if accepted {
        VerifyResult::Succeed
    } else {
        VerifyResult::Invalid("consensus witness returned false".into())
    }
}

/// Signer sets overlap when any account appears in both transactions.
#[must_use]
pub fn signers_overlap(a: &Transaction, b: &Transaction) -> bool {
    a.signers
        .iter()
        .any(|signer| b.signers.iter().any(|other| other.account == signer.account))
}

/// True when `tx` declares a conflict with `hash`.
#[must_use]
pub fn declares_conflict(tx: &Transaction, hash: &Hash256) -> bool {
    tx.conflicts().any(|declared| declared == *hash)
}
