//! Executing real entry scripts through block persistence: a GAS
//! transfer invoked via `System.Contract.Call`, state-root movement and
//! ledger index updates.

use neo_contract::natives::{gas_token, ledger_contract, native_contract_hash};
use neo_contract::syscalls::syscall_number;
use neo_ledger::VerifyResult;
use neo_tests::TestChain;
use neo_types::io::Serializable;
use neo_types::signer::Signer;
use neo_types::witness::{Witness, WitnessScopes};
use neo_types::{Hash160, Transaction};
use num_bigint::BigInt;

/// Emit a `System.Contract.Call` of `method` on `contract` with the
/// given pre-pushed argument count; the caller emits the args first.
fn emit_contract_call(script: &mut Vec<u8>, contract: &Hash160, method: &str, arg_count: u8) {
    // Pack the already-pushed arguments.
    script.push(0x10 + arg_count); // PUSH<n>
    script.push(0xC0); // PACK
    script.push(0x1F); // PUSH15 = CallFlags::ALL
    script.push(0x0C); // PUSHDATA1 method
    script.push(method.len() as u8);
    script.extend_from_slice(method.as_bytes());
    script.push(0x0C); // PUSHDATA1 contract hash
    script.push(20);
    script.extend_from_slice(contract.as_bytes());
    script.push(0x41); // SYSCALL
    script.extend_from_slice(&syscall_number("System.Contract.Call").to_le_bytes());
}

fn push_bytes(script: &mut Vec<u8>, bytes: &[u8]) {
    script.push(0x0C); // PUSHDATA1
    script.push(bytes.len() as u8);
    script.extend_from_slice(bytes);
}

fn push_int64(script: &mut Vec<u8>, value: i64) {
    script.push(0x03); // PUSHINT64
    script.extend_from_slice(&value.to_le_bytes());
}

#[test]
fn gas_transfer_executes_inside_a_block() {
    let chain = TestChain::new(100);
    let committee = chain.consensus_account();
    let recipient = Hash160([0xAB; 20]);
    let amount: i64 = 3 * 100_000_000;

    // Entry script: GasToken.transfer(committee, recipient, amount, null).
    // PACK consumes items top-down, so push the last argument first.
    let mut script = Vec::new();
    script.push(0x0B); // PUSHNULL (data)
    push_int64(&mut script, amount);
    push_bytes(&mut script, recipient.as_bytes());
    push_bytes(&mut script, committee.as_bytes());
    emit_contract_call(
        &mut script,
        &native_contract_hash("GasToken"),
        "transfer",
        4,
    );

    // The committee's 1-of-1 multi-sig signs the transaction.
    let verification = neo_types::contract_script::multisig_redeem_script(
        1,
        &[chain.validator.public_key().clone()],
    )
    .unwrap();
    let mut tx = Transaction {
        version: 0,
        nonce: 777,
        system_fee: 100_000_000,
        network_fee: 10_000_000,
        valid_until_block: 100,
        signers: vec![Signer::with_scope(committee, WitnessScopes::GLOBAL)],
        attributes: vec![],
        script,
        witnesses: vec![Witness {
            invocation_script: vec![0u8; 66],
            verification_script: verification,
        }],
    };
    let signature = chain.validator.sign(&chain.sign_data(&tx.hash()));
    let mut invocation = vec![0x0C, 64];
    invocation.extend_from_slice(signature.as_bytes());
    tx.witnesses[0].invocation_script = invocation;

    let balance_before = {
        let mut snapshot = chain.blockchain.snapshot();
        gas_token::balance_of(&mut snapshot, &committee).unwrap()
    };

    let block = chain.next_block(vec![tx.clone()]);
    let result = chain.blockchain.on_new_block(block).unwrap();
    assert_eq!(result, VerifyResult::Succeed);

    let mut snapshot = chain.blockchain.snapshot();
    assert_eq!(
        gas_token::balance_of(&mut snapshot, &recipient).unwrap(),
        BigInt::from(amount)
    );
    // Sender paid the amount plus both fees (the primary reward returns
    // the network fee to the committee's validator, a different account).
    let balance_after = gas_token::balance_of(&mut snapshot, &committee).unwrap();
    assert_eq!(
        balance_after,
        balance_before - amount - tx.system_fee - tx.network_fee
    );

    // The ledger indices reflect the inclusion.
    assert_eq!(
        ledger_contract::transaction_height(&mut snapshot, &tx.hash()).unwrap(),
        Some(1)
    );
    let fetched = ledger_contract::transaction_by_hash(&mut snapshot, &tx.hash())
        .unwrap()
        .expect("stored transaction");
    assert_eq!(fetched.hash(), tx.hash());
}

#[test]
fn state_root_moves_with_every_block_and_tracks_cells() {
    let chain = TestChain::new(100);
    let current_root = || {
        let mut snapshot = chain.blockchain.snapshot();
        snapshot
            .get(&neo_store::StorageKey::new(
                ledger_contract::LEDGER_META_ID,
                ledger_contract::KEY_STATE_ROOT.to_vec(),
            ))
            .unwrap()
            .map(|item| item.value)
            .unwrap_or_default()
    };

    let genesis_root = current_root();
    assert_eq!(genesis_root.len(), 32);

    let block = chain.next_block(vec![]);
    chain.blockchain.on_new_block(block).unwrap();
    let root_after = current_root();
    // Post-persist GAS minting to the committee member changes state
    // every block, so the root must move.
    assert_ne!(genesis_root, root_after);
}

#[test]
fn faulted_transaction_keeps_its_fee_burn_but_no_writes() {
    let chain = TestChain::new(100);
    let committee = chain.consensus_account();

    // An entry script that always aborts.
    let script = vec![0x38]; // ABORT
    let verification = neo_types::contract_script::multisig_redeem_script(
        1,
        &[chain.validator.public_key().clone()],
    )
    .unwrap();
    let mut tx = Transaction {
        version: 0,
        nonce: 8,
        system_fee: 50_000_000,
        network_fee: 10_000_000,
        valid_until_block: 100,
        signers: vec![Signer::with_scope(committee, WitnessScopes::GLOBAL)],
        attributes: vec![],
        script,
        witnesses: vec![Witness {
            invocation_script: vec![0u8; 66],
            verification_script: verification,
        }],
    };
    let signature = chain.validator.sign(&chain.sign_data(&tx.hash()));
    let mut invocation = vec![0x0C, 64];
    invocation.extend_from_slice(signature.as_bytes());
    tx.witnesses[0].invocation_script = invocation;

    let balance_before = {
        let mut snapshot = chain.blockchain.snapshot();
        gas_token::balance_of(&mut snapshot, &committee).unwrap()
    };

    let block = chain.next_block(vec![tx.clone()]);
    assert!(chain.blockchain.on_new_block(block).unwrap().is_ok());
    assert_eq!(chain.blockchain.current_index().unwrap(), 1);

    let mut snapshot = chain.blockchain.snapshot();
    let balance_after = gas_token::balance_of(&mut snapshot, &committee).unwrap();
    // Fees are burned in OnPersist even though the script faulted.
    assert_eq!(
        balance_after,
        balance_before - tx.system_fee - tx.network_fee
    );
}
