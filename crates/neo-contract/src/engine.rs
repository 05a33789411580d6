//! The application engine: the VM plus everything the host provides.

use crate::call_flags::CallFlags;
use crate::contract_state::ContractState;
use crate::error::ContractError;
use crate::natives::{self, NativeRegistry};
use crate::syscalls;
use crate::trigger::TriggerType;
use neo_store::DataCache;
use neo_types::{Block, Hash160, ProtocolSettings, Transaction};
use neo_vm::{ExecutionEngine, InteropHost, Script, StackItem, VMState, VmError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Gas units per whole GAS token.
pub const GAS_FACTOR: i64 = 100_000_000;

/// Default gas granted to verification-trigger runs.
pub const MAX_VERIFICATION_GAS: i64 = GAS_FACTOR / 2;

/// A `System.Runtime.Notify` event captured during execution.
#[derive(Clone, Debug)]
pub struct NotifyEvent {
    /// Emitting contract.
    pub script_hash: Hash160,
    /// Event name.
    pub name: String,
    /// Serialized state items.
    pub state: Vec<Vec<u8>>,
}

/// A `System.Runtime.Log` event captured during execution.
#[derive(Clone, Debug)]
pub struct LogEvent {
    /// Emitting contract.
    pub script_hash: Hash160,
    /// Message.
    pub message: String,
}

/// One call frame: which contract runs with which rights.
#[derive(Clone, Debug)]
pub struct Frame {
    /// VM invocation depth this frame belongs to.
    pub depth: usize,
    /// Executing contract hash.
    pub script_hash: Hash160,
    /// Rights granted to this frame.
    pub flags: CallFlags,
}

/// Host-side state the syscall surface operates on.
pub struct HostState {
    /// Why this execution is running.
    pub trigger: TriggerType,
    /// The state view this execution reads and writes.
    pub snapshot: DataCache,
    /// Network parameters.
    pub settings: Arc<ProtocolSettings>,
    /// The transaction being executed, if any.
    pub tx: Option<Transaction>,
    /// Hash of the signed container when it is not a transaction (a
    /// block header under witness verification).
    pub container_hash: Option<neo_types::Hash256>,
    /// The block being persisted, if any.
    pub persisting_block: Option<Block>,
    /// Captured notifications, in emission order.
    pub notifications: Vec<NotifyEvent>,
    /// Captured log messages.
    pub logs: Vec<LogEvent>,
    /// The closed native-contract set.
    pub natives: Arc<NativeRegistry>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) invocation_counters: HashMap<Hash160, u32>,
    pub(crate) random_counter: u64,
}

impl HostState {
    /// Drop frames belonging to contexts that have returned.
    pub(crate) fn prune_frames(&mut self, vm_depth: usize) {
        while self
            .frames
            .last()
            .is_some_and(|frame| frame.depth > vm_depth)
        {
            self.frames.pop();
        }
    }

    /// The innermost live frame.
    pub(crate) fn current_frame(&mut self, vm_depth: usize) -> Result<&Frame, ContractError> {
        self.prune_frames(vm_depth);
        self.frames
            .last()
            .ok_or_else(|| ContractError::Other("no active frame".into()))
    }

    /// Executing contract hash.
    pub fn executing_hash(&mut self, vm_depth: usize) -> Result<Hash160, ContractError> {
        Ok(self.current_frame(vm_depth)?.script_hash)
    }

    /// The frame below the executing one (the caller), if any.
    pub fn calling_hash(&mut self, vm_depth: usize) -> Result<Option<Hash160>, ContractError> {
        self.prune_frames(vm_depth);
        if self.frames.len() < 2 {
            return Ok(None);
        }
        Ok(Some(self.frames[self.frames.len() - 2].script_hash))
    }

    /// The entry frame's hash.
    pub fn entry_hash(&self) -> Option<Hash160> {
        self.frames.first().map(|frame| frame.script_hash)
    }

    /// Look up a deployed contract by hash.
    pub fn contract_state(&mut self, hash: &Hash160) -> Result<Option<ContractState>, ContractError> {
        natives::contract_management::get_contract(&mut self.snapshot, hash)
    }
}

impl InteropHost for HostState {
    fn syscall(&mut self, engine: &mut ExecutionEngine, number: u32) -> Result<(), VmError> {
        syscalls::dispatch(self, engine, number).map_err(VmError::from)
    }
}

// =============================================================================
// APPLICATION ENGINE
// =============================================================================

/// The VM paired with its host state.
pub struct ApplicationEngine {
    /// The stack machine.
    pub vm: ExecutionEngine,
    /// Host state visible to syscalls.
    pub host: HostState,
}

impl ApplicationEngine {
    /// Create an engine for one execution.
    #[must_use]
    pub fn new(
        trigger: TriggerType,
        tx: Option<Transaction>,
        snapshot: DataCache,
        persisting_block: Option<Block>,
        settings: Arc<ProtocolSettings>,
        natives: Arc<NativeRegistry>,
        gas_limit: i64,
    ) -> Self {
        let mut snapshot = snapshot;
        let fee_factor = natives::policy::exec_fee_factor(&mut snapshot);
        let mut vm = ExecutionEngine::new(gas_limit);
        vm.set_fee_factor(i64::from(fee_factor));
        Self {
            vm,
            host: HostState {
                trigger,
                snapshot,
                settings,
                container_hash: tx.as_ref().map(Transaction::hash),
                tx,
                persisting_block,
                notifications: Vec::new(),
                logs: Vec::new(),
                natives,
                frames: Vec::new(),
                invocation_counters: HashMap::new(),
                random_counter: 0,
            },
        }
    }

    /// Load the entry script with the given rights.
    pub fn load_entry_script(
        &mut self,
        script: Vec<u8>,
        flags: CallFlags,
    ) -> Result<(), ContractError> {
        let script_hash = Hash160::from_script(&script);
        self.vm.load_script(Script::new(script))?;
        self.host.frames.push(Frame {
            depth: self.vm.invocation_depth(),
            script_hash,
            flags,
        });
        *self
            .host
            .invocation_counters
            .entry(script_hash)
            .or_insert(0) += 1;
        Ok(())
    }

    /// Load an invocation script on top of the entry script. It runs
    /// first; whatever it leaves on its stack flows to the entry
    /// context when it returns, which is how witness arguments reach
    /// the verification script.
    pub fn load_invocation_script(&mut self, script: Vec<u8>) -> Result<(), VmError> {
        self.vm.load_script(Script::new(script))
    }

    /// Run to completion.
    pub fn execute(&mut self) -> VMState {
        let state = self.vm.execute(&mut self.host);
        debug!(
            state = ?state,
            gas = self.vm.gas_consumed(),
            trigger = ?self.host.trigger,
            "script execution finished"
        );
        state
    }

    /// Final state.
    #[must_use]
    pub fn state(&self) -> VMState {
        self.vm.state()
    }

    /// Fault reason, when faulted.
    #[must_use]
    pub fn exception(&self) -> Option<&str> {
        self.vm.exception()
    }

    /// Gas consumed so far.
    #[must_use]
    pub fn gas_consumed(&self) -> i64 {
        self.vm.gas_consumed()
    }

    /// Result stack after HALT.
    #[must_use]
    pub fn result_stack(&self) -> &[StackItem] {
        self.vm.result_stack()
    }

    /// Give back the snapshot (with all writes) for committing.
    #[must_use]
    pub fn into_snapshot(self) -> DataCache {
        self.host.snapshot
    }
}

// =============================================================================
// CONTRACT CALLS
// =============================================================================

/// Invoke `method` on the contract at `hash` from the current frame.
///
/// Natives dispatch inline through their method tables; deployed
/// contracts get a fresh VM context positioned at the method offset.
pub fn call_contract(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    hash: Hash160,
    method: &str,
    args: Vec<StackItem>,
    requested_flags: CallFlags,
) -> Result<(), ContractError> {
    if method.starts_with('_') {
        return Err(ContractError::MethodNotFound(format!(
            "{method} (system methods are not callable)"
        )));
    }
    let caller_flags = host.current_frame(engine.invocation_depth())?.flags;
    caller_flags.require(CallFlags::ALLOW_CALL)?;
    let granted = caller_flags.intersect(requested_flags);

    *host.invocation_counters.entry(hash).or_insert(0) += 1;

    if let Some(native) = Arc::clone(&host.natives).by_hash(&hash) {
        let method_entry = native
            .methods()
            .iter()
            .find(|m| m.name == method)
            .ok_or_else(|| ContractError::MethodNotFound(format!("{}::{method}", native.name())))?;
        granted.require(method_entry.required_flags)?;
        engine.charge(method_entry.price)?;

        host.frames.push(Frame {
            depth: engine.invocation_depth(),
            script_hash: hash,
            flags: granted,
        });
        let result = (method_entry.handler)(host, engine, args);
        host.frames.pop();
        engine.push(result?)?;
        return Ok(());
    }

    let contract = host
        .contract_state(&hash)?
        .ok_or_else(|| ContractError::ContractNotFound(hash.to_string()))?;
    let descriptor = contract
        .manifest
        .abi
        .method(method, args.len())
        .ok_or_else(|| ContractError::MethodNotFound(format!("{}::{method}", contract.manifest.name)))?
        .clone();
    let safe_flags = if descriptor.safe {
        granted.intersect(CallFlags::READ_ONLY)
    } else {
        granted
    };

    engine.load_script(Script::new(contract.nef.script.clone()))?;
    set_entry_offset(engine, descriptor.offset as usize)?;
    host.frames.push(Frame {
        depth: engine.invocation_depth(),
        script_hash: hash,
        flags: safe_flags,
    });
    // Arguments are pushed onto the callee's fresh stack, first argument
    // on top.
    for arg in args.into_iter().rev() {
        engine.push(arg)?;
    }
    Ok(())
}

fn set_entry_offset(engine: &mut ExecutionEngine, offset: usize) -> Result<(), ContractError> {
    // The freshly loaded context is innermost; retarget its ip.
    let depth = engine.invocation_depth();
    if depth == 0 {
        return Err(ContractError::Other("no context loaded".into()));
    }
    engine.set_context_ip(offset).map_err(ContractError::from)
}
