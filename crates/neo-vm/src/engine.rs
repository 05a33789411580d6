//! The execution engine: main loop, jump-table dispatch, exception
//! unwinding and gas accounting.

use crate::context::{ExceptionFrame, ExecutionContext, TryState};
use crate::error::VmError;
use crate::limits::ExecutionEngineLimits;
use crate::opcode::OpCode;
use crate::reference_counter::ReferenceCounter;
use crate::script::{Instruction, Script};
use crate::stack_item::{ItemType, StackItem};
use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};
use std::cell::RefCell;
use std::rc::Rc;

/// Final (or intermediate) machine state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VMState {
    /// Still executing.
    None,
    /// Script completed; results are on the result stack.
    Halt,
    /// Execution failed; see the engine's exception string.
    Fault,
    /// Paused by a debugger.
    Break,
}

/// Host surface for `SYSCALL` and `CALLT`.
///
/// The engine knows nothing about storage, contracts or the ledger; the
/// smart-contract layer implements this trait and receives the engine to
/// pop arguments from and push results to.
pub trait InteropHost {
    /// Dispatch a syscall by its 32-bit name hash.
    fn syscall(&mut self, engine: &mut ExecutionEngine, number: u32) -> Result<(), VmError>;

    /// Dispatch a `CALLT` method token.
    fn call_token(&mut self, engine: &mut ExecutionEngine, token: u16) -> Result<(), VmError> {
        let _ = engine;
        Err(VmError::SyscallFailed(format!(
            "method token {token} not available"
        )))
    }
}

/// A host with no services; every syscall faults.
pub struct NullHost;

impl InteropHost for NullHost {
    fn syscall(&mut self, _engine: &mut ExecutionEngine, number: u32) -> Result<(), VmError> {
        Err(VmError::UnknownSyscall(number))
    }
}

/// Per-word surcharge applied to payload-sized operations.
const PAYLOAD_WORD_PRICE: i64 = 1 << 2;

fn payload_price(len: usize) -> i64 {
    (len as i64).div_euclid(32).saturating_add(1) * PAYLOAD_WORD_PRICE
}

// =============================================================================
// ENGINE
// =============================================================================

/// The stack machine.
pub struct ExecutionEngine {
    invocation_stack: Vec<ExecutionContext>,
    result_stack: Vec<StackItem>,
    state: VMState,
    exception: Option<String>,
    gas_limit: i64,
    gas_consumed: i64,
    fee_factor: i64,
    limits: ExecutionEngineLimits,
    refs: ReferenceCounter,
}

impl ExecutionEngine {
    /// An engine with the given gas budget and default limits.
    #[must_use]
    pub fn new(gas_limit: i64) -> Self {
        Self::with_limits(gas_limit, ExecutionEngineLimits::default())
    }

    /// An engine with explicit limits.
    #[must_use]
    pub fn with_limits(gas_limit: i64, limits: ExecutionEngineLimits) -> Self {
        Self {
            invocation_stack: Vec::new(),
            result_stack: Vec::new(),
            state: VMState::None,
            exception: None,
            gas_limit,
            gas_consumed: 0,
            fee_factor: 1,
            limits,
            refs: ReferenceCounter::new(),
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Current machine state.
    #[must_use]
    pub fn state(&self) -> VMState {
        self.state
    }

    /// Fault reason, set when `state` is `Fault`.
    #[must_use]
    pub fn exception(&self) -> Option<&str> {
        self.exception.as_deref()
    }

    /// Gas consumed so far.
    #[must_use]
    pub fn gas_consumed(&self) -> i64 {
        self.gas_consumed
    }

    /// Gas remaining in the budget.
    #[must_use]
    pub fn gas_left(&self) -> i64 {
        self.gas_limit - self.gas_consumed
    }

    /// The engine's limits.
    #[must_use]
    pub fn limits(&self) -> &ExecutionEngineLimits {
        &self.limits
    }

    /// Items left on the result stack after HALT, bottom first.
    #[must_use]
    pub fn result_stack(&self) -> &[StackItem] {
        &self.result_stack
    }

    /// Take the result stack, releasing its reference counts.
    pub fn take_results(&mut self) -> Vec<StackItem> {
        let items = std::mem::take(&mut self.result_stack);
        for item in &items {
            self.refs.remove(item);
        }
        items
    }

    /// Live slot count in the reference counter.
    #[must_use]
    pub fn reference_count(&self) -> usize {
        self.refs.count()
    }

    /// Invocation depth.
    #[must_use]
    pub fn invocation_depth(&self) -> usize {
        self.invocation_stack.len()
    }

    /// The executing context, innermost.
    #[must_use]
    pub fn current_context(&self) -> Option<&ExecutionContext> {
        self.invocation_stack.last()
    }

    /// Multiply every charge by `factor` (the execution fee factor).
    pub fn set_fee_factor(&mut self, factor: i64) {
        self.fee_factor = factor.max(1);
    }

    /// Reposition the innermost context; hosts use this to enter a
    /// contract method at its declared offset.
    pub fn set_context_ip(&mut self, ip: usize) -> Result<(), VmError> {
        let context = self
            .invocation_stack
            .last_mut()
            .ok_or(VmError::StackUnderflow)?;
        if ip > context.script.len() {
            return Err(VmError::InvalidJump(ip as i64));
        }
        context.ip = ip;
        Ok(())
    }

    // =========================================================================
    // LOADING & RUNNING
    // =========================================================================

    /// Push a fresh context for `script`.
    pub fn load_script(&mut self, script: Script) -> Result<(), VmError> {
        if script.len() > self.limits.max_script_length {
            return Err(VmError::ScriptTooLong(script.len()));
        }
        self.load_context(ExecutionContext::new(script))
    }

    /// Push a prepared context.
    pub fn load_context(&mut self, context: ExecutionContext) -> Result<(), VmError> {
        if self.invocation_stack.len() >= self.limits.max_invocation_nesting {
            return Err(VmError::InvocationOverflow);
        }
        self.invocation_stack.push(context);
        Ok(())
    }

    /// Run to completion. Returns the final state; a faulted engine keeps
    /// its gas accounting and exposes the reason via [`Self::exception`].
    pub fn execute(&mut self, host: &mut dyn InteropHost) -> VMState {
        if self.state == VMState::None && self.invocation_stack.is_empty() {
            self.state = VMState::Halt;
        }
        while self.state == VMState::None {
            if let Err(error) = self.step(host) {
                self.exception = Some(error.to_string());
                self.state = VMState::Fault;
            }
        }
        self.state
    }

    fn step(&mut self, host: &mut dyn InteropHost) -> Result<(), VmError> {
        let (script, position) = {
            let context = self
                .invocation_stack
                .last()
                .ok_or(VmError::StackUnderflow)?;
            (context.script.clone(), context.ip)
        };

        // Running off the end of a script is an implicit RET.
        if position >= script.len() {
            return self.ret();
        }

        let instruction = script.instruction_at(position)?;
        let mut price = instruction.opcode.price();
        if instruction.opcode.operand_prefix() > 0 {
            price = price.saturating_add(payload_price(instruction.operand.len()));
        }
        self.charge(price)?;

        if let Some(context) = self.invocation_stack.last_mut() {
            context.ip = position + instruction.encoded_len;
        }
        self.dispatch(host, &instruction, position)
    }

    /// Consume `units * fee_factor` gas; underflow faults.
    pub fn charge(&mut self, units: i64) -> Result<(), VmError> {
        self.charge_raw(units.saturating_mul(self.fee_factor))
    }

    /// Consume an absolute gas amount, bypassing the fee factor (storage
    /// pricing and explicit burns are already denominated in gas units).
    pub fn charge_raw(&mut self, amount: i64) -> Result<(), VmError> {
        self.gas_consumed = self.gas_consumed.saturating_add(amount);
        if self.gas_consumed > self.gas_limit {
            return Err(VmError::OutOfGas);
        }
        Ok(())
    }

    // =========================================================================
    // STACK PRIMITIVES
    // =========================================================================

    fn stack(&self) -> Result<Rc<RefCell<Vec<StackItem>>>, VmError> {
        self.invocation_stack
            .last()
            .map(|c| Rc::clone(&c.eval_stack))
            .ok_or(VmError::StackUnderflow)
    }

    /// Push onto the current evaluation stack.
    pub fn push(&mut self, item: StackItem) -> Result<(), VmError> {
        self.refs.add(&item, self.limits.max_stack_size)?;
        self.stack()?.borrow_mut().push(item);
        Ok(())
    }

    /// Pop from the current evaluation stack.
    pub fn pop(&mut self) -> Result<StackItem, VmError> {
        let item = self
            .stack()?
            .borrow_mut()
            .pop()
            .ok_or(VmError::StackUnderflow)?;
        self.refs.remove(&item);
        Ok(item)
    }

    /// Peek at depth `n` (0 = top) without removing.
    pub fn peek(&self, n: usize) -> Result<StackItem, VmError> {
        let stack = self.stack()?;
        let stack = stack.borrow();
        if n >= stack.len() {
            return Err(VmError::StackUnderflow);
        }
        Ok(stack[stack.len() - 1 - n].clone())
    }

    /// Pop and coerce to integer.
    pub fn pop_integer(&mut self) -> Result<BigInt, VmError> {
        self.pop()?.to_integer()
    }

    /// Pop and coerce to bytes.
    pub fn pop_bytes(&mut self) -> Result<Vec<u8>, VmError> {
        self.pop()?.to_byte_vec()
    }

    /// Pop and coerce to boolean.
    pub fn pop_bool(&mut self) -> Result<bool, VmError> {
        Ok(self.pop()?.to_boolean())
    }

    /// Pop a non-negative index.
    pub fn pop_index(&mut self) -> Result<usize, VmError> {
        self.pop()?.to_index()
    }

    fn push_integer(&mut self, value: BigInt) -> Result<(), VmError> {
        self.push(StackItem::Integer(StackItem::check_integer(value)?))
    }

    // =========================================================================
    // CONTEXT TRANSITIONS
    // =========================================================================

    fn ret(&mut self) -> Result<(), VmError> {
        let context = self
            .invocation_stack
            .pop()
            .ok_or(VmError::StackUnderflow)?;

        // Release slot references.
        if let Some(locals) = &context.local_variables {
            for item in locals {
                self.refs.remove(item);
            }
        }
        if let Some(arguments) = &context.arguments {
            for item in arguments {
                self.refs.remove(item);
            }
        }
        if Rc::strong_count(&context.static_fields) == 1 {
            if let Some(statics) = context.static_fields.borrow().as_ref() {
                for item in statics {
                    self.refs.remove(item);
                }
            }
        }

        let shares_with_parent = self
            .invocation_stack
            .last()
            .is_some_and(|parent| parent.shares_stack_with(&context));

        if !shares_with_parent {
            // Move the finished context's items (order preserved) to the
            // caller's stack, or to the result stack on final return.
            let items: Vec<StackItem> = context.eval_stack.borrow_mut().drain(..).collect();
            match self.invocation_stack.last() {
                Some(parent) => parent.eval_stack.borrow_mut().extend(items),
                None => self.result_stack.extend(items),
            }
        }

        if self.invocation_stack.is_empty() {
            self.state = VMState::Halt;
        }
        Ok(())
    }

    fn jump_target(&self, base: usize, offset: i64) -> Result<usize, VmError> {
        let target = base as i64 + offset;
        let len = self
            .invocation_stack
            .last()
            .map(|c| c.script.len() as i64)
            .unwrap_or(0);
        if target < 0 || target > len {
            return Err(VmError::InvalidJump(target));
        }
        Ok(target as usize)
    }

    fn jump_to(&mut self, target: usize) -> Result<(), VmError> {
        self.invocation_stack
            .last_mut()
            .ok_or(VmError::StackUnderflow)?
            .ip = target;
        Ok(())
    }

    fn call_at(&mut self, target: usize) -> Result<(), VmError> {
        let clone = self
            .invocation_stack
            .last()
            .ok_or(VmError::StackUnderflow)?
            .clone_at(target);
        self.load_context(clone)
    }

    // =========================================================================
    // EXCEPTION UNWINDING
    // =========================================================================

    fn throw_item(&mut self, exception: StackItem) -> Result<(), VmError> {
        enum Unwind {
            EnterCatch,
            EnterFinally,
            NextFrame,
            NextContext,
        }

        let mut pending = exception;
        while !self.invocation_stack.is_empty() {
            let action = {
                let context = self
                    .invocation_stack
                    .last_mut()
                    .expect("stack checked non-empty");
                match context.try_stack.last_mut() {
                    Some(frame) => match frame.state {
                        TryState::Try if frame.catch_ip.is_some() => {
                            frame.state = TryState::Catch;
                            context.ip = frame.catch_ip.expect("checked above");
                            Unwind::EnterCatch
                        }
                        TryState::Try | TryState::Catch => {
                            if let Some(finally_ip) = frame.finally_ip {
                                frame.state = TryState::Finally;
                                frame.pending =
                                    Some(std::mem::replace(&mut pending, StackItem::Null));
                                context.ip = finally_ip;
                                Unwind::EnterFinally
                            } else {
                                context.try_stack.pop();
                                Unwind::NextFrame
                            }
                        }
                        TryState::Finally => {
                            // An exception during finally abandons the frame.
                            context.try_stack.pop();
                            Unwind::NextFrame
                        }
                    },
                    None => Unwind::NextContext,
                }
            };

            match action {
                Unwind::EnterCatch => {
                    self.push(pending)?;
                    return Ok(());
                }
                Unwind::EnterFinally => return Ok(()),
                Unwind::NextFrame => continue,
                Unwind::NextContext => {
                    // No handler in this context; unwind into the caller.
                    self.ret()?;
                    if self.state == VMState::Halt {
                        break;
                    }
                }
            }
        }

        let description = match &pending {
            StackItem::ByteString(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            other => format!("{other:?}"),
        };
        Err(VmError::UncaughtException(description))
    }

    // =========================================================================
    // SLOTS
    // =========================================================================

    fn load_static(&mut self, index: usize) -> Result<(), VmError> {
        let context = self
            .invocation_stack
            .last()
            .ok_or(VmError::StackUnderflow)?;
        let fields = Rc::clone(&context.static_fields);
        let fields = fields.borrow();
        let slots = fields
            .as_ref()
            .ok_or_else(|| VmError::SlotMisuse("static slots not initialized".into()))?;
        let item = slots
            .get(index)
            .ok_or(VmError::SlotOutOfRange {
                index,
                len: slots.len(),
            })?
            .clone();
        drop(fields);
        self.push(item)
    }

    fn store_static(&mut self, index: usize) -> Result<(), VmError> {
        let item = self.pop()?;
        self.refs.add(&item, self.limits.max_stack_size)?;
        let context = self
            .invocation_stack
            .last()
            .ok_or(VmError::StackUnderflow)?;
        let fields = Rc::clone(&context.static_fields);
        let mut fields = fields.borrow_mut();
        let slots = fields
            .as_mut()
            .ok_or_else(|| VmError::SlotMisuse("static slots not initialized".into()))?;
        let len = slots.len();
        let slot = slots
            .get_mut(index)
            .ok_or(VmError::SlotOutOfRange { index, len })?;
        self.refs.remove(slot);
        *slot = item;
        Ok(())
    }

    fn load_local(&mut self, argument: bool, index: usize) -> Result<(), VmError> {
        let context = self
            .invocation_stack
            .last()
            .ok_or(VmError::StackUnderflow)?;
        let slots = if argument {
            context.arguments.as_ref()
        } else {
            context.local_variables.as_ref()
        }
        .ok_or_else(|| VmError::SlotMisuse("slots not initialized".into()))?;
        let item = slots
            .get(index)
            .ok_or(VmError::SlotOutOfRange {
                index,
                len: slots.len(),
            })?
            .clone();
        self.push(item)
    }

    fn store_local(&mut self, argument: bool, index: usize) -> Result<(), VmError> {
        let item = self.pop()?;
        self.refs.add(&item, self.limits.max_stack_size)?;
        let context = self
            .invocation_stack
            .last_mut()
            .ok_or(VmError::StackUnderflow)?;
        let slots = if argument {
            context.arguments.as_mut()
        } else {
            context.local_variables.as_mut()
        }
        .ok_or_else(|| VmError::SlotMisuse("slots not initialized".into()))?;
        let len = slots.len();
        let slot = slots
            .get_mut(index)
            .ok_or(VmError::SlotOutOfRange { index, len })?;
        let old = std::mem::replace(slot, item);
        self.refs.remove(&old);
        Ok(())
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    #[allow(clippy::too_many_lines)]
    fn dispatch(
        &mut self,
        host: &mut dyn InteropHost,
        instruction: &Instruction,
        position: usize,
    ) -> Result<(), VmError> {
        use OpCode::*;
        let opcode = instruction.opcode;
        match opcode {
            // =================================================================
            // CONSTANTS
            // =================================================================
            PUSHINT8 | PUSHINT16 | PUSHINT32 | PUSHINT64 | PUSHINT128 | PUSHINT256 => {
                let value = BigInt::from_signed_bytes_le(&instruction.operand);
                self.push_integer(value)?;
            }
            PUSHT => self.push(StackItem::Boolean(true))?,
            PUSHF => self.push(StackItem::Boolean(false))?,
            PUSHA => {
                let offset = i64::from(instruction.operand_i32()?);
                let target = self.jump_target(position, offset)?;
                let script = self
                    .invocation_stack
                    .last()
                    .ok_or(VmError::StackUnderflow)?
                    .script
                    .bytes()
                    .clone();
                self.push(StackItem::Pointer {
                    script,
                    position: target,
                })?;
            }
            PUSHNULL => self.push(StackItem::Null)?,
            PUSHDATA1 | PUSHDATA2 | PUSHDATA4 => {
                if instruction.operand.len() > self.limits.max_item_size {
                    return Err(VmError::ItemTooLarge(instruction.operand.len()));
                }
                self.push(StackItem::byte_string(instruction.operand.clone()))?;
            }
            PUSHM1 | PUSH0 | PUSH1 | PUSH2 | PUSH3 | PUSH4 | PUSH5 | PUSH6 | PUSH7 | PUSH8
            | PUSH9 | PUSH10 | PUSH11 | PUSH12 | PUSH13 | PUSH14 | PUSH15 | PUSH16 => {
                let value = opcode as i64 - OpCode::PUSH0 as i64;
                self.push(StackItem::integer(value))?;
            }

            // =================================================================
            // CONTROL FLOW
            // =================================================================
            NOP => {}
            JMP | JMP_L => {
                let offset = self.branch_offset(instruction, opcode == JMP_L)?;
                let target = self.jump_target(position, offset)?;
                self.jump_to(target)?;
            }
            JMPIF | JMPIF_L | JMPIFNOT | JMPIFNOT_L => {
                let long = matches!(opcode, JMPIF_L | JMPIFNOT_L);
                let offset = self.branch_offset(instruction, long)?;
                let condition = self.pop_bool()?;
                let wanted = matches!(opcode, JMPIF | JMPIF_L);
                if condition == wanted {
                    let target = self.jump_target(position, offset)?;
                    self.jump_to(target)?;
                }
            }
            JMPEQ | JMPEQ_L | JMPNE | JMPNE_L | JMPGT | JMPGT_L | JMPGE | JMPGE_L | JMPLT
            | JMPLT_L | JMPLE | JMPLE_L => {
                let long = matches!(
                    opcode,
                    JMPEQ_L | JMPNE_L | JMPGT_L | JMPGE_L | JMPLT_L | JMPLE_L
                );
                let offset = self.branch_offset(instruction, long)?;
                let b = self.pop_integer()?;
                let a = self.pop_integer()?;
                let take = match opcode {
                    JMPEQ | JMPEQ_L => a == b,
                    JMPNE | JMPNE_L => a != b,
                    JMPGT | JMPGT_L => a > b,
                    JMPGE | JMPGE_L => a >= b,
                    JMPLT | JMPLT_L => a < b,
                    _ => a <= b,
                };
                if take {
                    let target = self.jump_target(position, offset)?;
                    self.jump_to(target)?;
                }
            }
            CALL | CALL_L => {
                let offset = self.branch_offset(instruction, opcode == CALL_L)?;
                let target = self.jump_target(position, offset)?;
                self.call_at(target)?;
            }
            CALLA => {
                let item = self.pop()?;
                let StackItem::Pointer { script, position } = item else {
                    return Err(VmError::InvalidType {
                        expected: "Pointer",
                        actual: item.type_name(),
                    });
                };
                let current = self
                    .invocation_stack
                    .last()
                    .ok_or(VmError::StackUnderflow)?;
                if !Rc::ptr_eq(current.script.bytes(), &script) {
                    return Err(VmError::InvalidJump(position as i64));
                }
                self.call_at(position)?;
            }
            CALLT => {
                let token = instruction.operand_u16()?;
                host.call_token(self, token)?;
            }
            ABORT => return Err(VmError::Aborted("ABORT executed".into())),
            ABORTMSG => {
                let message = self.pop_bytes()?;
                return Err(VmError::Aborted(
                    String::from_utf8_lossy(&message).into_owned(),
                ));
            }
            ASSERT => {
                if !self.pop_bool()? {
                    return Err(VmError::AssertFailed("ASSERT".into()));
                }
            }
            ASSERTMSG => {
                let message = self.pop_bytes()?;
                if !self.pop_bool()? {
                    return Err(VmError::AssertFailed(
                        String::from_utf8_lossy(&message).into_owned(),
                    ));
                }
            }
            THROW => {
                let exception = self.pop()?;
                self.throw_item(exception)?;
            }
            TRY | TRY_L => {
                let (catch_offset, finally_offset) = if opcode == TRY {
                    (
                        i64::from(instruction.operand_i8()?),
                        i64::from(*instruction.operand.get(1).ok_or(VmError::InvalidOperand(position))? as i8),
                    )
                } else {
                    (
                        i64::from(instruction.operand_i32()?),
                        i64::from(instruction.operand_i32_at(4)?),
                    )
                };
                if catch_offset == 0 && finally_offset == 0 {
                    return Err(VmError::BadTryBlock);
                }
                let catch_ip = if catch_offset == 0 {
                    None
                } else {
                    Some(self.jump_target(position, catch_offset)?)
                };
                let finally_ip = if finally_offset == 0 {
                    None
                } else {
                    Some(self.jump_target(position, finally_offset)?)
                };
                let context = self
                    .invocation_stack
                    .last_mut()
                    .ok_or(VmError::StackUnderflow)?;
                if context.try_stack.len() >= self.limits.max_try_nesting {
                    return Err(VmError::TryNestingOverflow);
                }
                context
                    .try_stack
                    .push(ExceptionFrame::new(catch_ip, finally_ip));
            }
            ENDTRY | ENDTRY_L => {
                let offset = self.branch_offset(instruction, opcode == ENDTRY_L)?;
                let target = self.jump_target(position, offset)?;
                let context = self
                    .invocation_stack
                    .last_mut()
                    .ok_or(VmError::StackUnderflow)?;
                let frame = context.try_stack.last_mut().ok_or(VmError::NoTryFrame)?;
                if frame.state == TryState::Finally {
                    return Err(VmError::NoTryFrame);
                }
                frame.end_ip = Some(target);
                if let Some(finally_ip) = frame.finally_ip {
                    frame.state = TryState::Finally;
                    context.ip = finally_ip;
                } else {
                    context.try_stack.pop();
                    context.ip = target;
                }
            }
            ENDFINALLY => {
                let frame = {
                    let context = self
                        .invocation_stack
                        .last_mut()
                        .ok_or(VmError::StackUnderflow)?;
                    context.try_stack.pop().ok_or(VmError::NoTryFrame)?
                };
                if frame.state != TryState::Finally {
                    return Err(VmError::NoTryFrame);
                }
                if let Some(exception) = frame.pending {
                    self.throw_item(exception)?;
                } else if let Some(end_ip) = frame.end_ip {
                    self.invocation_stack
                        .last_mut()
                        .ok_or(VmError::StackUnderflow)?
                        .ip = end_ip;
                } else {
                    return Err(VmError::NoTryFrame);
                }
            }
            RET => self.ret()?,
            SYSCALL => {
                let number = instruction.operand_u32()?;
                host.syscall(self, number)?;
            }

            // =================================================================
            // STACK MANIPULATION
            // =================================================================
            DEPTH => {
                let depth = self.stack()?.borrow().len();
                self.push(StackItem::integer(depth as i64))?;
            }
            DROP => {
                self.pop()?;
            }
            NIP => {
                let top = self.pop()?;
                let _second = self.pop()?;
                self.push(top)?;
            }
            XDROP => {
                let n = self.pop_index()?;
                let stack = self.stack()?;
                let mut stack = stack.borrow_mut();
                if n >= stack.len() {
                    return Err(VmError::StackUnderflow);
                }
                let index = stack.len() - 1 - n;
                let removed = stack.remove(index);
                drop(stack);
                self.refs.remove(&removed);
            }
            CLEAR => {
                let stack = self.stack()?;
                let drained: Vec<StackItem> = stack.borrow_mut().drain(..).collect();
                for item in &drained {
                    self.refs.remove(item);
                }
            }
            DUP => {
                let top = self.peek(0)?;
                self.push(top)?;
            }
            OVER => {
                let second = self.peek(1)?;
                self.push(second)?;
            }
            PICK => {
                let n = self.pop_index()?;
                let item = self.peek(n)?;
                self.push(item)?;
            }
            TUCK => {
                let top = self.peek(0)?;
                self.refs.add(&top, self.limits.max_stack_size)?;
                let stack = self.stack()?;
                let mut stack = stack.borrow_mut();
                if stack.len() < 2 {
                    return Err(VmError::StackUnderflow);
                }
                let index = stack.len() - 2;
                stack.insert(index, top);
            }
            SWAP => {
                let stack = self.stack()?;
                let mut stack = stack.borrow_mut();
                let len = stack.len();
                if len < 2 {
                    return Err(VmError::StackUnderflow);
                }
                stack.swap(len - 1, len - 2);
            }
            ROT => {
                let stack = self.stack()?;
                let mut stack = stack.borrow_mut();
                let len = stack.len();
                if len < 3 {
                    return Err(VmError::StackUnderflow);
                }
                let third = stack.remove(len - 3);
                stack.push(third);
            }
            ROLL => {
                let n = self.pop_index()?;
                if n > 0 {
                    let stack = self.stack()?;
                    let mut stack = stack.borrow_mut();
                    if n >= stack.len() {
                        return Err(VmError::StackUnderflow);
                    }
                    let index = stack.len() - 1 - n;
                    let item = stack.remove(index);
                    stack.push(item);
                }
            }
            REVERSE3 | REVERSE4 | REVERSEN => {
                let n = match opcode {
                    REVERSE3 => 3,
                    REVERSE4 => 4,
                    _ => self.pop_index()?,
                };
                let stack = self.stack()?;
                let mut stack = stack.borrow_mut();
                let len = stack.len();
                if n > len {
                    return Err(VmError::StackUnderflow);
                }
                stack[len - n..].reverse();
            }

            // =================================================================
            // SLOTS
            // =================================================================
            INITSSLOT => {
                let count = instruction.operand_u8()? as usize;
                if count == 0 {
                    return Err(VmError::SlotMisuse("INITSSLOT with zero slots".into()));
                }
                let context = self
                    .invocation_stack
                    .last()
                    .ok_or(VmError::StackUnderflow)?;
                let fields = Rc::clone(&context.static_fields);
                let mut fields = fields.borrow_mut();
                if fields.is_some() {
                    return Err(VmError::SlotMisuse("static slots already initialized".into()));
                }
                let slots = vec![StackItem::Null; count];
                for item in &slots {
                    self.refs.add(item, self.limits.max_stack_size)?;
                }
                *fields = Some(slots);
            }
            INITSLOT => {
                let locals = *instruction
                    .operand
                    .first()
                    .ok_or(VmError::InvalidOperand(position))? as usize;
                let arguments = *instruction
                    .operand
                    .get(1)
                    .ok_or(VmError::InvalidOperand(position))? as usize;
                if locals == 0 && arguments == 0 {
                    return Err(VmError::SlotMisuse("INITSLOT with no slots".into()));
                }
                {
                    let context = self
                        .invocation_stack
                        .last()
                        .ok_or(VmError::StackUnderflow)?;
                    if context.local_variables.is_some() || context.arguments.is_some() {
                        return Err(VmError::SlotMisuse("slots already initialized".into()));
                    }
                }
                let local_slots = vec![StackItem::Null; locals];
                for item in &local_slots {
                    self.refs.add(item, self.limits.max_stack_size)?;
                }
                let mut argument_slots = Vec::with_capacity(arguments);
                for _ in 0..arguments {
                    let item = self.pop()?;
                    self.refs.add(&item, self.limits.max_stack_size)?;
                    argument_slots.push(item);
                }
                let context = self
                    .invocation_stack
                    .last_mut()
                    .ok_or(VmError::StackUnderflow)?;
                context.local_variables = Some(local_slots);
                context.arguments = Some(argument_slots);
            }
            LDSFLD0 | LDSFLD1 | LDSFLD2 | LDSFLD3 | LDSFLD4 | LDSFLD5 | LDSFLD6 => {
                self.load_static(opcode as usize - LDSFLD0 as usize)?;
            }
            LDSFLD => {
                let index = instruction.operand_u8()? as usize;
                self.load_static(index)?;
            }
            STSFLD0 | STSFLD1 | STSFLD2 | STSFLD3 | STSFLD4 | STSFLD5 | STSFLD6 => {
                self.store_static(opcode as usize - STSFLD0 as usize)?;
            }
            STSFLD => {
                let index = instruction.operand_u8()? as usize;
                self.store_static(index)?;
            }
            LDLOC0 | LDLOC1 | LDLOC2 | LDLOC3 | LDLOC4 | LDLOC5 | LDLOC6 => {
                self.load_local(false, opcode as usize - LDLOC0 as usize)?;
            }
            LDLOC => {
                let index = instruction.operand_u8()? as usize;
                self.load_local(false, index)?;
            }
            STLOC0 | STLOC1 | STLOC2 | STLOC3 | STLOC4 | STLOC5 | STLOC6 => {
                self.store_local(false, opcode as usize - STLOC0 as usize)?;
            }
            STLOC => {
                let index = instruction.operand_u8()? as usize;
                self.store_local(false, index)?;
            }
            LDARG0 | LDARG1 | LDARG2 | LDARG3 | LDARG4 | LDARG5 | LDARG6 => {
                self.load_local(true, opcode as usize - LDARG0 as usize)?;
            }
            LDARG => {
                let index = instruction.operand_u8()? as usize;
                self.load_local(true, index)?;
            }
            STARG0 | STARG1 | STARG2 | STARG3 | STARG4 | STARG5 | STARG6 => {
                self.store_local(true, opcode as usize - STARG0 as usize)?;
            }
            STARG => {
                let index = instruction.operand_u8()? as usize;
                self.store_local(true, index)?;
            }

            // =================================================================
            // SPLICE
            // =================================================================
            NEWBUFFER => {
                let size = self.pop_index()?;
                if size > self.limits.max_item_size {
                    return Err(VmError::ItemTooLarge(size));
                }
                self.charge(payload_price(size))?;
                self.push(StackItem::buffer(vec![0u8; size]))?;
            }
            MEMCPY => {
                let count = self.pop_index()?;
                let src_index = self.pop_index()?;
                let src = self.pop_bytes()?;
                let dst_index = self.pop_index()?;
                let dst_item = self.pop()?;
                let StackItem::Buffer(dst) = &dst_item else {
                    return Err(VmError::InvalidType {
                        expected: "Buffer",
                        actual: dst_item.type_name(),
                    });
                };
                self.charge(payload_price(count))?;
                if src_index + count > src.len() || dst_index + count > dst.borrow().len() {
                    return Err(VmError::InvalidContainerOp("MEMCPY out of bounds".into()));
                }
                dst.borrow_mut()[dst_index..dst_index + count]
                    .copy_from_slice(&src[src_index..src_index + count]);
            }
            CAT => {
                let b = self.pop_bytes()?;
                let a = self.pop_bytes()?;
                let total = a.len() + b.len();
                if total > self.limits.max_item_size {
                    return Err(VmError::ItemTooLarge(total));
                }
                self.charge(payload_price(total))?;
                let mut joined = a;
                joined.extend_from_slice(&b);
                self.push(StackItem::buffer(joined))?;
            }
            SUBSTR => {
                let count = self.pop_index()?;
                let index = self.pop_index()?;
                let value = self.pop_bytes()?;
                if index + count > value.len() {
                    return Err(VmError::InvalidContainerOp("SUBSTR out of bounds".into()));
                }
                self.charge(payload_price(count))?;
                self.push(StackItem::buffer(value[index..index + count].to_vec()))?;
            }
            LEFT => {
                let count = self.pop_index()?;
                let value = self.pop_bytes()?;
                if count > value.len() {
                    return Err(VmError::InvalidContainerOp("LEFT out of bounds".into()));
                }
                self.charge(payload_price(count))?;
                self.push(StackItem::buffer(value[..count].to_vec()))?;
            }
            RIGHT => {
                let count = self.pop_index()?;
                let value = self.pop_bytes()?;
                if count > value.len() {
                    return Err(VmError::InvalidContainerOp("RIGHT out of bounds".into()));
                }
                self.charge(payload_price(count))?;
                self.push(StackItem::buffer(value[value.len() - count..].to_vec()))?;
            }

            // =================================================================
            // BITWISE & EQUALITY
            // =================================================================
            INVERT => {
                let value = self.pop_integer()?;
                self.push_integer(!value)?;
            }
            AND => {
                let b = self.pop_integer()?;
                let a = self.pop_integer()?;
                self.push_integer(a & b)?;
            }
            OR => {
                let b = self.pop_integer()?;
                let a = self.pop_integer()?;
                self.push_integer(a | b)?;
            }
            XOR => {
                let b = self.pop_integer()?;
                let a = self.pop_integer()?;
                self.push_integer(a ^ b)?;
            }
            EQUAL | NOTEQUAL => {
                let b = self.pop()?;
                let a = self.pop()?;
                let equal = a.equals(&b)?;
                self.push(StackItem::Boolean(equal == (opcode == EQUAL)))?;
            }

            // =================================================================
            // ARITHMETIC
            // =================================================================
            SIGN => {
                let value = self.pop_integer()?;
                self.push(StackItem::integer(match value.sign() {
                    num_bigint::Sign::Minus => -1,
                    num_bigint::Sign::NoSign => 0,
                    num_bigint::Sign::Plus => 1,
                }))?;
            }
            ABS => {
                let value = self.pop_integer()?;
                self.push_integer(value.abs())?;
            }
            NEGATE => {
                let value = self.pop_integer()?;
                self.push_integer(-value)?;
            }
            INC => {
                let value = self.pop_integer()?;
                self.push_integer(value + 1)?;
            }
            DEC => {
                let value = self.pop_integer()?;
                self.push_integer(value - 1)?;
            }
            ADD => {
                let b = self.pop_integer()?;
                let a = self.pop_integer()?;
                self.push_integer(a + b)?;
            }
            SUB => {
                let b = self.pop_integer()?;
                let a = self.pop_integer()?;
                self.push_integer(a - b)?;
            }
            MUL => {
                let b = self.pop_integer()?;
                let a = self.pop_integer()?;
                self.push_integer(a * b)?;
            }
            DIV => {
                let b = self.pop_integer()?;
                let a = self.pop_integer()?;
                if b.is_zero() {
                    return Err(VmError::DivideByZero);
                }
                self.push_integer(a / b)?;
            }
            MOD => {
                let b = self.pop_integer()?;
                let a = self.pop_integer()?;
                if b.is_zero() {
                    return Err(VmError::DivideByZero);
                }
                self.push_integer(a % b)?;
            }
            POW => {
                let exponent = self.pop_integer()?;
                let base = self.pop_integer()?;
                let exponent = exponent
                    .to_i32()
                    .filter(|e| *e >= 0)
                    .ok_or(VmError::NegativeExponent)?;
                self.push_integer(base.pow(exponent as u32))?;
            }
            SQRT => {
                let value = self.pop_integer()?;
                if value.is_negative() {
                    return Err(VmError::NegativeExponent);
                }
                self.push_integer(integer_sqrt(&value))?;
            }
            MODMUL => {
                let modulus = self.pop_integer()?;
                let b = self.pop_integer()?;
                let a = self.pop_integer()?;
                if modulus.is_zero() {
                    return Err(VmError::DivideByZero);
                }
                self.push_integer((a * b) % modulus)?;
            }
            MODPOW => {
                let modulus = self.pop_integer()?;
                let exponent = self.pop_integer()?;
                let base = self.pop_integer()?;
                if modulus.is_zero() {
                    return Err(VmError::DivideByZero);
                }
                let result = if exponent == BigInt::from(-1) {
                    mod_inverse(&base, &modulus).ok_or_else(|| {
                        VmError::InvalidContainerOp("no modular inverse".into())
                    })?
                } else {
                    if exponent.is_negative() {
                        return Err(VmError::NegativeExponent);
                    }
                    base.modpow(&exponent, &modulus)
                };
                self.push_integer(result)?;
            }
            SHL => {
                let shift = self.pop_integer()?;
                let value = self.pop_integer()?;
                let shift = shift
                    .to_u32()
                    .filter(|s| *s <= 256)
                    .ok_or(VmError::NegativeExponent)?;
                if shift == 0 {
                    self.push_integer(value)?;
                } else {
                    self.push_integer(value << shift)?;
                }
            }
            SHR => {
                let shift = self.pop_integer()?;
                let value = self.pop_integer()?;
                let shift = shift
                    .to_u32()
                    .filter(|s| *s <= 256)
                    .ok_or(VmError::NegativeExponent)?;
                if shift == 0 {
                    self.push_integer(value)?;
                } else {
                    self.push_integer(value >> shift)?;
                }
            }
            NOT => {
                let value = self.pop_bool()?;
                self.push(StackItem::Boolean(!value))?;
            }
            BOOLAND => {
                let b = self.pop_bool()?;
                let a = self.pop_bool()?;
                self.push(StackItem::Boolean(a && b))?;
            }
            BOOLOR => {
                let b = self.pop_bool()?;
                let a = self.pop_bool()?;
                self.push(StackItem::Boolean(a || b))?;
            }
            NZ => {
                let value = self.pop_integer()?;
                self.push(StackItem::Boolean(!value.is_zero()))?;
            }
            NUMEQUAL | NUMNOTEQUAL => {
                let b = self.pop_integer()?;
                let a = self.pop_integer()?;
                self.push(StackItem::Boolean((a == b) == (opcode == NUMEQUAL)))?;
            }
            LT | LE | GT | GE => {
                let b = self.pop()?;
                let a = self.pop()?;
                // Null compares as unordered: any relation with Null is false.
                let result = if a.is_null() || b.is_null() {
                    false
                } else {
                    let a = a.to_integer()?;
                    let b = b.to_integer()?;
                    match opcode {
                        LT => a < b,
                        LE => a <= b,
                        GT => a > b,
                        _ => a >= b,
                    }
                };
                self.push(StackItem::Boolean(result))?;
            }
            MIN => {
                let b = self.pop_integer()?;
                let a = self.pop_integer()?;
                self.push_integer(a.min(b))?;
            }
            MAX => {
                let b = self.pop_integer()?;
                let a = self.pop_integer()?;
                self.push_integer(a.max(b))?;
            }
            WITHIN => {
                let upper = self.pop_integer()?;
                let lower = self.pop_integer()?;
                let value = self.pop_integer()?;
                self.push(StackItem::Boolean(lower <= value && value < upper))?;
            }

            // =================================================================
            // COMPOUND TYPES
            // =================================================================
            PACK | PACKSTRUCT => {
                let count = self.pop_index()?;
                self.charge(payload_price(count))?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.pop()?);
                }
                let compound = if opcode == PACK {
                    StackItem::array(items)
                } else {
                    StackItem::structure(items)
                };
                self.push(compound)?;
            }
            PACKMAP => {
                let count = self.pop_index()?;
                self.charge(payload_price(count))?;
                let map = StackItem::map();
                if let StackItem::Map(entries) = &map {
                    for _ in 0..count {
                        let key = self.pop()?;
                        if !key.is_primitive() {
                            return Err(VmError::InvalidMapKey);
                        }
                        let value = self.pop()?;
                        entries.borrow_mut().push((key, value));
                    }
                }
                self.push(map)?;
            }
            UNPACK => {
                let item = self.pop()?;
                match &item {
                    StackItem::Array(items) | StackItem::Struct(items) => {
                        let items = items.borrow().clone();
                        self.charge(payload_price(items.len()))?;
                        for element in items.iter().rev() {
                            self.push(element.clone())?;
                        }
                        self.push(StackItem::integer(items.len() as i64))?;
                    }
                    StackItem::Map(entries) => {
                        let entries = entries.borrow().clone();
                        self.charge(payload_price(entries.len()))?;
                        for (key, value) in entries.iter().rev() {
                            self.push(value.clone())?;
                            self.push(key.clone())?;
                        }
                        self.push(StackItem::integer(entries.len() as i64))?;
                    }
                    other => {
                        return Err(VmError::InvalidType {
                            expected: "compound",
                            actual: other.type_name(),
                        })
                    }
                }
            }
            NEWARRAY0 => self.push(StackItem::array(Vec::new()))?,
            NEWARRAY | NEWARRAY_T => {
                if opcode == NEWARRAY_T {
                    // Validate the element type byte; elements start Null
                    // regardless.
                    ItemType::from_byte(instruction.operand_u8()?)?;
                }
                let count = self.pop_index()?;
                self.charge(payload_price(count))?;
                self.push(StackItem::array(vec![StackItem::Null; count]))?;
            }
            NEWSTRUCT0 => self.push(StackItem::structure(Vec::new()))?,
            NEWSTRUCT => {
                let count = self.pop_index()?;
                self.charge(payload_price(count))?;
                self.push(StackItem::structure(vec![StackItem::Null; count]))?;
            }
            NEWMAP => self.push(StackItem::map())?,
            SIZE => {
                let item = self.pop()?;
                let size = item.size_of()?;
                self.push(StackItem::integer(size as i64))?;
            }
            HASKEY => {
                let key = self.pop()?;
                let container = self.pop()?;
                let found = match &container {
                    StackItem::Map(entries) => {
                        let entries = entries.borrow();
                        let mut found = false;
                        for (existing, _) in entries.iter() {
                            if existing.key_equals(&key)? {
                                found = true;
                                break;
                            }
                        }
                        found
                    }
                    StackItem::Array(items) | StackItem::Struct(items) => {
                        key.to_index()? < items.borrow().len()
                    }
                    StackItem::ByteString(bytes) => key.to_index()? < bytes.len(),
                    StackItem::Buffer(bytes) => key.to_index()? < bytes.borrow().len(),
                    other => {
                        return Err(VmError::InvalidType {
                            expected: "container",
                            actual: other.type_name(),
                        })
                    }
                };
                self.push(StackItem::Boolean(found))?;
            }
            KEYS => {
                let item = self.pop()?;
                let StackItem::Map(entries) = &item else {
                    return Err(VmError::InvalidType {
                        expected: "Map",
                        actual: item.type_name(),
                    });
                };
                let keys: Vec<StackItem> =
                    entries.borrow().iter().map(|(k, _)| k.clone()).collect();
                self.push(StackItem::array(keys))?;
            }
            VALUES => {
                let item = self.pop()?;
                let values: Vec<StackItem> = match &item {
                    StackItem::Map(entries) => entries
                        .borrow()
                        .iter()
                        .map(|(_, v)| v.assign_clone())
                        .collect(),
                    StackItem::Array(items) | StackItem::Struct(items) => {
                        items.borrow().iter().map(StackItem::assign_clone).collect()
                    }
                    other => {
                        return Err(VmError::InvalidType {
                            expected: "compound",
                            actual: other.type_name(),
                        })
                    }
                };
                self.charge(payload_price(values.len()))?;
                self.push(StackItem::array(values))?;
            }
            PICKITEM => {
                let key = self.pop()?;
                let container = self.pop()?;
                let picked = match &container {
                    StackItem::Map(entries) => {
                        let entries = entries.borrow();
                        let mut picked = None;
                        for (existing, value) in entries.iter() {
                            if existing.key_equals(&key)? {
                                picked = Some(value.clone());
                                break;
                            }
                        }
                        picked.ok_or_else(|| {
                            VmError::InvalidContainerOp("key not found".into())
                        })?
                    }
                    StackItem::Array(items) | StackItem::Struct(items) => {
                        let items = items.borrow();
                        let index = key.to_index()?;
                        items
                            .get(index)
                            .cloned()
                            .ok_or_else(|| {
                                VmError::InvalidContainerOp("index out of range".into())
                            })?
                    }
                    StackItem::ByteString(bytes) => {
                        let index = key.to_index()?;
                        let byte = bytes.get(index).copied().ok_or_else(|| {
                            VmError::InvalidContainerOp("index out of range".into())
                        })?;
                        StackItem::integer(i64::from(byte))
                    }
                    StackItem::Buffer(bytes) => {
                        let index = key.to_index()?;
                        let byte = bytes.borrow().get(index).copied().ok_or_else(|| {
                            VmError::InvalidContainerOp("index out of range".into())
                        })?;
                        StackItem::integer(i64::from(byte))
                    }
                    other => {
                        return Err(VmError::InvalidType {
                            expected: "container",
                            actual: other.type_name(),
                        })
                    }
                };
                self.push(picked)?;
            }
            APPEND => {
                let value = self.pop()?;
                let target = self.pop()?;
                let items = target.as_sequence()?;
                let value = value.assign_clone();
                self.refs.add(&value, self.limits.max_stack_size)?;
                items.borrow_mut().push(value);
            }
            SETITEM => {
                let value = self.pop()?;
                let key = self.pop()?;
                let container = self.pop()?;
                match &container {
                    StackItem::Map(entries) => {
                        if !key.is_primitive() {
                            return Err(VmError::InvalidMapKey);
                        }
                        let value = value.assign_clone();
                        self.refs.add(&value, self.limits.max_stack_size)?;
                        let mut entries = entries.borrow_mut();
                        let mut replaced = false;
                        for (existing, existing_value) in entries.iter_mut() {
                            if existing.key_equals(&key)? {
                                self.refs.remove(existing_value);
                                *existing_value = value.clone();
                                replaced = true;
                                break;
                            }
                        }
                        if !replaced {
                            entries.push((key, value));
                        }
                    }
                    StackItem::Array(items) | StackItem::Struct(items) => {
                        let index = key.to_index()?;
                        let mut items = items.borrow_mut();
                        let len = items.len();
                        let slot = items.get_mut(index).ok_or(VmError::InvalidContainerOp(
                            format!("index {index} out of range (len {len})"),
                        ))?;
                        let value = value.assign_clone();
                        self.refs.add(&value, self.limits.max_stack_size)?;
                        self.refs.remove(slot);
                        *slot = value;
                    }
                    StackItem::Buffer(bytes) => {
                        let index = key.to_index()?;
                        let byte = value
                            .to_integer()?
                            .to_u8()
                            .ok_or(VmError::InvalidContainerOp("byte out of range".into()))?;
                        let mut bytes = bytes.borrow_mut();
                        let len = bytes.len();
                        let slot = bytes.get_mut(index).ok_or(VmError::InvalidContainerOp(
                            format!("index {index} out of range (len {len})"),
                        ))?;
                        *slot = byte;
                    }
                    other => {
                        return Err(VmError::InvalidType {
                            expected: "container",
                            actual: other.type_name(),
                        })
                    }
                }
            }
            REVERSEITEMS => {
                let item = self.pop()?;
                match &item {
                    StackItem::Array(items) | StackItem::Struct(items) => {
                        items.borrow_mut().reverse();
                    }
                    StackItem::Buffer(bytes) => bytes.borrow_mut().reverse(),
                    other => {
                        return Err(VmError::InvalidType {
                            expected: "Array, Struct or Buffer",
                            actual: other.type_name(),
                        })
                    }
                }
            }
            REMOVE => {
                let key = self.pop()?;
                let container = self.pop()?;
                match &container {
                    StackItem::Map(entries) => {
                        let mut entries = entries.borrow_mut();
                        let mut removed_at = None;
                        for (i, (existing, _)) in entries.iter().enumerate() {
                            if existing.key_equals(&key)? {
                                removed_at = Some(i);
                                break;
                            }
                        }
                        if let Some(index) = removed_at {
                            let (_, value) = entries.remove(index);
                            drop(entries);
                            self.refs.remove(&value);
                        }
                    }
                    StackItem::Array(items) | StackItem::Struct(items) => {
                        let index = key.to_index()?;
                        let mut items = items.borrow_mut();
                        if index >= items.len() {
                            return Err(VmError::InvalidContainerOp(
                                "index out of range".into(),
                            ));
                        }
                        let removed = items.remove(index);
                        drop(items);
                        self.refs.remove(&removed);
                    }
                    other => {
                        return Err(VmError::InvalidType {
                            expected: "Array, Struct or Map",
                            actual: other.type_name(),
                        })
                    }
                }
            }
            CLEARITEMS => {
                let item = self.pop()?;
                match &item {
                    StackItem::Map(entries) => {
                        let drained: Vec<(StackItem, StackItem)> =
                            entries.borrow_mut().drain(..).collect();
                        for (key, value) in &drained {
                            self.refs.remove(key);
                            self.refs.remove(value);
                        }
                    }
                    StackItem::Array(items) | StackItem::Struct(items) => {
                        let drained: Vec<StackItem> = items.borrow_mut().drain(..).collect();
                        for element in &drained {
                            self.refs.remove(element);
                        }
                    }
                    other => {
                        return Err(VmError::InvalidType {
                            expected: "compound",
                            actual: other.type_name(),
                        })
                    }
                }
            }
            POPITEM => {
                let item = self.pop()?;
                let items = item.as_sequence()?;
                let popped = items
                    .borrow_mut()
                    .pop()
                    .ok_or(VmError::InvalidContainerOp("POPITEM on empty".into()))?;
                self.refs.remove(&popped);
                self.push(popped)?;
            }

            // =================================================================
            // TYPES
            // =================================================================
            ISNULL => {
                let item = self.pop()?;
                self.push(StackItem::Boolean(item.is_null()))?;
            }
            ISTYPE => {
                let target = ItemType::from_byte(instruction.operand_u8()?)?;
                if target == ItemType::Any {
                    return Err(VmError::InvalidConversion("Any"));
                }
                let item = self.pop()?;
                self.push(StackItem::Boolean(item.item_type() == target))?;
            }
            CONVERT => {
                let target = ItemType::from_byte(instruction.operand_u8()?)?;
                let item = self.pop()?;
                self.charge(payload_price(item.size_of().unwrap_or(1)))?;
                let converted = convert_item(item, target)?;
                self.push(converted)?;
            }
        }
        Ok(())
    }

    fn branch_offset(&self, instruction: &Instruction, long: bool) -> Result<i64, VmError> {
        if long {
            Ok(i64::from(instruction.operand_i32()?))
        } else {
            Ok(i64::from(instruction.operand_i8()?))
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Floor of the square root of a non-negative integer.
fn integer_sqrt(value: &BigInt) -> BigInt {
    if value.is_zero() || value.is_one() {
        return value.clone();
    }
    let mut low = BigInt::zero();
    let mut high = value.clone();
    while &low < &high {
        let mid: BigInt = (&low + &high + 1) >> 1;
        if &mid * &mid <= *value {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    low
}

/// Modular inverse via the extended Euclidean algorithm.
fn mod_inverse(value: &BigInt, modulus: &BigInt) -> Option<BigInt> {
    let modulus = modulus.abs();
    let (mut old_r, mut r) = (value.mod_floor_custom(&modulus), modulus.clone());
    let (mut old_s, mut s) = (BigInt::one(), BigInt::zero());
    while !r.is_zero() {
        let quotient = &old_r / &r;
        let next_r = &old_r - &quotient * &r;
        old_r = std::mem::replace(&mut r, next_r);
        let next_s = &old_s - &quotient * &s;
        old_s = std::mem::replace(&mut s, next_s);
    }
    if old_r != BigInt::one() {
        return None;
    }
    Some(old_s.mod_floor_custom(&modulus))
}

trait ModFloor {
    fn mod_floor_custom(&self, modulus: &BigInt) -> BigInt;
}

impl ModFloor for BigInt {
    fn mod_floor_custom(&self, modulus: &BigInt) -> BigInt {
        let remainder = self % modulus;
        if remainder.is_negative() {
            remainder + modulus
        } else {
            remainder
        }
    }
}

/// The CONVERT coercion table.
fn convert_item(item: StackItem, target: ItemType) -> Result<StackItem, VmError> {
    if item.item_type() == target {
        return Ok(item);
    }
    match target {
        ItemType::Boolean => Ok(StackItem::Boolean(item.to_boolean())),
        ItemType::Integer => Ok(StackItem::Integer(item.to_integer()?)),
        ItemType::ByteString => Ok(StackItem::byte_string(item.to_byte_vec()?)),
        ItemType::Buffer => Ok(StackItem::buffer(item.to_byte_vec()?)),
        ItemType::Array => match &item {
            StackItem::Struct(items) => Ok(StackItem::array(items.borrow().clone())),
            _ => Err(VmError::InvalidConversion("Array")),
        },
        ItemType::Struct => match &item {
            StackItem::Array(items) => Ok(StackItem::structure(items.borrow().clone())),
            _ => Err(VmError::InvalidConversion("Struct")),
        },
        ItemType::Any | ItemType::Pointer | ItemType::Map | ItemType::InteropInterface => {
            Err(VmError::InvalidConversion(match target {
                ItemType::Any => "Any",
                ItemType::Pointer => "Pointer",
                ItemType::Map => "Map",
                _ => "InteropInterface",
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::OpCode;

    fn run(script: Vec<u8>) -> ExecutionEngine {
        let mut engine = ExecutionEngine::new(100_000_000);
        engine.load_script(Script::new(script)).unwrap();
        engine.execute(&mut NullHost);
        engine
    }

    #[test]
    fn test_empty_script_halts_with_no_gas() {
        let engine = run(vec![]);
        assert_eq!(engine.state(), VMState::Halt);
        assert_eq!(engine.gas_consumed(), 0);
        assert!(engine.result_stack().is_empty());
    }

    #[test]
    fn test_push_add() {
        // PUSH1 PUSH2 ADD
        let engine = run(vec![0x11, 0x12, 0x9E]);
        assert_eq!(engine.state(), VMState::Halt);
        assert_eq!(engine.result_stack().len(), 1);
        let result = engine.result_stack()[0].to_integer().unwrap();
        assert_eq!(result, BigInt::from(3));
        let expected = OpCode::PUSH1.price() + OpCode::PUSH2.price() + OpCode::ADD.price();
        assert_eq!(engine.gas_consumed(), expected);
    }

    #[test]
    fn test_gas_is_conserved() {
        let engine = run(vec![0x11, 0x12, 0x9E]);
        assert_eq!(engine.gas_consumed() + engine.gas_left(), 100_000_000);
    }

    #[test]
    fn test_out_of_gas_faults() {
        let mut engine = ExecutionEngine::new(1);
        engine
            .load_script(Script::new(vec![0x11, 0x12, 0x9E]))
            .unwrap();
        assert_eq!(engine.execute(&mut NullHost), VMState::Fault);
        assert_eq!(engine.exception(), Some("Insufficient gas"));
    }

    #[test]
    fn test_try_throw_catch() {
        // 0: TRY catch=+4 finally=0   (3 bytes)
        // 3: PUSH1                     (would be the protected body result)
        // 4: THROW
        // 5: ENDTRY +4   -> unreachable
        // 7: PUSH2                     (catch body; exception on stack)
        // ...
        // Layout below follows the scenario: the catch drops the thrown
        // item, pushes 2, and falls through the final ENDTRY.
        let script = vec![
            0x3B, 0x05, 0x00, // TRY catch=+5, no finally
            0x11, // PUSH1
            0x3A, // THROW (throws Integer(1))
            0x45, // @5 catch: DROP the exception
            0x12, // PUSH2
            0x3D, 0x02, // ENDTRY +2 -> next instruction
            0x40, // RET
        ];
        let engine = run(script);
        assert_eq!(engine.state(), VMState::Halt, "{:?}", engine.exception());
        let top = engine.result_stack().last().unwrap();
        assert_eq!(top.to_integer().unwrap(), BigInt::from(2));
    }

    #[test]
    fn test_try_finally_rethrows() {
        // TRY with only a finally: the exception must resurface after the
        // finally body runs, faulting the engine.
        let script = vec![
            0x3B, 0x00, 0x04, // TRY finally=+4
            0x3A, // THROW... needs an item
        ];
        // Push the item first, outside the protected region.
        let mut full = vec![0x11]; // PUSH1
        full.extend_from_slice(&[0x3B, 0x00, 0x04]); // @1 TRY finally=+5 -> 1+4=5
        full.push(0x3A); // @4 THROW
        full.push(0x3F); // @5 ENDFINALLY
        let _ = script;
        let engine = run(full);
        assert_eq!(engine.state(), VMState::Fault);
        assert!(engine.exception().unwrap().contains("Uncaught"));
    }

    #[test]
    fn test_try_without_targets_faults() {
        let engine = run(vec![0x3B, 0x00, 0x00]);
        assert_eq!(engine.state(), VMState::Fault);
        assert_eq!(engine.exception(), Some("TRY without catch or finally"));
    }

    #[test]
    fn test_div_by_zero_faults() {
        let engine = run(vec![0x11, 0x10, 0xA1]); // PUSH1 PUSH0 DIV
        assert_eq!(engine.state(), VMState::Fault);
        assert_eq!(engine.exception(), Some("Division by zero"));
    }

    #[test]
    fn test_pow_edge_cases() {
        // 2^-1 faults
        let engine = run(vec![0x12, 0x0F, 0xA3]); // PUSH2 PUSHM1 POW
        assert_eq!(engine.state(), VMState::Fault);

        // 2^0 == 1
        let engine = run(vec![0x12, 0x10, 0xA3]);
        assert_eq!(
            engine.result_stack()[0].to_integer().unwrap(),
            BigInt::from(1)
        );

        // 0^3 == 0
        let engine = run(vec![0x10, 0x13, 0xA3]);
        assert_eq!(
            engine.result_stack()[0].to_integer().unwrap(),
            BigInt::from(0)
        );
    }

    #[test]
    fn test_pushint256_boundaries() {
        // Largest positive signed 256-bit value.
        let mut max_bytes = [0xFFu8; 32];
        max_bytes[31] = 0x7F;
        let mut script = vec![0x05];
        script.extend_from_slice(&max_bytes);
        let engine = run(script.clone());
        assert_eq!(engine.state(), VMState::Halt);
        let expected = (BigInt::from(1u8) << 255) - 1;
        assert_eq!(engine.result_stack()[0].to_integer().unwrap(), expected);

        // INC past the maximum faults.
        script.push(0x9C); // INC
        let engine = run(script);
        assert_eq!(engine.state(), VMState::Fault);
        assert_eq!(engine.exception(), Some("Integer out of range"));

        // Smallest negative value loads exactly.
        let mut min_bytes = [0x00u8; 32];
        min_bytes[31] = 0x80;
        let mut script = vec![0x05];
        script.extend_from_slice(&min_bytes);
        let engine = run(script);
        assert_eq!(engine.state(), VMState::Halt);
        let expected: BigInt = -(BigInt::from(1u8) << 255u32);
        assert_eq!(engine.result_stack()[0].to_integer().unwrap(), expected);
    }

    #[test]
    fn test_pack_beyond_depth_faults() {
        let engine = run(vec![0x11, 0x13, 0xC0]); // PUSH1, then PACK 3
        assert_eq!(engine.state(), VMState::Fault);
    }

    #[test]
    fn test_convert_integer_to_boolean() {
        // 0 -> false
        let engine = run(vec![0x10, 0xDB, 0x20]); // PUSH0 CONVERT Boolean
        assert_eq!(engine.result_stack()[0].to_boolean(), false);
        // 5 -> true
        let engine = run(vec![0x15, 0xDB, 0x20]);
        assert_eq!(engine.result_stack()[0].to_boolean(), true);
    }

    #[test]
    fn test_invalid_opcode_faults() {
        let engine = run(vec![0x42]);
        assert_eq!(engine.state(), VMState::Fault);
        assert_eq!(engine.exception(), Some("Invalid opcode 0x42"));
    }

    #[test]
    fn test_call_and_ret() {
        // 0: CALL +4  -> 4
        // 2: PUSH2    (after return)
        // 3: RET
        // 4: PUSH1
        // 5: RET
        let script = vec![0x34, 0x04, 0x12, 0x40, 0x11, 0x40];
        let engine = run(script);
        assert_eq!(engine.state(), VMState::Halt);
        let values: Vec<BigInt> = engine
            .result_stack()
            .iter()
            .map(|i| i.to_integer().unwrap())
            .collect();
        assert_eq!(values, vec![BigInt::from(1), BigInt::from(2)]);
    }

    #[test]
    fn test_slots_round_trip() {
        // INITSLOT 1 local, 0 args; store 7; load twice; ADD
        let script = vec![
            0x57, 0x01, 0x00, // INITSLOT
            0x17, // PUSH7
            0x70, // STLOC0
            0x68, // LDLOC0
            0x68, // LDLOC0
            0x9E, // ADD
            0x40, // RET
        ];
        let engine = run(script);
        assert_eq!(engine.state(), VMState::Halt);
        assert_eq!(
            engine.result_stack()[0].to_integer().unwrap(),
            BigInt::from(14)
        );
    }

    #[test]
    fn test_reference_counter_returns_to_baseline() {
        // PUSH1 PUSH2 PUSH2 PACK leaves one array of two on the result
        // stack; releasing the results must drain the counter.
        let mut engine = ExecutionEngine::new(100_000_000);
        engine
            .load_script(Script::new(vec![0x11, 0x12, 0x12, 0xC0]))
            .unwrap();
        engine.execute(&mut NullHost);
        assert_eq!(engine.state(), VMState::Halt);
        assert!(engine.reference_count() > 0);
        engine.take_results();
        assert_eq!(engine.reference_count(), 0);
    }

    #[test]
    fn test_xdrop_and_depth() {
        // PUSH1 PUSH2 PUSH3 PUSH1 XDROP  -> removes the 2
        let script = vec![0x11, 0x12, 0x13, 0x11, 0x48, 0x43]; // then DEPTH
        let engine = run(script);
        assert_eq!(engine.state(), VMState::Halt);
        let depth = engine.result_stack().last().unwrap();
        assert_eq!(depth.to_integer().unwrap(), BigInt::from(2));
    }

    #[test]
    fn test_map_insertion_order_preserved() {
        // NEWMAP DUP PUSH2 PUSH1 SETITEM DUP PUSH1 PUSH2 SETITEM KEYS
        let script = vec![
            0xC8, // NEWMAP
            0x4A, 0x12, 0x11, 0xD0, // map[2] = 1
            0x4A, 0x11, 0x12, 0xD0, // map[1] = 2
            0xCC, // KEYS
        ];
        let engine = run(script);
        assert_eq!(engine.state(), VMState::Halt, "{:?}", engine.exception());
        let keys = &engine.result_stack()[0];
        if let StackItem::Array(items) = keys {
            let items = items.borrow();
            assert_eq!(items[0].to_integer().unwrap(), BigInt::from(2));
            assert_eq!(items[1].to_integer().unwrap(), BigInt::from(1));
        } else {
            panic!("KEYS must return an array");
        }
    }
}
