//! Trap servicing — host side of the contract syscall ABI.
//!
//! [`trap_entry`] is what the gateway calls in place of `ecall`. It records the
//! register snapshot and hands the frame to the machine's handler, normally
//! [`handle_ecall`], which dispatches on t0.
//!
//! Guest memory is this process's memory: buffer addresses from a0/a1 are
//! dereferenced directly after validation.

use std::slice;

use libsyscall::call::{CALL_FAILURE, CALL_FRAME_SIZE, CALL_SUCCESS};
use libsyscall::{CallFrame, Syscall, TrapFrame};
use log::{debug, trace, warn};
use thiserror::Error;

use crate::kernel::exec::{self, with_machine, CallRecord, ExecState, FrameExit, TrapRecord};

// ─── Entry ─────────────────────────────────────────────────────────

/// Installed with `libsyscall::set_trap_handler`. Records the trap, then
/// forwards to the handler of this thread's running execution.
pub fn trap_entry(frame: &mut TrapFrame) {
    let handler = with_machine(|m| {
        if m.config.record_traps {
            let record = TrapRecord {
                depth: m.depth(),
                contract: m.current().contract,
                frame: *frame,
            };
            m.traps.push(record);
        }
        m.handler
    });
    handler(frame);
}

/// Dispatch a trap by t0.
///
/// Unknown opcodes abort the current execution.
pub fn handle_ecall(frame: &mut TrapFrame) {
    let syscall = match Syscall::try_from(frame.t0()) {
        Ok(syscall) => syscall,
        Err(err) => {
            warn!("{}; aborting execution", err);
            exec::halt(ExecState::Reverted);
        }
    };
    trace!("{} a0={:#x} a1={:#x}", syscall, frame.a0(), frame.a1());

    match syscall {
        Syscall::Return => handle_return(frame),
        Syscall::SLoad => handle_sload(frame),
        Syscall::SStore => handle_sstore(frame),
        Syscall::Call => handle_call(frame),
        Syscall::Revert => exec::halt(ExecState::Reverted),
    }
}

// ─── Individual syscall handlers ───────────────────────────────────

/// `return`: a0 = buffer address, a1 = length. Copies the buffer out and
/// ends the frame with Commit. Invalid buffers abort instead.
fn handle_return(frame: &TrapFrame) -> ! {
    let max = with_machine(|m| m.config.max_return_len);
    let output = match read_guest(frame.a0(), frame.a1(), max) {
        Ok(bytes) => bytes,
        Err(fault) => {
            warn!("return: {}; aborting execution", fault);
            exec::halt(ExecState::Reverted);
        }
    };
    with_machine(|m| m.current_mut().output = output);
    exec::halt(ExecState::Returned)
}

/// `sload`: a0 = key. Result in a0.
fn handle_sload(frame: &mut TrapFrame) {
    let key = frame.a0();
    let value = with_machine(|m| {
        let contract = m.current().contract;
        m.storage
            .load(contract, key)
            .unwrap_or(m.config.default_slot_value)
    });
    frame.set_a0(value);
}

/// `sstore`: a0 = key, a1 = value.
fn handle_sstore(frame: &TrapFrame) {
    let (key, value) = (frame.a0(), frame.a1());
    with_machine(|m| {
        let contract = m.current().contract;
        m.storage.store(contract, key, value);
    });
}

/// `call`: a0 = `CallFrame` address, a1 = `CallFrame` size.
///
/// A malformed descriptor or buffer aborts the caller. A missing callee or
/// exceeded depth is an ordinary failed call.
fn handle_call(frame: &mut TrapFrame) {
    let (addr, size) = (frame.a0(), frame.a1());
    if let Err(fault) = validate_call_frame(addr, size) {
        warn!("call: {}; aborting execution", fault);
        exec::halt(ExecState::Reverted);
    }

    // SAFETY: address validated non-null, aligned, and exactly one CallFrame
    // long; it points into the calling guest's stack for the whole trap.
    let descriptor = unsafe { slice::from_raw_parts(addr as *const u8, CALL_FRAME_SIZE) };
    let mut call: CallFrame = bytemuck::pod_read_unaligned(descriptor);

    let input = match read_guest(call.input_ptr, call.input_len, usize::MAX) {
        Ok(input) => input,
        Err(fault) => {
            warn!("call input: {}; aborting execution", fault);
            exec::halt(ExecState::Reverted);
        }
    };
    if let Err(fault) = validate_buffer(call.output_ptr, call.output_len, usize::MAX) {
        warn!("call output: {}; aborting execution", fault);
        exec::halt(ExecState::Reverted);
    }

    let (caller, depth, program, max_depth) = with_machine(|m| {
        (
            m.current().contract,
            m.depth(),
            m.programs.get(&call.callee).copied(),
            m.config.max_call_depth,
        )
    });

    let exit = match program {
        None => {
            warn!("call: no program at contract {:#x}", call.callee);
            FrameExit::Abort
        }
        Some(_) if depth >= max_depth => {
            warn!("call: depth limit {} reached", max_depth);
            FrameExit::Abort
        }
        Some(program) => {
            debug!("call {:#x} -> {:#x} ({} bytes in)", caller, call.callee, input.len());
            exec::run_frame(call.callee, &input, program)
        }
    };

    let (success, output) = match exit {
        FrameExit::Commit(output) => (true, output),
        FrameExit::Abort | FrameExit::FellThrough => (false, Vec::new()),
    };

    let written = output.len().min(call.output_len as usize);
    if written > 0 {
        // SAFETY: output buffer validated above; `written` ≤ its length.
        unsafe {
            std::ptr::copy_nonoverlapping(output.as_ptr(), call.output_ptr as *mut u8, written);
        }
    }
    call.output_written = written as u64;

    // SAFETY: same descriptor memory as read above.
    let descriptor = unsafe { slice::from_raw_parts_mut(addr as *mut u8, CALL_FRAME_SIZE) };
    descriptor.copy_from_slice(bytemuck::bytes_of(&call));

    with_machine(|m| {
        m.calls.push(CallRecord {
            depth,
            caller,
            callee: call.callee,
            value: call.value,
            input,
            success,
        })
    });

    frame.set_a0(if success { CALL_SUCCESS } else { CALL_FAILURE });
}

// ─── Guest buffer validation (pure, testable) ──────────────────────

/// Why a guest-supplied address range was refused.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BufferFault {
    #[error("null buffer with length {0}")]
    Null(u64),
    #[error("buffer length {len} exceeds limit {max}")]
    TooLong { len: u64, max: usize },
    #[error("buffer at {addr:#x} + {len} wraps the address space")]
    Wraps { addr: u64, len: u64 },
    #[error("call descriptor at {addr:#x} misaligned")]
    Misaligned { addr: u64 },
    #[error("call descriptor size {0} does not match CallFrame")]
    DescriptorSize(u64),
}

/// Validate a guest `(addr, len)` buffer. Returns the length as `usize`.
/// An empty buffer is always valid, whatever its address.
pub fn validate_buffer(addr: u64, len: u64, max: usize) -> Result<usize, BufferFault> {
    if len == 0 {
        return Ok(0);
    }
    if addr == 0 {
        return Err(BufferFault::Null(len));
    }
    if addr.checked_add(len).is_none() {
        return Err(BufferFault::Wraps { addr, len });
    }
    match usize::try_from(len) {
        Ok(len) if len <= max => Ok(len),
        _ => Err(BufferFault::TooLong { len, max }),
    }
}

/// Validate the a0/a1 pair of a `call` trap.
pub fn validate_call_frame(addr: u64, size: u64) -> Result<(), BufferFault> {
    if size != CALL_FRAME_SIZE as u64 {
        return Err(BufferFault::DescriptorSize(size));
    }
    if addr == 0 {
        return Err(BufferFault::Null(size));
    }
    if addr % core::mem::align_of::<CallFrame>() as u64 != 0 {
        return Err(BufferFault::Misaligned { addr });
    }
    validate_buffer(addr, size, CALL_FRAME_SIZE).map(|_| ())
}

/// Copy a validated guest buffer into host memory.
fn read_guest(addr: u64, len: u64, max: usize) -> Result<Vec<u8>, BufferFault> {
    let len = validate_buffer(addr, len, max)?;
    if len == 0 {
        return Ok(Vec::new());
    }
    // SAFETY: non-null, non-wrapping range handed over by the guest, which
    // shares this address space and stays suspended for the whole trap.
    let bytes = unsafe { slice::from_raw_parts(addr as *const u8, len) };
    Ok(bytes.to_vec())
}
