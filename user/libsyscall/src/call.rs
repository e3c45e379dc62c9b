//! `call` (opcode 3): sub-call into another deployed program.
//!
//! This layout is an extension point, not part of the frozen ABI. The guest
//! describes the call in a [`CallFrame`] in its own memory and traps with
//! a0 = frame address, a1 = frame size. The host writes the callee's output
//! into the output buffer, records the byte count in `output_written`, and
//! leaves [`CALL_SUCCESS`] or [`CALL_FAILURE`] in a0.

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use crate::trap::{trap, Operands};
use crate::Syscall;

/// a0 after a call whose callee committed.
pub const CALL_SUCCESS: u64 = 1;
/// a0 after a call whose callee aborted or could not be started.
pub const CALL_FAILURE: u64 = 0;

/// Sub-call descriptor, 7 × u64 = 56 bytes.
/// Shared with the host byte-for-byte — DO NOT reorder.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct CallFrame {
    /// Host-defined program identifier
    pub callee: u64,
    /// Value forwarded with the call; meaning is host-defined
    pub value: u64,
    pub input_ptr: u64,
    pub input_len: u64,
    pub output_ptr: u64,
    /// Output buffer capacity in bytes
    pub output_len: u64,
    /// Filled by the host
    pub output_written: u64,
}

/// CallFrame size — also sent in a1 as a layout version check.
pub const CALL_FRAME_SIZE: usize = 56;

/// The callee aborted, or the host refused to start it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("sub-call reverted")]
pub struct CallReverted;

/// Call program `callee` with `input`, collecting its output into `output`.
///
/// Returns the number of output bytes the host wrote (never more than
/// `output.len()`).
pub fn sys_call(
    callee: u64,
    value: u64,
    input: &[u8],
    output: &mut [u8],
) -> Result<usize, CallReverted> {
    let mut frame = CallFrame {
        callee,
        value,
        input_ptr: input.as_ptr() as u64,
        input_len: input.len() as u64,
        output_ptr: output.as_mut_ptr() as u64,
        output_len: output.len() as u64,
        output_written: 0,
    };

    let status = trap(
        Syscall::Call,
        Operands::Two(&mut frame as *mut CallFrame as u64, CALL_FRAME_SIZE as u64),
    );

    if status == CALL_SUCCESS {
        Ok((frame.output_written as usize).min(output.len()))
    } else {
        Err(CallReverted)
    }
}
