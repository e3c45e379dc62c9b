//! Guest-side syscall gateway for sandboxed contracts.
//!
//! Single source of truth for the opcode numbering and the syscall wrappers.
//! Every guest program depends on this crate instead of duplicating asm.
//!
//! Syscall ABI: t0 = opcode, a0 = operand 1 / result, a1 = operand 2.
//! One `ecall` per syscall.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

use thiserror::Error;

pub mod call;
pub mod trap;
pub mod types;

pub use call::{sys_call, CallFrame, CallReverted};
pub use trap::{trap, Operands, TrapFrame};
#[cfg(not(target_arch = "riscv64"))]
pub use trap::{clear_trap_handler, set_trap_handler, TrapHandler};
pub use types::Mapping;

// ─── Syscall Numbers ───────────────────────────────────────────────

/// Opcode placed in t0. Numbering is agreed with the host and frozen.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::FromRepr,
    strum::IntoStaticStr,
)]
#[repr(u32)]
pub enum Syscall {
    /// a0 = buffer address, a1 = length in bytes. Commit; not expected to return.
    #[strum(to_string = "return")]
    Return = 0,
    /// a0 = key. Returns the stored word in a0.
    #[strum(to_string = "sload")]
    SLoad = 1,
    /// a0 = key, a1 = value.
    #[strum(to_string = "sstore")]
    SStore = 2,
    /// a0 = `CallFrame` address, a1 = `CallFrame` size. Returns status in a0.
    #[strum(to_string = "call")]
    Call = 3,
    /// Abort; does not return.
    #[strum(to_string = "revert")]
    Revert = 4,
}

impl From<Syscall> for u32 {
    fn from(syscall: Syscall) -> Self {
        syscall as Self
    }
}

impl From<Syscall> for u64 {
    fn from(syscall: Syscall) -> Self {
        syscall as u32 as Self
    }
}

/// Register value in t0 that names no syscall.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("unknown syscall #{0}")]
pub struct UnknownSyscall(pub u64);

impl TryFrom<u64> for Syscall {
    type Error = UnknownSyscall;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .ok()
            .and_then(Syscall::from_repr)
            .ok_or(UnknownSyscall(value))
    }
}

// ─── Syscall Wrappers ──────────────────────────────────────────────

/// `return` (syscall #0): hand the host `length` bytes at `buffer_address`
/// and end the execution with Commit.
///
/// The host is expected never to resume the guest, but nothing here enforces
/// it. Code after this call must not be relied on.
#[inline(always)]
pub fn sys_return(buffer_address: u64, length: u64) {
    trap(Syscall::Return, Operands::Two(buffer_address, length));
}

/// `return` with a slice as the output buffer.
#[inline(always)]
pub fn return_data(data: &[u8]) {
    sys_return(data.as_ptr() as u64, data.len() as u64);
}

/// `sload` (syscall #1): read one word of storage. Unwritten slots read the
/// host default.
#[inline(always)]
pub fn sys_sload(key: u64) -> u64 {
    trap(Syscall::SLoad, Operands::One(key))
}

/// `sstore` (syscall #2): overwrite one word of storage.
#[inline(always)]
pub fn sys_sstore(key: u64, value: u64) {
    trap(Syscall::SStore, Operands::Two(key, value));
}

/// `revert` (syscall #4): abort, discarding every storage write made during
/// this execution.
#[inline(always)]
pub fn sys_revert() -> ! {
    loop {
        // A host that resumes after revert gets the trap again.
        trap(Syscall::Revert, Operands::None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{CALL_FAILURE, CALL_FRAME_SIZE, CALL_SUCCESS};
    use crate::trap::{REG_A0, REG_A1, REG_T0};
    use std::cell::{Cell, RefCell};
    use std::panic::{self, AssertUnwindSafe};
    use strum::IntoEnumIterator;

    // ─── Recording handler ─────────────────────────────────────────

    /// Unwind payload standing in for "the host never resumed the guest".
    struct Halted;

    std::thread_local! {
        static TRAPS: RefCell<Vec<TrapFrame>> = const { RefCell::new(Vec::new()) };
        static SLOAD_REPLY: Cell<u64> = const { Cell::new(0) };
        static CALL_REPLY: RefCell<Option<Vec<u8>>> = const { RefCell::new(None) };
    }

    fn record(frame: &mut TrapFrame) {
        TRAPS.with(|t| t.borrow_mut().push(*frame));
        match Syscall::try_from(frame.t0()) {
            Ok(Syscall::SLoad) => frame.set_a0(SLOAD_REPLY.with(Cell::get)),
            Ok(Syscall::Call) => {
                let reply = CALL_REPLY.with(|r| r.borrow().clone());
                let Some(reply) = reply else {
                    frame.set_a0(CALL_FAILURE);
                    return;
                };
                // SAFETY: a0 is the address of a live CallFrame on the
                // caller's stack; this test runs in the same address space.
                let call = unsafe { &mut *(frame.a0() as *mut CallFrame) };
                let n = reply.len().min(call.output_len as usize);
                // SAFETY: output_ptr/output_len describe the caller's
                // `&mut [u8]`, untouched for the duration of the trap.
                unsafe {
                    core::ptr::copy_nonoverlapping(reply.as_ptr(), call.output_ptr as *mut u8, n);
                }
                call.output_written = n as u64;
                frame.set_a0(CALL_SUCCESS);
            }
            Ok(Syscall::Return) | Ok(Syscall::Revert) => panic::resume_unwind(Box::new(Halted)),
            _ => {}
        }
    }

    fn take_traps() -> Vec<TrapFrame> {
        TRAPS.with(|t| t.borrow_mut().drain(..).collect())
    }

    fn setup() {
        set_trap_handler(record);
        take_traps();
        SLOAD_REPLY.with(|r| r.set(0));
        CALL_REPLY.with(|r| *r.borrow_mut() = None);
    }

    /// Run `f`, expecting it to end on a terminal trap.
    fn expect_halt(f: impl FnOnce()) {
        let result = panic::catch_unwind(AssertUnwindSafe(f));
        match result {
            Err(payload) => assert!(payload.is::<Halted>(), "guest panicked instead of trapping"),
            Ok(()) => panic!("terminal syscall returned to the guest"),
        }
    }

    /// Registers other than t0/a0/a1 must never be written.
    fn assert_only_abi_slots(frame: &TrapFrame) {
        for (i, &reg) in frame.x.iter().enumerate() {
            if i != REG_T0 && i != REG_A0 && i != REG_A1 {
                assert_eq!(reg, 0, "x{} written by the gateway", i);
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // 1. Opcode numbering
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn opcode_values_are_frozen() {
        assert_eq!(u32::from(Syscall::Return), 0);
        assert_eq!(u32::from(Syscall::SLoad), 1);
        assert_eq!(u32::from(Syscall::SStore), 2);
        assert_eq!(u32::from(Syscall::Call), 3);
        assert_eq!(u32::from(Syscall::Revert), 4);
        assert_eq!(Syscall::iter().count(), 5);
    }

    #[test]
    fn opcode_names_round_trip() {
        for syscall in Syscall::iter() {
            let name = syscall.to_string();
            assert_eq!(name.parse::<Syscall>(), Ok(syscall));
        }
        assert_eq!(Syscall::SLoad.to_string(), "sload");
        assert_eq!(Syscall::SStore.to_string(), "sstore");
        assert!("caller".parse::<Syscall>().is_err());

        let name: &'static str = Syscall::Call.into();
        assert_eq!(name, "call");
    }

    #[test]
    fn raw_register_decoding() {
        for syscall in Syscall::iter() {
            assert_eq!(Syscall::try_from(u64::from(syscall)), Ok(syscall));
        }
        assert_eq!(Syscall::try_from(5u64), Err(UnknownSyscall(5)));
        assert_eq!(Syscall::try_from(1u64 << 32), Err(UnknownSyscall(1 << 32)));
        assert_eq!(UnknownSyscall(9).to_string(), "unknown syscall #9");
    }

    // ═══════════════════════════════════════════════════════════════
    // 2. Register encoding per syscall
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn sload_encodes_key_in_a0() {
        setup();
        SLOAD_REPLY.with(|r| r.set(0xdead_beef));

        assert_eq!(sys_sload(42), 0xdead_beef);

        let traps = take_traps();
        assert_eq!(traps.len(), 1);
        assert_eq!(traps[0].t0(), 1);
        assert_eq!(traps[0].a0(), 42);
        assert_eq!(traps[0].a1(), 0);
        assert_only_abi_slots(&traps[0]);
    }

    #[test]
    fn sstore_encodes_key_and_value() {
        setup();
        sys_sstore(42, 0xdead_beef);

        let traps = take_traps();
        assert_eq!(traps.len(), 1);
        assert_eq!(traps[0].t0(), 2);
        assert_eq!(traps[0].a0(), 42);
        assert_eq!(traps[0].a1(), 0xdead_beef);
        assert_only_abi_slots(&traps[0]);
    }

    #[test]
    fn return_encodes_buffer_and_halts() {
        setup();
        expect_halt(|| sys_return(0x8000_1000, 32));

        let traps = take_traps();
        assert_eq!(traps.len(), 1);
        assert_eq!(traps[0].t0(), 0);
        assert_eq!(traps[0].a0(), 0x8000_1000);
        assert_eq!(traps[0].a1(), 32);
        assert_only_abi_slots(&traps[0]);
    }

    #[test]
    fn return_data_passes_slice_address() {
        setup();
        let data = [1u8, 2, 3, 4, 5];
        expect_halt(|| return_data(&data));

        let traps = take_traps();
        assert_eq!(traps[0].a0(), data.as_ptr() as u64);
        assert_eq!(traps[0].a1(), 5);
    }

    #[test]
    fn revert_carries_no_operands() {
        setup();
        expect_halt(|| sys_revert());

        let traps = take_traps();
        assert_eq!(traps.len(), 1);
        assert_eq!(traps[0].t0(), 4);
        assert_eq!(traps[0].a0(), 0);
        assert_eq!(traps[0].a1(), 0);
        assert_only_abi_slots(&traps[0]);
    }

    #[test]
    fn revert_stops_later_side_effects() {
        setup();
        expect_halt(|| {
            sys_sstore(1, 1);
            sys_revert();
            #[allow(unreachable_code)]
            sys_sstore(2, 2);
        });

        let opcodes: Vec<u64> = take_traps().iter().map(TrapFrame::t0).collect();
        assert_eq!(opcodes, [2, 4]);
    }

    #[test]
    fn call_encodes_descriptor() {
        setup();
        CALL_REPLY.with(|r| *r.borrow_mut() = Some(vec![9, 8, 7]));

        let input = [0xAAu8; 4];
        let mut output = [0u8; 8];
        let written = sys_call(77, 5, &input, &mut output);

        assert_eq!(written, Ok(3));
        assert_eq!(&output[..3], &[9, 8, 7]);

        let traps = take_traps();
        assert_eq!(traps.len(), 1);
        assert_eq!(traps[0].t0(), 3);
        assert_ne!(traps[0].a0(), 0);
        assert_eq!(traps[0].a1(), CALL_FRAME_SIZE as u64);
        assert_only_abi_slots(&traps[0]);
    }

    #[test]
    fn call_output_truncated_to_buffer() {
        setup();
        CALL_REPLY.with(|r| *r.borrow_mut() = Some(vec![1; 64]));

        let mut output = [0u8; 4];
        assert_eq!(sys_call(1, 0, &[], &mut output), Ok(4));
        assert_eq!(output, [1; 4]);
    }

    #[test]
    fn call_failure_surfaces_as_error() {
        setup();
        let mut output = [0u8; 4];
        assert_eq!(sys_call(1, 0, &[], &mut output), Err(CallReverted));
        assert_eq!(output, [0; 4]);
    }

    // ═══════════════════════════════════════════════════════════════
    // 3. Typed mapping over the gateway
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn mapping_write_uses_encoded_slot() {
        setup();
        let balances: Mapping<u32, u64> = Mapping::new(7);
        balances.write(3, 100);

        let traps = take_traps();
        assert_eq!(traps[0].t0(), 2);
        assert_eq!(traps[0].a0(), (3 << 32) | 7);
        assert_eq!(traps[0].a1(), 100);
    }

    #[test]
    fn mapping_read_returns_host_word() {
        setup();
        SLOAD_REPLY.with(|r| r.set(55));
        let balances: Mapping<u32, u64> = Mapping::new(7);
        assert_eq!(balances.read(3), 55);
        assert_eq!(take_traps()[0].a0(), (3 << 32) | 7);
    }
}
