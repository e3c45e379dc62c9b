//! Trap invocation primitive.
//!
//! Every syscall in this crate funnels through [`trap`]. On `riscv64` that is
//! a single `ecall` with the opcode pinned to t0 and the operands to a0/a1.
//! On any other target the trap is routed to a handler registered with
//! [`set_trap_handler`], which sees the register file as a [`TrapFrame`].

use bytemuck::{Pod, Zeroable};

use crate::Syscall;

// ─── Register slots ────────────────────────────────────────────────

/// x5: opcode
pub const REG_T0: usize = 5;
/// x10: first operand, result
pub const REG_A0: usize = 10;
/// x11: second operand
pub const REG_A1: usize = 11;

/// Number of RISC-V integer registers (x0–x31).
pub const NUM_REGS: usize = 32;

// ─── TrapFrame: register snapshot, 256 bytes ───────────────────────

/// Integer register file as seen by the host at the moment of the trap.
/// Layout is `x[n]` = register xn. DO NOT reorder.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct TrapFrame {
    pub x: [u64; NUM_REGS],
}

/// TrapFrame size in bytes.
pub const TRAPFRAME_SIZE: usize = NUM_REGS * 8;

impl TrapFrame {
    #[inline]
    pub fn t0(&self) -> u64 {
        self.x[REG_T0]
    }

    #[inline]
    pub fn a0(&self) -> u64 {
        self.x[REG_A0]
    }

    #[inline]
    pub fn a1(&self) -> u64 {
        self.x[REG_A1]
    }

    /// Write the result register.
    #[inline]
    pub fn set_a0(&mut self, value: u64) {
        self.x[REG_A0] = value;
    }
}

// ─── Operands ──────────────────────────────────────────────────────

/// Operands carried by a trap: none, a0, or a0 + a1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operands {
    None,
    One(u64),
    Two(u64, u64),
}

// ─── Trap: riscv64 ─────────────────────────────────────────────────

/// Raise `syscall` with `operands` and return whatever the host left in a0.
///
/// The asm block is not `nomem`, so the compiler treats it as reading and
/// writing all memory: no guest load or store moves across the `ecall`.
#[cfg(target_arch = "riscv64")]
#[inline(always)]
pub fn trap(syscall: Syscall, operands: Operands) -> u64 {
    let opcode = u64::from(syscall);
    let ret: u64;
    // SAFETY: ECALL enters the host synchronously. The host only touches
    // guest memory the guest handed over by address in a0.
    unsafe {
        match operands {
            Operands::None => core::arch::asm!(
                "ecall",
                in("t0") opcode,
                lateout("a0") ret,
                options(nostack)
            ),
            Operands::One(a0) => core::arch::asm!(
                "ecall",
                in("t0") opcode,
                inlateout("a0") a0 => ret,
                options(nostack)
            ),
            Operands::Two(a0, a1) => core::arch::asm!(
                "ecall",
                in("t0") opcode,
                inlateout("a0") a0 => ret,
                in("a1") a1,
                options(nostack)
            ),
        }
    }
    ret
}

// ─── Trap: host route ──────────────────────────────────────────────

/// Host-side servicer for traps raised off-target.
#[cfg(not(target_arch = "riscv64"))]
pub type TrapHandler = fn(&mut TrapFrame);

#[cfg(not(target_arch = "riscv64"))]
static HANDLER: spin::RwLock<Option<TrapHandler>> = spin::RwLock::new(None);

/// Install `handler` as the servicer for every subsequent trap.
/// Returns the previously installed handler.
#[cfg(not(target_arch = "riscv64"))]
pub fn set_trap_handler(handler: TrapHandler) -> Option<TrapHandler> {
    HANDLER.write().replace(handler)
}

/// Remove the installed handler.
#[cfg(not(target_arch = "riscv64"))]
pub fn clear_trap_handler() -> Option<TrapHandler> {
    HANDLER.write().take()
}

/// Raise `syscall` with `operands` and return whatever the handler left in a0.
///
/// Only the documented slots are filled; every other register in the frame
/// is zero. Fenced on both sides so the optimizer keeps guest memory
/// accesses on their side of the handler call.
#[cfg(not(target_arch = "riscv64"))]
#[inline(never)]
pub fn trap(syscall: Syscall, operands: Operands) -> u64 {
    use core::sync::atomic::{compiler_fence, Ordering};

    // Copy out so the lock is not held while the host runs (it may trap again).
    let handler = *HANDLER.read();
    let Some(handler) = handler else {
        panic!("`{}` trap raised with no host handler installed", syscall);
    };

    let mut frame = TrapFrame::zeroed();
    frame.x[REG_T0] = u64::from(syscall);
    match operands {
        Operands::None => {}
        Operands::One(a0) => frame.x[REG_A0] = a0,
        Operands::Two(a0, a1) => {
            frame.x[REG_A0] = a0;
            frame.x[REG_A1] = a1;
        }
    }

    compiler_fence(Ordering::SeqCst);
    handler(&mut frame);
    compiler_fence(Ordering::SeqCst);

    frame.a0()
}
