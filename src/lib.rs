//! Sandbox reference host — library crate
//!
//! Services the contract syscall ABI (`libsyscall`) in-process, so guest
//! programs compiled for the build machine run against real Commit / Abort
//! semantics and their traps can be inspected register by register.
//!
//! On riscv64 the gateway traps with `ecall` and this crate is not involved.

// ─── Modules ───────────────────────────────────────────────────────

/// Limits and policies (defaults, fall-through, call depth)
pub mod config;

/// Host-level errors
pub mod error;

/// Trap entry, syscall dispatch, guest buffer validation
pub mod exception;

/// Embedder API
pub mod host;

/// Execution frames, journaled storage
pub mod kernel;

// ─── Re-exports ────────────────────────────────────────────────────

pub use config::{FallthroughPolicy, HostConfig};
pub use error::HostError;
pub use exception::{handle_ecall, BufferFault};
pub use host::{Host, Outcome, Receipt};
pub use kernel::exec::{CallRecord, ContractId, ExecState, Program, TrapRecord};
pub use kernel::storage::Storage;
