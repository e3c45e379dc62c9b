//! Demo guest — sstore / sload round trip.
//!
//! Stores `0xdeadbeef` at key 42, loads it back and reverts if the host
//! returned anything else. Used as the riscv64 image in `main.rs` and run
//! directly against the reference host in its tests.

#![no_std]

use libsyscall::{sys_return, sys_revert, sys_sload, sys_sstore};

/// Link address of the riscv64 image; `linker.ld` places `.text` here.
pub const LOAD_ADDRESS: u64 = 0x8000_0000;

pub const KEY: u64 = 42;
pub const VALUE: u64 = 0xdead_beef;

/// Revert unless slot `key` holds `expected`.
pub fn verify(key: u64, expected: u64) {
    if sys_sload(key) != expected {
        sys_revert();
    }
}

/// Store, load, compare. Ends without a terminal call when the check passes.
pub fn check() {
    sys_sstore(KEY, VALUE);
    verify(KEY, VALUE);
}

/// [`check`], then commit with empty output.
pub fn check_and_return() {
    check();
    sys_return(0, 0);
}
