// Demo guest image — riscv64 only.
// On the build machine this binary is an empty stub; the logic is tested
// through the library against the reference host.

#![cfg_attr(target_arch = "riscv64", no_std)]
#![cfg_attr(target_arch = "riscv64", no_main)]

#[cfg(target_arch = "riscv64")]
use core::panic::PanicInfo;

// ─── Entry point ───────────────────────────────────────────────────

/// Guest entry — run the storage check, then commit.
#[cfg(target_arch = "riscv64")]
#[no_mangle]
#[link_section = ".text._start"]
pub extern "C" fn _start() -> ! {
    storage_check::check_and_return();
    // Host did not honour `return`.
    libsyscall::sys_revert()
}

#[cfg(target_arch = "riscv64")]
#[panic_handler]
fn panic(_: &PanicInfo) -> ! {
    libsyscall::sys_revert()
}

#[cfg(not(target_arch = "riscv64"))]
fn main() {
    eprintln!("storage-check is a guest image; build it with --target riscv64imac-unknown-none-elf");
}
