fn main() {
    // Linker script only applies to the riscv64 guest image.
    if std::env::var("CARGO_CFG_TARGET_ARCH").as_deref() == Ok("riscv64") {
        let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
        println!("cargo:rustc-link-arg-bins=-T{}/linker.ld", manifest_dir);
    }
    println!("cargo:rerun-if-changed=linker.ld");
}
