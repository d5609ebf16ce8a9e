// build.rs

fn main() {
    // The GBM allocator binding is compiled only when pkg-config finds libgbm.
    println!("cargo::rustc-check-cfg=cfg(has_gbm)");
    println!("cargo:rerun-if-env-changed=PKG_CONFIG_PATH");

    match pkg_config::probe_library("gbm") {
        Ok(lib) => {
            println!("cargo:rustc-cfg=has_gbm");
            eprintln!(
                "pkg-config found gbm {}. Allocator binding enabled.",
                lib.version
            );
        }
        Err(e) => {
            println!(
                "cargo:warning=libgbm not found via pkg-config ({}); building without the GBM allocator binding",
                e
            );
        }
    }
}
