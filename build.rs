use std::{env, error::Error, fs, path::PathBuf};

fn main() -> Result<(), Box<dyn Error>> {
    // Only the `rt` feature needs the linker scripts; host builds skip them.
    if env::var_os("CARGO_FEATURE_RT").is_none() {
        return Ok(());
    }

    // Put the linker scripts somewhere the linker can find them
    let out = &PathBuf::from(env::var_os("OUT_DIR").ok_or("OUT_DIR not set")?);
    println!("cargo:rustc-link-search={}", out.display());

    fs::copy("ld/memory.x", out.join("memory.x"))?;
    fs::copy("ld/device.x", out.join("device.x"))?;

    // Only re-run the build script when the linker scripts change,
    // instead of when any part of the source code changes.
    println!("cargo:rerun-if-changed=ld/memory.x");
    println!("cargo:rerun-if-changed=ld/device.x");

    if env::var_os("CARGO_FEATURE_DEFMT").is_some() {
        println!("cargo:rustc-link-arg=-Tdefmt.x");
    }

    Ok(())
}
