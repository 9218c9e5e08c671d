//! Build script for tidecli.
//!
//! Copies the `.env.example` template into the per-user config directory so
//! that users find it next to the `.env` file the binary loads at startup.

use std::{env, fs, path::PathBuf};

/// Copies `.env.example` to `<config_dir>/tidecli/.env.example`.
///
/// - Linux: `~/.config/tidecli/.env.example`
/// - macOS: `~/Library/Application Support/tidecli/.env.example`
/// - Windows: `%APPDATA%/tidecli/.env.example`
///
/// Every failure is reported as a `cargo:warning`; a read-only home directory
/// (CI, sandboxed builds) must never break the build.
fn main() {
    println!("cargo:rerun-if-changed=.env.example");

    let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") else {
        println!("cargo:warning=CARGO_MANIFEST_DIR is not set");
        return;
    };
    let template = PathBuf::from(manifest_dir).join(".env.example");
    if !template.is_file() {
        println!("cargo:warning=.env.example not found at {}", template.display());
        return;
    }

    let Some(mut out_dir) = dirs::config_dir() else {
        println!("cargo:warning=no config directory on this platform, skipping .env.example");
        return;
    };
    out_dir.push("tidecli");

    let copied = fs::create_dir_all(&out_dir)
        .and_then(|_| fs::copy(&template, out_dir.join(".env.example")));
    if let Err(e) = copied {
        println!(
            "cargo:warning=cannot copy .env.example to {}: {}",
            out_dir.display(),
            e
        );
    }
}
