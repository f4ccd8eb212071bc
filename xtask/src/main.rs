// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

fn run(root: &Path, cmd: &str) -> Result<(), String> {
    let status = Command::new("sh")
        .arg("-lc")
        .arg(cmd)
        .current_dir(root)
        .status()
        .map_err(|e| format!("failed to run `{cmd}`: {e}"))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("command failed: {cmd}"))
    }
}

fn rust_sources(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), String> {
    let entries = fs::read_dir(dir).map_err(|e| format!("read {}: {e}", dir.display()))?;
    for entry in entries {
        let entry = entry.map_err(|e| format!("read {}: {e}", dir.display()))?;
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().map_or(false, |n| n == "target") {
                continue;
            }
            rust_sources(&path, out)?;
        } else if path.extension().map_or(false, |ext| ext == "rs") {
            out.push(path);
        }
    }
    Ok(())
}

/// Every crate source file carries the license header on its first line.
fn check_headers(root: &Path) -> Result<(), String> {
    let mut sources = Vec::new();
    rust_sources(&root.join("crates"), &mut sources)?;
    rust_sources(&root.join("xtask/src"), &mut sources)?;
    sources.sort();
    let mut missing = Vec::new();
    for path in &sources {
        let text = fs::read_to_string(path).map_err(|e| format!("read {}: {e}", path.display()))?;
        if text.lines().next() != Some("// SPDX-License-Identifier: Apache-2.0") {
            missing.push(path.display().to_string());
        }
    }
    if missing.is_empty() {
        eprintln!("{} files carry the license header", sources.len());
        Ok(())
    } else {
        Err(format!("missing license header:\n  {}", missing.join("\n  ")))
    }
}

fn main() -> ExitCode {
    let arg = env::args().nth(1).unwrap_or_else(|| "help".to_string());
    let root = match Path::new(env!("CARGO_MANIFEST_DIR")).parent() {
        Some(root) => root,
        None => {
            eprintln!("xtask manifest dir has no parent");
            return ExitCode::FAILURE;
        }
    };

    let result = match arg.as_str() {
        "check-headers" => check_headers(root),
        "lint" => run(root, "cargo fmt --all --check && cargo clippy --workspace --all-targets -- -D warnings"),
        "ci" => check_headers(root).and_then(|()| {
            run(root, "cargo fmt --all --check && cargo clippy --workspace --all-targets -- -D warnings && cargo test --workspace")
        }),
        "help" | "--help" | "-h" => {
            eprintln!("xtask commands:");
            eprintln!("  check-headers");
            eprintln!("  lint");
            eprintln!("  ci");
            Ok(())
        }
        _ => Err(format!(
            "unknown xtask command: {arg} (try `cargo run --manifest-path xtask/Cargo.toml -- help`)"
        )),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
