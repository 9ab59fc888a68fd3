//! Build script: git hash for the version string, plus pre-flight checks for
//! the GPU feature flags of the whisper recognizer.

use std::env;
use std::process::Command;

fn main() {
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        && output.status.success()
    {
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=GIT_HASH={}", hash);
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");

    if env::var_os("CARGO_FEATURE_CUDA").is_some() {
        require_tool(
            "nvcc",
            &["--version"],
            "CUDA toolkit not found (nvcc). Install it or build without --features cuda",
        );
    }
    if env::var_os("CARGO_FEATURE_VULKAN").is_some() {
        require_tool(
            "glslc",
            &["--version"],
            "Vulkan shader compiler not found (glslc). Install the Vulkan SDK or build without --features vulkan",
        );
    }
}

/// Fails the build early when a toolkit binary is missing, instead of deep
/// inside whisper-rs-sys.
fn require_tool(binary: &str, args: &[&str], message: &str) {
    match Command::new(binary).args(args).output() {
        Ok(out) if out.status.success() => {
            let text = String::from_utf8_lossy(&out.stdout);
            if let Some(line) = text.lines().last() {
                println!("cargo::warning={binary}: {}", line.trim());
            }
        }
        _ => panic!("{message}"),
    }
}
