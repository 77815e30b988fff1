//! Build script for peer-review
//!
//! Embeds the git revision, build time, target and profile into the binary.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");

    let git_hash = command_output("git", &["rev-parse", "--short=8", "HEAD"]);
    let rustc_version = command_output("rustc", &["--version"]);
    let built_at = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=PEER_REVIEW_GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=PEER_REVIEW_BUILD_TIMESTAMP={}", built_at);
    println!("cargo:rustc-env=PEER_REVIEW_TARGET={}", target);
    println!("cargo:rustc-env=PEER_REVIEW_PROFILE={}", profile);
    println!("cargo:rustc-env=PEER_REVIEW_RUSTC_VERSION={}", rustc_version);
}

/// Trimmed stdout of a command, or "unknown" if it cannot run or fails
fn command_output(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
