// Embeds the target triple and, in a git checkout, the commit into the binary.

use std::process::Command;

fn main() {
    let target = std::env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=WURB_TARGET={}", target);

    let commit = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string());
    if let Some(commit) = commit {
        println!("cargo:rustc-env=WURB_GIT_COMMIT={}", commit);
    }

    println!("cargo:rerun-if-changed=../.git/HEAD");
}
