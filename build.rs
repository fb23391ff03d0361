use std::process::Command;

const VERSION_ENV: &str = "CONFBUNDLER_VERSION";

/// Version from `git describe`, if this is a git checkout.
fn describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!version.is_empty()).then_some(version)
}

fn main() {
    // A release pipeline may pin the version; local builds use git.
    if let Some(version) = std::env::var(VERSION_ENV).ok().or_else(describe) {
        println!("cargo:rustc-env={VERSION_ENV}={version}");
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
    println!("cargo:rerun-if-env-changed={VERSION_ENV}");
}
