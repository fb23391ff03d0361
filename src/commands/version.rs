//! Command: print version information.

/// Version string embedded by the build script, or the crate version.
#[must_use]
pub fn version() -> &'static str {
    option_env!("CONFBUNDLER_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Print the confbundler version to stdout.
pub fn run() {
    println!("confbundler {}", version());
}
