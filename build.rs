//! Build script that stamps the short git revision into the binary.
//!
//! `showme version` reports it through `BEEBOT_GIT_REV`. Outside a git
//! checkout nothing is emitted and the crate version is used instead.

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs");
    println!("cargo:rerun-if-env-changed=BEEBOT_GIT_REV");

    if std::env::var_os("BEEBOT_GIT_REV").is_some() {
        return;
    }

    let output = Command::new("git").args(["rev-parse", "--short", "HEAD"]).output();

    if let Ok(output) = output
        && output.status.success()
    {
        let revision = String::from_utf8_lossy(&output.stdout).trim().to_string();

        if !revision.is_empty() {
            println!("cargo:rustc-env=BEEBOT_GIT_REV={revision}");
        }
    }
}
