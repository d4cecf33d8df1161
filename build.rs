use std::process::Command;
fn main() {
    // Source tarballs have no git metadata, the version then falls back to Cargo's.
    let git_describe = Command::new("git")
        .args(&["describe", "--tags", "--always"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .unwrap_or_default();
    println!("cargo:rustc-env=GIT_DESCRIBE={}", git_describe.trim());
}
