use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}

fn main() {
    let version = env!("CARGO_PKG_VERSION");
    let profile = std::env::var("PROFILE").unwrap_or_default();

    // Release builds report the package version only
    let version_str = if profile == "release" {
        version.to_string()
    } else {
        let hash = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
        let dirty = git(&["status", "--porcelain"]).is_some_and(|status| !status.is_empty());

        if dirty {
            format!("{} ({}-dirty)", version, hash)
        } else {
            format!("{} ({})", version, hash)
        }
    };

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rustc-env=VERSION_STRING={}", version_str);
}
