//! Build script for machctl-core
//!
//! - Rust toolchain new enough for edition 2024 (1.85), used by machctl-utils
//! - on macOS, a release with the 64-bit `mach_vm_*` interface and, on Apple
//!   Silicon, `ARM_DEBUG_STATE64` single-step support

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    match (rustc_version::version(), rustc_version::Version::parse("1.85.0")) {
        (Ok(found), Ok(minimum)) if found < minimum => {
            panic!("machctl-core requires Rust {minimum} or newer, found {found}");
        }
        (Ok(_), Ok(_)) => {}
        _ => println!("cargo:warning=could not verify Rust version"),
    }

    // cfg!() here describes the build host; the crate's target comes from Cargo.
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_arch = std::env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    if target_os == "macos" {
        check_macos_requirements(&target_arch);
    }
}

fn minimum_macos(target_arch: &str) -> (u32, u32)
{
    if target_arch == "aarch64" { (11, 0) } else { (10, 9) }
}

fn check_macos_requirements(target_arch: &str)
{
    let minimum = minimum_macos(target_arch);

    match macos_version() {
        Some(found) if found < minimum => panic!(
            "machctl-core requires macOS {}.{} or newer on this architecture, found {}.{}",
            minimum.0, minimum.1, found.0, found.1
        ),
        Some(_) => {}
        // Cross-compiling or sandboxed build; nothing to check against.
        None => println!("cargo:warning=could not detect macOS version"),
    }
}

/// Version of the build host; only meaningful when not cross-compiling.
#[cfg(target_os = "macos")]
fn macos_version() -> Option<(u32, u32)>
{
    let output = std::process::Command::new("sw_vers").arg("-productVersion").output().ok()?;
    let text = String::from_utf8(output.stdout).ok()?;
    let mut parts = text.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    Some((major, minor))
}

#[cfg(not(target_os = "macos"))]
fn macos_version() -> Option<(u32, u32)>
{
    None
}
