//! Build script — links `libespeak-ng` when the `espeak` feature is enabled.
//!
//! Without the feature nothing is linked and the script exits immediately, so
//! the library, its tests and the HTTP layer build on machines that have no
//! espeak-ng installed.
//!
//! ## Resolution order
//!
//! 1. **`ESPEAK_LIB_DIR`** — directory containing `libespeak-ng.{a,so,dylib}`.
//! 2. **pkg-config** — on macOS the search path is extended with Homebrew's
//!    pkgconfig directories.
//! 3. **Well-known directories** — Homebrew prefixes on macOS; the Debian
//!    multi-arch directory, `/usr/lib64`, `/usr/lib`, `/usr/local/lib` on Linux.
//!
//! A static archive is preferred over a shared library at every step; when
//! one is linked the C++ runtime is added because espeak-ng is C++.

use std::path::Path;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-env-changed=ESPEAK_LIB_DIR");
    println!("cargo:rerun-if-env-changed=PKG_CONFIG_PATH");

    if std::env::var_os("CARGO_FEATURE_ESPEAK").is_none() {
        return;
    }

    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_arch = std::env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();

    if let Ok(dir) = std::env::var("ESPEAK_LIB_DIR") {
        if !link_from_dir(&dir, &target_os) {
            panic!("ESPEAK_LIB_DIR={dir} does not contain libespeak-ng");
        }
        return;
    }

    if pkg_config(&target_os) {
        return;
    }

    for dir in candidate_dirs(&target_os, &target_arch) {
        if link_from_dir(&dir, &target_os) {
            return;
        }
    }

    panic!(
        "\n\n\
         tts-generator: the `espeak` feature needs libespeak-ng.\n\
         \n\
         \t  macOS   :  brew install espeak-ng\n\
         \t  Ubuntu  :  sudo apt install libespeak-ng-dev\n\
         \t  Fedora  :  sudo dnf install espeak-ng-devel\n\
         \t  Alpine  :  apk add espeak-ng-dev\n\
         \n\
         or set ESPEAK_LIB_DIR to the directory that holds the library.\n\n"
    );
}

/// Emit link directives for a library in `dir`.  Returns `false` if absent.
fn link_from_dir(dir: &str, target_os: &str) -> bool {
    let dylib = if target_os == "macos" { "libespeak-ng.dylib" } else { "libespeak-ng.so" };
    let root = Path::new(dir);
    if root.join("libespeak-ng.a").exists() {
        println!("cargo:rustc-link-search=native={dir}");
        println!("cargo:rustc-link-lib=static=espeak-ng");
        let cxx = if target_os == "macos" { "c++" } else { "stdc++" };
        println!("cargo:rustc-link-lib=dylib={cxx}");
        true
    } else if root.join(dylib).exists() {
        println!("cargo:rustc-link-search=native={dir}");
        println!("cargo:rustc-link-lib=dylib=espeak-ng");
        true
    } else {
        false
    }
}

/// Ask pkg-config; returns `true` once link flags have been emitted.
fn pkg_config(target_os: &str) -> bool {
    let mut paths: Vec<String> = Vec::new();
    if target_os == "macos" {
        for prefix in ["/opt/homebrew", "/usr/local"] {
            for sub in ["lib/pkgconfig", "share/pkgconfig"] {
                let p = format!("{prefix}/{sub}");
                if Path::new(&p).is_dir() {
                    paths.push(p);
                }
            }
        }
    }
    if let Ok(existing) = std::env::var("PKG_CONFIG_PATH") {
        if !existing.is_empty() {
            paths.push(existing);
        }
    }

    let Ok(out) = Command::new("pkg-config")
        .args(["--libs", "espeak-ng"])
        .env("PKG_CONFIG_PATH", paths.join(":"))
        .output()
    else {
        return false;
    };
    if !out.status.success() {
        return false;
    }

    for flag in String::from_utf8_lossy(&out.stdout).split_whitespace() {
        if let Some(path) = flag.strip_prefix("-L") {
            println!("cargo:rustc-link-search=native={path}");
        } else if let Some(lib) = flag.strip_prefix("-l") {
            println!("cargo:rustc-link-lib=dylib={lib}");
        }
    }
    true
}

fn candidate_dirs(target_os: &str, target_arch: &str) -> Vec<String> {
    let mut dirs = Vec::new();
    if target_os == "macos" {
        for prefix in ["/opt/homebrew", "/usr/local"] {
            dirs.push(format!("{prefix}/opt/espeak-ng/lib"));
            dirs.push(format!("{prefix}/lib"));
        }
    } else {
        let multiarch = match target_arch {
            "x86_64" => Some("x86_64-linux-gnu"),
            "aarch64" => Some("aarch64-linux-gnu"),
            "arm" => Some("arm-linux-gnueabihf"),
            _ => None,
        };
        if let Some(triple) = multiarch {
            dirs.push(format!("/usr/lib/{triple}"));
        }
        dirs.extend(["/usr/lib64", "/usr/lib", "/usr/local/lib"].map(String::from));
    }
    dirs.retain(|d| Path::new(d).is_dir());
    dirs
}
