//! Locating the built debug APK
//!
//! The Android template emits one flavor directory per build target under
//! the apk output root. The flavor matching the detected architecture is
//! checked first; when it is absent (older templates emit only `universal`)
//! the other flavors are scanned rather than silently assuming a path.

use std::path::{Path, PathBuf};

use devdroid_adb::DeviceArchitecture;
use devdroid_core::prelude::*;

/// Flavor directory the Android template emits for each build target.
fn flavor_dir(arch: DeviceArchitecture) -> &'static str {
    match arch {
        DeviceArchitecture::Aarch64 => "arm64",
        DeviceArchitecture::Armv7 => "arm",
        DeviceArchitecture::X86_64 => "x86_64",
        DeviceArchitecture::I686 => "x86",
        DeviceArchitecture::Unknown => "universal",
    }
}

fn apk_output_root(project_root: &Path) -> PathBuf {
    project_root
        .join("src-tauri")
        .join("gen")
        .join("android")
        .join("app")
        .join("build")
        .join("outputs")
        .join("apk")
}

/// Find the debug APK produced for `arch`.
///
/// Prefers the exact flavor output; falls back to scanning every flavor's
/// debug directory (`universal` first, since it runs everywhere). Fails
/// descriptively when nothing installable exists.
pub fn locate_debug_apk(project_root: &Path, arch: DeviceArchitecture) -> Result<PathBuf> {
    let root = apk_output_root(project_root);
    let flavor = flavor_dir(arch);

    let direct = root
        .join(flavor)
        .join("debug")
        .join(format!("app-{flavor}-debug.apk"));
    if direct.is_file() {
        return Ok(direct);
    }

    let mut flavors: Vec<PathBuf> = std::fs::read_dir(&root)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect()
        })
        .unwrap_or_default();
    flavors.sort();
    flavors.sort_by_key(|d| {
        d.file_name()
            .map(|n| n != std::ffi::OsStr::new("universal"))
            .unwrap_or(true)
    });

    for dir in flavors {
        let debug_dir = dir.join("debug");
        let Ok(files) = std::fs::read_dir(&debug_dir) else {
            continue;
        };
        let mut apks: Vec<PathBuf> = files
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "apk").unwrap_or(false))
            .collect();
        apks.sort();
        if let Some(apk) = apks.into_iter().next() {
            warn!(
                "No {} flavor output found, using {}",
                flavor,
                apk.display()
            );
            return Ok(apk);
        }
    }

    Err(Error::ArtifactMissing { searched: root })
}
