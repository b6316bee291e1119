//! Device CPU architecture mapping
//!
//! Android devices report their instruction set as an ABI string via
//! `getprop ro.product.cpu.abi`; the build tool wants a Rust-style target
//! keyword. The mapping is a fixed table; anything unrecognized is `Unknown`
//! and the session continues without an explicit build target.

use std::fmt;

/// CPU architecture of the attached device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceArchitecture {
    Aarch64,
    Armv7,
    X86_64,
    I686,
    Unknown,
}

impl DeviceArchitecture {
    /// Map a raw device ABI string to an architecture.
    ///
    /// Total on all inputs: unmapped ABIs yield `Unknown`, never an error.
    pub fn from_abi(abi: &str) -> Self {
        match abi.trim() {
            "arm64-v8a" => Self::Aarch64,
            "armeabi-v7a" => Self::Armv7,
            "x86_64" => Self::X86_64,
            "x86" => Self::I686,
            _ => Self::Unknown,
        }
    }

    /// The `--target` keyword the build tool accepts, if one applies.
    pub fn build_target(&self) -> Option<&'static str> {
        match self {
            Self::Aarch64 => Some("aarch64"),
            Self::Armv7 => Some("armv7"),
            Self::X86_64 => Some("x86_64"),
            Self::I686 => Some("i686"),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for DeviceArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Aarch64 => "aarch64",
            Self::Armv7 => "armv7",
            Self::X86_64 => "x86_64",
            Self::I686 => "i686",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_abis() {
        assert_eq!(
            DeviceArchitecture::from_abi("arm64-v8a"),
            DeviceArchitecture::Aarch64
        );
        assert_eq!(
            DeviceArchitecture::from_abi("armeabi-v7a"),
            DeviceArchitecture::Armv7
        );
        assert_eq!(
            DeviceArchitecture::from_abi("x86_64"),
            DeviceArchitecture::X86_64
        );
        assert_eq!(DeviceArchitecture::from_abi("x86"), DeviceArchitecture::I686);
    }

    #[test]
    fn test_unmapped_abi_is_unknown() {
        assert_eq!(
            DeviceArchitecture::from_abi("riscv64"),
            DeviceArchitecture::Unknown
        );
        assert_eq!(DeviceArchitecture::from_abi(""), DeviceArchitecture::Unknown);
        assert_eq!(
            DeviceArchitecture::from_abi("mips"),
            DeviceArchitecture::Unknown
        );
    }

    #[test]
    fn test_abi_is_trimmed() {
        // getprop output arrives with a trailing newline
        assert_eq!(
            DeviceArchitecture::from_abi("arm64-v8a\n"),
            DeviceArchitecture::Aarch64
        );
    }

    #[test]
    fn test_build_targets() {
        assert_eq!(DeviceArchitecture::Aarch64.build_target(), Some("aarch64"));
        assert_eq!(DeviceArchitecture::Armv7.build_target(), Some("armv7"));
        assert_eq!(DeviceArchitecture::X86_64.build_target(), Some("x86_64"));
        assert_eq!(DeviceArchitecture::I686.build_target(), Some("i686"));
        assert_eq!(DeviceArchitecture::Unknown.build_target(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(DeviceArchitecture::Aarch64.to_string(), "aarch64");
        assert_eq!(DeviceArchitecture::Unknown.to_string(), "unknown");
    }
}
