//! # devdroid-adb - Device Bridge Layer
//!
//! External command invocation and the adb-specific semantic layer on top of it.
//!
//! ## Public API
//!
//! ### Command Invocation (`command`)
//! - [`CommandRunner`] / [`LocalCommandRunner`] - Capability trait for running
//!   external commands, substitutable with a fake in tests
//! - [`SystemRunner`] - The real implementation on `tokio::process`
//! - [`CommandRequest`], [`CommandOutput`] - Invocation parameters and results
//!
//! ### Device Bridge (`bridge`)
//! - [`locate_adb()`] - Resolve the adb executable beneath `ANDROID_HOME`
//! - [`AdbBridge`] - Install, reverse-forward, launch, pid query, logcat
//! - [`LogFilter`] - Pid-exact or tag-allowlist log streaming
//!
//! ### Architecture (`arch`)
//! - [`DeviceArchitecture`] - ABI string to architecture mapping

pub mod arch;
pub mod bridge;
pub mod command;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

pub use arch::DeviceArchitecture;
pub use bridge::{locate_adb, AdbBridge, LogFilter, SDK_ROOT_ENV};
pub use command::{CommandOutput, CommandRequest, CommandRunner, LocalCommandRunner, SystemRunner};
