//! Application error types with rich context

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // SDK/Bridge Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("ANDROID_HOME is not set")]
    SdkRootUnset,

    #[error("adb not found at: {path}")]
    AdbNotFound { path: PathBuf },

    // ─────────────────────────────────────────────────────────────
    // External Tool Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Executable not found: {program}")]
    ToolNotFound { program: String },

    #[error("Command failed ({command}), exit code: {code:?}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
    },

    #[error("Failed to spawn process: {reason}")]
    ProcessSpawn { reason: String },

    #[error("Package install was refused by the device: {message}")]
    InstallRefused { message: String },

    // ─────────────────────────────────────────────────────────────
    // Session Errors
    // ─────────────────────────────────────────────────────────────
    #[error("No usable LAN address detected")]
    NoLanAddress,

    #[error("No debug APK found under: {searched}")]
    ArtifactMissing { searched: PathBuf },

    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The user asked the session to stop. Not a failure.
    #[error("Session interrupted")]
    Interrupted,
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn tool_not_found(program: impl Into<String>) -> Self {
        Self::ToolNotFound {
            program: program.into(),
        }
    }

    pub fn command_failed(command: impl Into<String>, code: Option<i32>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            code,
        }
    }

    pub fn process_spawn(reason: impl Into<String>) -> Self {
        Self::ProcessSpawn {
            reason: reason.into(),
        }
    }

    pub fn install_refused(message: impl Into<String>) -> Self {
        Self::InstallRefused {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Exit status the process should report for this error.
    ///
    /// A user-requested stop is a clean shutdown, not a failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Interrupted => 0,
            _ => 1,
        }
    }

    /// Actionable remediation hint for fatal conditions, where one exists.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Error::SdkRootUnset => Some(
                "Set ANDROID_HOME to your Android SDK root (the directory containing platform-tools/).",
            ),
            Error::AdbNotFound { .. } => Some(
                "Install Android platform-tools, or point ANDROID_HOME at a complete SDK.",
            ),
            Error::InstallRefused { .. } => Some(
                "Ensure the device is connected over USB, USB debugging is enabled, and this computer is authorized on the device.",
            ),
            Error::NoLanAddress => Some(
                "Check that this machine and the device are on the same network, and that a physical adapter is up.",
            ),
            Error::ToolNotFound { .. } => Some("Check that the tool is installed and on PATH."),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = Error::command_failed("adb install", Some(1));
        assert_eq!(err.to_string(), "Command failed (adb install), exit code: Some(1)");

        let err = Error::SdkRootUnset;
        assert!(err.to_string().contains("ANDROID_HOME"));

        let err = Error::tool_not_found("pnpm");
        assert!(err.to_string().contains("pnpm"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::Interrupted.exit_code(), 0);
        assert_eq!(Error::SdkRootUnset.exit_code(), 1);
        assert_eq!(Error::NoLanAddress.exit_code(), 1);
        assert_eq!(Error::command_failed("adb", None).exit_code(), 1);
    }

    #[test]
    fn test_remediation_hints() {
        assert!(Error::SdkRootUnset.remediation().is_some());
        assert!(Error::install_refused("failure").remediation().is_some());
        assert!(Error::NoLanAddress.remediation().is_some());
        assert!(Error::Interrupted.remediation().is_none());
    }

    #[test]
    fn test_install_refused_message() {
        let err = Error::install_refused("INSTALL_FAILED_USER_RESTRICTED");
        assert!(err.to_string().contains("INSTALL_FAILED_USER_RESTRICTED"));
    }
}
