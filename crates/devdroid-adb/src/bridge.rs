//! adb device-bridge operations
//!
//! Thin semantic layer over [`CommandRunner`](crate::command::CommandRunner)
//! specialized for the attached device: architecture query, package install,
//! reverse port forwarding, component launch, pid query, and log streaming.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

use devdroid_core::prelude::*;

use crate::arch::DeviceArchitecture;
use crate::command::{CommandRequest, LocalCommandRunner};

/// Environment variable naming the Android SDK root.
pub const SDK_ROOT_ENV: &str = "ANDROID_HOME";

/// Locate the adb executable beneath the SDK root.
///
/// Fails descriptively if `ANDROID_HOME` is unset or the executable is absent
/// under `<root>/platform-tools/`.
pub fn locate_adb() -> Result<PathBuf> {
    let root = std::env::var_os(SDK_ROOT_ENV).ok_or(Error::SdkRootUnset)?;
    let name = if cfg!(windows) { "adb.exe" } else { "adb" };
    let path = Path::new(&root).join("platform-tools").join(name);
    if !path.is_file() {
        return Err(Error::AdbNotFound { path });
    }
    // Strip Windows UNC prefixes so the path stays readable in traces
    Ok(dunce::canonicalize(&path).unwrap_or(path))
}

/// Filter used for log streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFilter {
    /// Exact process id. Captures everything the app logs, including
    /// low-level input events.
    Pid(u32),
    /// Tag allow-list. Degraded mode for when the pid could not be resolved.
    Tags(Vec<String>),
}

/// Device-bridge command layer.
///
/// All operations are synchronous from the pipeline's point of view except
/// [`stream_logs`](AdbBridge::stream_logs), which hands back a long-running
/// child for the caller to register with the supervisor.
pub struct AdbBridge<R> {
    adb: PathBuf,
    runner: R,
}

impl<R: LocalCommandRunner> AdbBridge<R> {
    pub fn new(adb: PathBuf, runner: R) -> Self {
        Self { adb, runner }
    }

    pub fn adb_path(&self) -> &Path {
        &self.adb
    }

    fn request<I, S>(&self, args: I) -> CommandRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandRequest::new(self.adb.to_string_lossy(), args)
    }

    /// Query the attached device's CPU architecture.
    ///
    /// Never fails: an unreadable or unmapped ABI degrades to
    /// [`DeviceArchitecture::Unknown`] and the session continues without an
    /// explicit build target.
    pub async fn query_architecture(&self) -> DeviceArchitecture {
        let request = self.request(["shell", "getprop", "ro.product.cpu.abi"]);
        match self.runner.run(request).await {
            Ok(Some(output)) => {
                let abi = output.stdout.trim();
                let arch = DeviceArchitecture::from_abi(abi);
                if arch == DeviceArchitecture::Unknown {
                    warn!("Unrecognized device ABI {:?}, continuing without a build target", abi);
                }
                arch
            }
            Ok(None) => {
                warn!("Device ABI query failed, continuing without a build target");
                DeviceArchitecture::Unknown
            }
            Err(e) => {
                warn!("Device ABI query failed: {}", e);
                DeviceArchitecture::Unknown
            }
        }
    }

    /// Install a package onto the device, replacing any existing install.
    pub async fn install(&self, apk: &Path) -> Result<()> {
        let request = self
            .request(["install", "-r", &apk.to_string_lossy()])
            .unchecked();
        let output = self
            .runner
            .run(request)
            .await?
            .ok_or_else(|| Error::process_spawn("install produced no result"))?;

        // Older adb versions exit 0 and print "Failure [...]" instead
        if !output.success() || output.stdout.contains("Failure") {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            return Err(Error::install_refused(detail));
        }
        Ok(())
    }

    /// Point the device's `remote_port` back at `local_port` on this host.
    ///
    /// Existing reverse rules are cleared first; that clear failing is fine
    /// (there may be none), but failing to establish the new rule is fatal.
    pub async fn configure_forwarding(&self, local_port: u16, remote_port: u16) -> Result<()> {
        let clear = self.request(["reverse", "--remove-all"]).unchecked();
        if let Err(e) = self.runner.run(clear).await {
            debug!("Clearing reverse rules failed (ignored): {}", e);
        }

        let add = self
            .request([
                "reverse".to_string(),
                format!("tcp:{remote_port}"),
                format!("tcp:{local_port}"),
            ])
            .unchecked();
        let output = self
            .runner
            .run(add)
            .await?
            .ok_or_else(|| Error::process_spawn("reverse produced no result"))?;
        if !output.success() {
            return Err(Error::command_failed(
                format!("adb reverse tcp:{remote_port} tcp:{local_port}"),
                output.code,
            ));
        }
        Ok(())
    }

    /// Start the named application component on the device.
    pub async fn launch(&self, package: &str, activity: &str) -> Result<()> {
        let component = format!("{package}/{activity}");
        let request = self
            .request(["shell", "am", "start", "-n", &component])
            .unchecked();
        let output = self
            .runner
            .run(request)
            .await?
            .ok_or_else(|| Error::process_spawn("am start produced no result"))?;

        // `am start` reports some failures on stdout with a zero exit
        if !output.success() || output.stdout.contains("Error") || output.stderr.contains("Error") {
            return Err(Error::command_failed(
                format!("adb shell am start -n {component}"),
                output.code,
            ));
        }
        Ok(())
    }

    /// Query the running process id for a package. Single attempt.
    ///
    /// `pidof` may report several ids; the first is used. Returns `None` when
    /// nothing matched, which callers treat as a degradation, not an abort.
    pub async fn resolve_pid(&self, package: &str) -> Option<u32> {
        let request = self.request(["shell", "pidof", package]);
        match self.runner.run(request).await {
            Ok(Some(output)) => output
                .stdout
                .split_whitespace()
                .next()
                .and_then(|s| s.parse::<u32>().ok()),
            Ok(None) => None,
            Err(e) => {
                debug!("pidof query failed: {}", e);
                None
            }
        }
    }

    /// Resolve the package's pid, retrying while the app starts up.
    pub async fn wait_for_pid(
        &self,
        package: &str,
        attempts: u32,
        delay: Duration,
    ) -> Option<u32> {
        for attempt in 1..=attempts {
            if let Some(pid) = self.resolve_pid(package).await {
                return Some(pid);
            }
            trace!("pid not visible yet (attempt {}/{})", attempt, attempts);
            tokio::time::sleep(delay).await;
        }
        None
    }

    /// Start the long-running log stream, filtered by pid or tag allow-list.
    ///
    /// The returned child inherits the session's stdio and must be registered
    /// with the process supervisor by the caller.
    pub fn stream_logs(&self, filter: &LogFilter) -> Result<Child> {
        let mut cmd = Command::new(&self.adb);
        cmd.arg("logcat");
        match filter {
            LogFilter::Pid(pid) => {
                cmd.args(["--pid", &pid.to_string()]);
            }
            LogFilter::Tags(tags) => {
                cmd.arg("-s");
                cmd.args(tags);
            }
        }

        info!(">>> {} logcat ({:?})", self.adb.display(), filter);

        cmd.stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::tool_not_found(self.adb.to_string_lossy())
                } else {
                    Error::process_spawn(e.to_string())
                }
            })
    }
}
