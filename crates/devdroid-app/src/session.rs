//! The dev-session pipeline
//!
//! Strictly ordered stages driving the dev server, the debug build, and the
//! device bridge. Each stage either succeeds and the pipeline advances, or
//! fails and the session aborts into supervised cleanup. Two stages degrade
//! instead of aborting: architecture resolution (continues without a build
//! target) and pid resolution (falls back to tag-filtered logs).

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::Command;

use devdroid_adb::bridge::{AdbBridge, LogFilter};
use devdroid_adb::command::{CommandRequest, LocalCommandRunner};
use devdroid_adb::DeviceArchitecture;
use devdroid_core::prelude::*;

use crate::artifact;
use crate::config::Config;
use crate::netaddr::NetworkAddress;
use crate::supervisor::ProcessSupervisor;

/// How long the dev server gets to open its port before the session
/// proceeds regardless -- it may legitimately still be compiling.
const DEV_SERVER_PROBE_ATTEMPTS: u32 = 40;
const DEV_SERVER_PROBE_DELAY: Duration = Duration::from_millis(250);

/// How long the launched app gets to show up in the process table.
const PID_PROBE_ATTEMPTS: u32 = 20;
const PID_PROBE_DELAY: Duration = Duration::from_millis(500);

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    StartDevServer,
    ResolveArchitecture,
    Build,
    Install,
    ConfigureForwarding,
    Launch,
    ResolvePid,
    StreamLogs,
}

impl PipelineStage {
    pub const ORDER: [PipelineStage; 8] = [
        PipelineStage::StartDevServer,
        PipelineStage::ResolveArchitecture,
        PipelineStage::Build,
        PipelineStage::Install,
        PipelineStage::ConfigureForwarding,
        PipelineStage::Launch,
        PipelineStage::ResolvePid,
        PipelineStage::StreamLogs,
    ];
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::StartDevServer => "start dev server",
            PipelineStage::ResolveArchitecture => "resolve device architecture",
            PipelineStage::Build => "build debug APK",
            PipelineStage::Install => "install on device",
            PipelineStage::ConfigureForwarding => "configure port forwarding",
            PipelineStage::Launch => "launch app",
            PipelineStage::ResolvePid => "resolve app pid",
            PipelineStage::StreamLogs => "stream device logs",
        };
        f.write_str(s)
    }
}

/// One supervised dev session.
///
/// Generic over the command runner so stage logic can be exercised without
/// touching a real device.
pub struct DevSession<R> {
    project_root: PathBuf,
    config: Config,
    host: NetworkAddress,
    bridge: AdbBridge<R>,
    runner: R,
    supervisor: Arc<ProcessSupervisor>,
}

impl<R: LocalCommandRunner> DevSession<R> {
    pub fn new(
        project_root: PathBuf,
        config: Config,
        host: NetworkAddress,
        bridge: AdbBridge<R>,
        runner: R,
        supervisor: Arc<ProcessSupervisor>,
    ) -> Self {
        Self {
            project_root,
            config,
            host,
            bridge,
            runner,
            supervisor,
        }
    }

    fn announce(&self, stage: PipelineStage) {
        let index = PipelineStage::ORDER
            .iter()
            .position(|s| *s == stage)
            .unwrap_or(0)
            + 1;
        info!("[{}/{}] {}", index, PipelineStage::ORDER.len(), stage);
    }

    /// Drive the session from dev server to log stream.
    ///
    /// Returns when the log stream ends. Every background process is
    /// registered with the supervisor as it is spawned; the caller runs
    /// cleanup regardless of how this returns.
    pub async fn run(&self) -> Result<()> {
        self.announce(PipelineStage::StartDevServer);
        self.start_dev_server().await?;
        self.wait_for_dev_server().await;

        self.announce(PipelineStage::ResolveArchitecture);
        let arch = self.bridge.query_architecture().await;
        info!("Device architecture: {}", arch);

        self.announce(PipelineStage::Build);
        self.build(arch).await?;

        self.announce(PipelineStage::Install);
        let apk = artifact::locate_debug_apk(&self.project_root, arch)?;
        info!("Installing {}", apk.display());
        self.bridge.install(&apk).await?;

        self.announce(PipelineStage::ConfigureForwarding);
        self.bridge
            .configure_forwarding(self.config.local_port, self.config.remote_port)
            .await?;

        self.announce(PipelineStage::Launch);
        let package = self.config.require_package()?.to_string();
        self.bridge.launch(&package, &self.config.activity).await?;

        self.announce(PipelineStage::ResolvePid);
        let filter = match self
            .bridge
            .wait_for_pid(&package, PID_PROBE_ATTEMPTS, PID_PROBE_DELAY)
            .await
        {
            Some(pid) => {
                info!("App running with pid {}", pid);
                LogFilter::Pid(pid)
            }
            None => {
                warn!("Could not resolve the app's pid, falling back to tag-filtered logs");
                LogFilter::Tags(self.config.log_tags.clone())
            }
        };

        self.announce(PipelineStage::StreamLogs);
        let child = self.bridge.stream_logs(&filter)?;
        let logs = self.supervisor.track("log stream", child).await?;
        info!("Streaming device logs. Press Ctrl-C to stop.");
        logs.wait().await;
        Ok(())
    }

    /// Spawn the dev server bound to the resolved LAN address and register
    /// it with the supervisor before anything else can fail.
    async fn start_dev_server(&self) -> Result<()> {
        let argv = &self.config.dev_server_command;
        let program = argv
            .first()
            .ok_or_else(|| Error::config("dev_server_command is empty"))?;
        // Fail fast with the tool's name rather than a spawn error later
        which::which(program).map_err(|_| Error::tool_not_found(program.clone()))?;

        let host = self.host.to_string();
        info!(">>> {} --host {}", argv.join(" "), host);

        let child = Command::new(program)
            .args(&argv[1..])
            .args(["--host", &host])
            .env("TAURI_DEV_HOST", &host)
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::process_spawn(e.to_string()))?;

        self.supervisor.track("dev server", child).await?;
        Ok(())
    }

    /// Probe the dev server's listening port with bounded retries instead
    /// of sleeping a fixed interval. Never aborts: a server that has not
    /// opened its port yet may still be compiling.
    async fn wait_for_dev_server(&self) {
        let target = (self.host.addr, self.config.local_port);
        for attempt in 1..=DEV_SERVER_PROBE_ATTEMPTS {
            if TcpStream::connect(target).await.is_ok() {
                info!(
                    "Dev server is listening on {}:{}",
                    self.host, self.config.local_port
                );
                return;
            }
            trace!(
                "dev server not ready (attempt {}/{})",
                attempt,
                DEV_SERVER_PROBE_ATTEMPTS
            );
            tokio::time::sleep(DEV_SERVER_PROBE_DELAY).await;
        }
        warn!(
            "Dev server did not open {}:{} in time, continuing anyway",
            self.host, self.config.local_port
        );
    }

    /// Run the debug build with the session's stdio so its progress output
    /// stays visible.
    async fn build(&self, arch: DeviceArchitecture) -> Result<()> {
        let mut argv = self.config.build_command.clone();
        if let Some(target) = arch.build_target() {
            argv.push("--target".to_string());
            argv.push(target.to_string());
        }
        let program = argv
            .first()
            .cloned()
            .ok_or_else(|| Error::config("build_command is empty"))?;

        let request = CommandRequest::new(program, argv[1..].to_vec())
            .current_dir(&self.project_root)
            .inherit_stdio()
            .unchecked();
        let display = request.display();

        let output = self
            .runner
            .run(request)
            .await?
            .ok_or_else(|| Error::process_spawn("build produced no result"))?;
        if !output.success() {
            return Err(Error::command_failed(display, output.code));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devdroid_adb::test_utils::ScriptedRunner;
    use std::net::{Ipv4Addr, TcpListener};
    use std::sync::Arc;

    use crate::netaddr::AddressSource;

    /// A listener on an ephemeral loopback port so the dev-server probe
    /// succeeds instantly.
    fn loopback_listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    /// A stand-in adb that exits successfully no matter the arguments, so
    /// the spawned log stream ends immediately.
    fn fake_adb(dir: &std::path::Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("adb");
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn write_apk(project: &std::path::Path, flavor: &str) {
        let dir = project
            .join("src-tauri/gen/android/app/build/outputs/apk")
            .join(flavor)
            .join("debug");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("app-{flavor}-debug.apk")), b"apk").unwrap();
    }

    fn test_config(port: u16) -> Config {
        Config {
            package: Some("com.example.app".to_string()),
            local_port: port,
            remote_port: port,
            // sh ignores the trailing --host argument pair
            dev_server_command: vec!["sh".to_string(), "-c".to_string(), "sleep 60".to_string()],
            ..Config::default()
        }
    }

    fn session(
        project: PathBuf,
        config: Config,
        adb: PathBuf,
        runner_script: Vec<devdroid_core::Result<Option<devdroid_adb::CommandOutput>>>,
        supervisor: Arc<ProcessSupervisor>,
    ) -> DevSession<ScriptedRunner> {
        let runner = ScriptedRunner::new(runner_script);
        let bridge = AdbBridge::new(adb, runner.clone());
        let host = NetworkAddress::new(Ipv4Addr::LOCALHOST, AddressSource::DirectSocket);
        DevSession::new(project, config, host, bridge, runner, supervisor)
    }

    #[tokio::test]
    async fn test_full_session_runs_stages_in_order() {
        let project = tempfile::tempdir().unwrap();
        write_apk(project.path(), "arm64");
        let adb = fake_adb(project.path());
        let (_listener, port) = loopback_listener();
        let supervisor = Arc::new(ProcessSupervisor::new());

        let script = vec![
            ScriptedRunner::ok("arm64-v8a\n"),          // getprop
            ScriptedRunner::ok(""),                     // build
            ScriptedRunner::ok("Success"),              // install
            ScriptedRunner::ok(""),                     // reverse --remove-all
            ScriptedRunner::ok(""),                     // reverse add
            ScriptedRunner::ok("Starting: Intent"),     // am start
            ScriptedRunner::ok("4242\n"),               // pidof
        ];
        let session = session(
            project.path().to_path_buf(),
            test_config(port),
            adb,
            script,
            Arc::clone(&supervisor),
        );

        session.run().await.unwrap();

        let commands = session.runner.commands();
        assert!(commands[0].contains("getprop"));
        assert!(commands[1].contains("--target aarch64"));
        assert!(commands[2].contains("install -r"));
        assert!(commands[3].contains("reverse --remove-all"));
        assert!(commands[4].contains(&format!("reverse tcp:{port} tcp:{port}")));
        assert!(commands[5].contains("am start -n com.example.app/.MainActivity"));
        assert!(commands[6].contains("pidof"));

        // the log stream already ended; only the dev server is left
        let terminated = supervisor.cleanup().await;
        assert_eq!(terminated, vec!["dev server"]);
    }

    #[tokio::test]
    async fn test_build_failure_aborts_with_dev_server_still_supervised() {
        let project = tempfile::tempdir().unwrap();
        let adb = fake_adb(project.path());
        let (_listener, port) = loopback_listener();
        let supervisor = Arc::new(ProcessSupervisor::new());

        let script = vec![
            ScriptedRunner::suppressed(),     // getprop failed -> unknown arch
            ScriptedRunner::failed(1, ""),    // build fails
        ];
        let session = session(
            project.path().to_path_buf(),
            test_config(port),
            adb,
            script,
            Arc::clone(&supervisor),
        );

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));

        // abort leaves the dev server to the supervisor, which must still
        // be able to tear it down
        let terminated = supervisor.cleanup().await;
        assert_eq!(terminated, vec!["dev server"]);
    }

    #[tokio::test]
    async fn test_missing_artifact_aborts_before_install() {
        let project = tempfile::tempdir().unwrap();
        let adb = fake_adb(project.path());
        let (_listener, port) = loopback_listener();
        let supervisor = Arc::new(ProcessSupervisor::new());

        let script = vec![
            ScriptedRunner::ok("arm64-v8a\n"), // getprop
            ScriptedRunner::ok(""),            // build "succeeds" but produced nothing
        ];
        let session = session(
            project.path().to_path_buf(),
            test_config(port),
            adb,
            script,
            Arc::clone(&supervisor),
        );

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, Error::ArtifactMissing { .. }));
        // no install/reverse/launch attempted
        assert_eq!(session.runner.call_count(), 2);

        supervisor.cleanup().await;
    }

    #[tokio::test]
    async fn test_missing_dev_server_tool_fails_before_any_spawn() {
        let project = tempfile::tempdir().unwrap();
        let adb = fake_adb(project.path());
        let (_listener, port) = loopback_listener();
        let supervisor = Arc::new(ProcessSupervisor::new());

        let mut config = test_config(port);
        config.dev_server_command = vec!["devdroid-no-such-tool-xyz".to_string()];
        let session = session(
            project.path().to_path_buf(),
            config,
            adb,
            Vec::new(),
            Arc::clone(&supervisor),
        );

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { .. }));
        assert!(supervisor.cleanup().await.is_empty());
    }

    #[test]
    fn test_stage_order_matches_the_session_flow() {
        use PipelineStage::*;
        assert_eq!(
            PipelineStage::ORDER,
            [
                StartDevServer,
                ResolveArchitecture,
                Build,
                Install,
                ConfigureForwarding,
                Launch,
                ResolvePid,
                StreamLogs,
            ]
        );
    }

    #[test]
    fn test_stage_display_names() {
        assert_eq!(PipelineStage::StartDevServer.to_string(), "start dev server");
        assert_eq!(PipelineStage::StreamLogs.to_string(), "stream device logs");
    }
}
