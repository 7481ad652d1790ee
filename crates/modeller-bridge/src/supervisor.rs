//! Engine process management.
//!
//! Locates the scripting runtime inside an Emme installation, builds the
//! bridge invocation, spawns the engine and waits until it is connected
//! and ready.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::transport::{BridgeStreams, create_transport};

/// Environment variable naming the Emme installation directory.
pub const EMME_PATH_VAR: &str = "EMMEPATH";

/// Extension of Emme project files.
pub const PROJECT_EXTENSION: &str = ".emp";

/// Directory next to the host executable holding the bridge script.
pub const MODULES_DIR: &str = "Modules";

/// Python side of the bridge.
pub const BRIDGE_SCRIPT: &str = "ModellerBridge.py";

/// Prefix of the runtime directory inside the installation, followed by a version digit.
const RUNTIME_DIR_PREFIX: &str = "Python";

/// Interpreter locations tried inside the runtime directory, in order.
const RUNTIME_CANDIDATES: &[&str] = &["python.exe", "bin/python3", "bin/python", "bin/python2.7"];

/// Connection type produced by [`launch`].
pub type EngineConnection = Connection<Box<dyn std::io::Read + Send>, Box<dyn std::io::Write + Send>>;

/// Optional virtual display around the engine for hosts without a windowing system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DisplayWrapper {
    /// `xvfb-run -a` on Unix when it is on PATH, nothing on Windows.
    #[default]
    Auto,
    /// Launch the runtime directly.
    None,
    /// Launch through this executable, passing `-a` first.
    Command(PathBuf),
}

impl DisplayWrapper {
    fn resolve(&self) -> Option<PathBuf> {
        match self {
            DisplayWrapper::Auto => {
                if cfg!(windows) {
                    return None;
                }
                match which::which("xvfb-run") {
                    Ok(path) => Some(path),
                    Err(_) => {
                        tracing::warn!("xvfb-run not found, launching the engine without a virtual display");
                        None
                    }
                }
            }
            DisplayWrapper::None => None,
            DisplayWrapper::Command(path) => Some(path.clone()),
        }
    }
}

/// Everything needed to start one engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Emme project file (`*.emp`).
    pub project_file: PathBuf,
    /// User identity passed to the engine.
    pub user_initials: String,
    /// Enable the engine's performance analysis.
    pub performance_analysis: bool,
    /// Secondary database handle, appended last when set.
    pub databank: Option<String>,
    /// Overrides [`EMME_PATH_VAR`].
    pub installation_dir: Option<PathBuf>,
    /// Overrides `<exe dir>/Modules/ModellerBridge.py`.
    pub bridge_script: Option<PathBuf>,
    /// Where path-based endpoints are created (system temp dir by default).
    pub endpoint_dir: Option<PathBuf>,
    pub display_wrapper: DisplayWrapper,
}

impl EngineConfig {
    pub fn new(project_file: impl Into<PathBuf>) -> Self {
        Self {
            project_file: project_file.into(),
            user_initials: "XTMF".to_string(),
            performance_analysis: false,
            databank: None,
            installation_dir: None,
            bridge_script: None,
            endpoint_dir: None,
            display_wrapper: DisplayWrapper::default(),
        }
    }

    pub fn with_user_initials(mut self, initials: impl Into<String>) -> Self {
        self.user_initials = initials.into();
        self
    }

    pub fn with_performance_analysis(mut self, enabled: bool) -> Self {
        self.performance_analysis = enabled;
        self
    }

    pub fn with_databank(mut self, databank: impl Into<String>) -> Self {
        self.databank = Some(databank.into());
        self
    }

    pub fn with_installation_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.installation_dir = Some(dir.into());
        self
    }

    pub fn with_bridge_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.bridge_script = Some(script.into());
        self
    }

    pub fn with_endpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.endpoint_dir = Some(dir.into());
        self
    }

    pub fn with_display_wrapper(mut self, wrapper: DisplayWrapper) -> Self {
        self.display_wrapper = wrapper;
        self
    }

    /// Check that the project file exists and is an Emme project.
    pub fn validate_project(&self) -> Result<()> {
        let is_project = self
            .project_file
            .to_str()
            .is_some_and(|p| p.ends_with(PROJECT_EXTENSION));
        if !is_project || !self.project_file.is_file() {
            return Err(Error::ProjectFile(self.project_file.clone()));
        }
        Ok(())
    }

    /// The Emme installation directory, from the override or the environment.
    pub fn installation_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.installation_dir {
            return Ok(dir.clone());
        }
        match std::env::var_os(EMME_PATH_VAR) {
            Some(value) if !value.to_string_lossy().trim().is_empty() => Ok(PathBuf::from(value)),
            _ => Err(Error::MissingEnvironment(EMME_PATH_VAR)),
        }
    }

    /// Path of `ModellerBridge.py`.
    pub fn bridge_script(&self) -> Result<PathBuf> {
        if let Some(script) = &self.bridge_script {
            return Ok(script.clone());
        }
        let exe = std::env::current_exe()?;
        let program_dir = exe.parent().unwrap_or(Path::new("."));
        Ok(program_dir.join(MODULES_DIR).join(BRIDGE_SCRIPT))
    }
}

/// Find the runtime directory (`Python<digit>...`) inside an installation.
pub fn find_runtime_directory(installation_dir: &Path) -> Result<PathBuf> {
    if !installation_dir.is_dir() {
        return Err(Error::InstallationNotFound(installation_dir.to_path_buf()));
    }

    let mut entries: Vec<PathBuf> = std::fs::read_dir(installation_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    entries.sort();

    entries
        .into_iter()
        .find(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix(RUNTIME_DIR_PREFIX))
                .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        })
        .ok_or_else(|| Error::RuntimeNotFound(installation_dir.to_path_buf()))
}

/// Find the interpreter inside a runtime directory.
pub fn find_runtime_executable(runtime_dir: &Path) -> Result<PathBuf> {
    RUNTIME_CANDIDATES
        .iter()
        .map(|candidate| runtime_dir.join(candidate))
        .find(|path| path.is_file())
        .ok_or_else(|| Error::RuntimeNotFound(runtime_dir.to_path_buf()))
}

/// Positional arguments for the runtime, order fixed by the bridge script:
/// `-u script project user perf inbound outbound [databank]`.
pub fn engine_arguments(
    config: &EngineConfig,
    script: &Path,
    inbound_id: &str,
    outbound_id: &str,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-u".into(),
        script.into(),
        config.project_file.clone().into(),
        config.user_initials.clone().into(),
        (if config.performance_analysis { "1" } else { "0" }).into(),
        inbound_id.into(),
        outbound_id.into(),
    ];
    if let Some(databank) = config.databank.as_deref().filter(|d| !d.trim().is_empty()) {
        args.push(databank.into());
    }
    args
}

/// Build the engine command, wrapped in a virtual display if configured.
pub fn build_command(
    config: &EngineConfig,
    installation_dir: &Path,
    runtime_dir: &Path,
    runtime: &Path,
    args: &[OsString],
) -> Result<Command> {
    let mut command = match config.display_wrapper.resolve() {
        Some(wrapper) => {
            let mut command = Command::new(wrapper);
            command.arg("-a").arg(runtime);
            command
        }
        None => Command::new(runtime),
    };
    command
        .args(args)
        .current_dir(std::env::current_dir()?)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    if cfg!(windows) {
        let mut paths: Vec<PathBuf> = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        paths.push(runtime_dir.join("lib"));
        paths.push(installation_dir.join("programs"));
        if let Ok(joined) = std::env::join_paths(paths) {
            command.env("PATH", joined);
        }
    }

    Ok(command)
}

/// The running engine process.
///
/// The engine is asked to exit over the wire; it is never killed on normal
/// shutdown. Dropping the handle reaps the child in the background if it is
/// still running.
pub struct EngineProcess {
    child: Option<Child>,
}

impl EngineProcess {
    fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Forcefully stop the engine. Only used when startup fails.
    fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                tracing::debug!(error = %e, "Failed to kill engine");
            }
            let _ = child.wait();
        }
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) => tracing::debug!(%status, "Engine exited"),
            Ok(None) => {
                let pid = child.id();
                let reaper = std::thread::Builder::new()
                    .name(format!("modeller-reaper-{pid}"))
                    .spawn(move || match child.wait() {
                        Ok(status) => tracing::debug!(pid, %status, "Engine exited"),
                        Err(e) => tracing::warn!(pid, error = %e, "Failed to wait for engine"),
                    });
                if let Err(e) = reaper {
                    tracing::warn!(pid, error = %e, "Failed to start engine reaper");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to query engine status"),
        }
    }
}

/// Start an engine and return it connected and ready.
pub fn launch(config: &EngineConfig) -> Result<(EngineProcess, EngineConnection)> {
    config.validate_project()?;
    let installation_dir = config.installation_dir()?;
    let runtime_dir = find_runtime_directory(&installation_dir)?;
    let runtime = find_runtime_executable(&runtime_dir)?;
    let script = config.bridge_script()?;
    if !script.exists() {
        tracing::warn!(script = %script.display(), "Bridge script not found");
    }

    let mut transport = create_transport(config.endpoint_dir.as_deref())?;
    let args = engine_arguments(config, &script, &transport.inbound_id(), &transport.outbound_id());
    let mut command = build_command(config, &installation_dir, &runtime_dir, &runtime, &args)?;

    tracing::debug!(runtime = %runtime.display(), ?args, "Spawning engine");
    let child = command.spawn().map_err(|e| Error::Spawn {
        project: config.project_file.clone(),
        message: e.to_string(),
    })?;
    let mut process = EngineProcess::new(child);
    tracing::debug!(pid = ?process.pid(), "Engine spawned");

    let streams = {
        let project = &config.project_file;
        let mut child = process.child.as_mut();
        let mut check_alive = || -> Result<()> {
            let Some(child) = child.as_deref_mut() else {
                return Ok(());
            };
            match child.try_wait()? {
                Some(status) => Err(Error::Spawn {
                    project: project.clone(),
                    message: format!("engine exited before connecting ({status})"),
                }),
                None => Ok(()),
            }
        };
        transport.accept(&mut check_alive)
    };

    let BridgeStreams { inbound, outbound } = match streams {
        Ok(streams) => streams,
        Err(e) => {
            process.kill();
            return Err(e);
        }
    };
    drop(transport);

    let mut connection = Connection::new(inbound, outbound);
    if let Err(e) = connection.wait_for_ready() {
        process.kill();
        return Err(e);
    }

    Ok((process, connection))
}
