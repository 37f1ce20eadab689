//! Build process driver.
//!
//! Spawns the platform build for the project and scrapes its output until
//! the build reports where the result is:
//!
//! | Marker | Meaning | Result |
//! |--------|---------|--------|
//! | `- Network` / `> Network` | dev server is up | URL after `Network:` |
//! | `DONE  Build complete` | output written | output directory |
//!
//! A completed build process is stopped; a dev server keeps running until
//! [`Compiler::stop`].

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::LazyLock;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

use crate::config::{BuildMode, Environment};
use crate::error::{Error, Result};
use crate::puppet::Puppet;

// ============================================================================
// Constants
// ============================================================================

/// Completion marker of a file build.
const SIGNAL_DONE: &str = "DONE  Build complete";

/// Dev server marker (webpack).
const SIGNAL_DONE_H5: &str = "- Network";

/// Dev server marker (vite).
const SIGNAL_DONE_VITE_H5: &str = "> Network";

/// How long output is still read after the process exits.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// How long a stopped process gets to exit before it is killed.
const TERM_GRACE: Duration = Duration::from_secs(3);

/// Output directory announced on completion.
static PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"The\s+(.*)\s+directory is ready").expect("valid regex"));

// ============================================================================
// Types
// ============================================================================

/// Inputs of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Project source directory.
    pub project_path: PathBuf,
    /// Directory of the build CLI package.
    pub cli_path: PathBuf,
    /// Runtime port baked into the build.
    pub port: u16,
    /// Runtime host baked into the build.
    pub host: Option<String>,
    /// Do not echo build output.
    pub silent: bool,
}

/// Where the build result is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutput {
    /// Dev server URL.
    Url(String),
    /// Output directory.
    Directory(PathBuf),
}

impl CompileOutput {
    /// Returns the output directory, if this is a file build.
    #[inline]
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        match self {
            Self::Directory(path) => Some(path),
            Self::Url(_) => None,
        }
    }
}

/// Program, arguments and extra environment of the build process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnArgs {
    /// Executable.
    pub program: PathBuf,
    /// Arguments, including `--auto-port`.
    pub args: Vec<String>,
    /// Variables added to the inherited environment.
    pub envs: Vec<(String, String)>,
}

/// One scanned output line, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Signal {
    Network(String),
    Done(Option<String>),
}

// ============================================================================
// Compiler
// ============================================================================

/// Drives one build process.
pub struct Compiler {
    platform: String,
    mode: BuildMode,
    environment: Environment,
    /// Stop signal for the supervising task; `None` once stopped.
    kill: Mutex<Option<oneshot::Sender<()>>>,
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("platform", &self.platform)
            .field("mode", &self.mode)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Compiler {
    /// Creates a compiler for the puppet's platform and mode.
    #[must_use]
    pub fn new(puppet: &Puppet) -> Self {
        Self::with_target(puppet.platform(), puppet.mode(), puppet.environment().clone())
    }

    /// Creates a compiler for an explicit platform and mode.
    #[must_use]
    pub fn with_target(platform: impl Into<String>, mode: BuildMode, environment: Environment) -> Self {
        Self {
            platform: platform.into(),
            mode,
            environment,
            kill: Mutex::new(None),
        }
    }

    /// Returns `true` while a build process is attached.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.kill.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Terminates the build process. Idempotent.
    pub fn stop(&self) {
        if let Some(tx) = self.kill.lock().take() {
            debug!(platform = %self.platform, "Stopping build process");
            let _ = tx.send(());
        }
    }

    /// Runs the build until it reports its output.
    ///
    /// # Errors
    ///
    /// - [`Error::ProcessLaunchFailed`] if the process cannot be spawned
    /// - [`Error::Compile`] if it exits before a completion marker
    pub async fn compile(&self, options: &CompileOptions) -> Result<CompileOutput> {
        let spawn = self.spawn_args(options);

        let mut command = Command::new(&spawn.program);
        command
            .args(&spawn.args)
            .envs(spawn.envs.iter().map(|(k, v)| (k, v)))
            .env("NODE_ENV", self.mode.node_env())
            .current_dir(&options.cli_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(
            program = %spawn.program.display(),
            args = ?spawn.args,
            cwd = %options.cli_path.display(),
            "Spawning build process"
        );

        let mut child = command.spawn().map_err(Error::process_launch_failed)?;

        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, line_tx));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, mut exit_rx) = oneshot::channel();
        *self.kill.lock() = Some(kill_tx);
        tokio::spawn(supervise(child, kill_rx, exit_tx));

        let mut echo = !options.silent;

        let output = loop {
            tokio::select! {
                biased;

                line = line_rx.recv() => {
                    let Some(line) = line else {
                        // Both streams closed; the exit status decides.
                        let status = (&mut exit_rx).await.ok().flatten();
                        break Err(exited_early(status));
                    };
                    if let Some(output) = self.scan(&line, &mut echo, &options.project_path) {
                        break Ok(output);
                    }
                }
                status = &mut exit_rx => {
                    // The process may exit right after printing its marker.
                    let mut found = None;
                    let deadline = Instant::now() + DRAIN_GRACE;
                    while let Ok(Some(line)) = timeout_at(deadline, line_rx.recv()).await {
                        if found.is_none() {
                            found = self.scan(&line, &mut echo, &options.project_path);
                        }
                    }
                    break found.ok_or_else(|| exited_early(status.ok().flatten()));
                }
            }
        };

        if output.is_ok() && echo {
            // Dev server keeps logging.
            tokio::spawn(async move {
                while let Some(line) = line_rx.recv().await {
                    info!(target: "uni_automator::build", "{line}");
                }
            });
        }

        output
    }

    /// Echoes one output line and returns the build result it announces.
    fn scan(&self, line: &str, echo: &mut bool, project_path: &Path) -> Option<CompileOutput> {
        if *echo {
            info!(target: "uni_automator::build", "{line}");
        }
        match classify(line)? {
            Signal::Network(url) => {
                debug!(url = %url, "Dev server ready");
                Some(CompileOutput::Url(url))
            }
            Signal::Done(dir) => {
                *echo = false;
                let path = self.output_dir(project_path, dir.as_deref());
                debug!(path = %path.display(), "Build complete");
                self.stop();
                Some(CompileOutput::Directory(path))
            }
        }
    }

    /// Chooses the npm script when the CLI declares `<mode>:<platform>`,
    /// else the CLI entry point through node.
    #[must_use]
    pub fn spawn_args(&self, options: &CompileOptions) -> SpawnArgs {
        let script = format!("{}:{}", self.mode, self.platform);

        let (program, mut args, envs) = if has_npm_script(&options.cli_path, &script) {
            (
                self.environment.npm(),
                vec!["run".to_string(), script, "--".to_string()],
                Vec::new(),
            )
        } else {
            let output_dir = options
                .project_path
                .join("unpackage")
                .join("dist")
                .join(self.mode.as_str())
                .join(&self.platform);
            (
                self.environment.node(),
                vec![
                    options
                        .cli_path
                        .join("bin")
                        .join("uniapp-cli.js")
                        .to_string_lossy()
                        .into_owned(),
                ],
                vec![
                    (
                        "UNI_INPUT_DIR".to_string(),
                        options.project_path.to_string_lossy().into_owned(),
                    ),
                    (
                        "UNI_OUTPUT_DIR".to_string(),
                        output_dir.to_string_lossy().into_owned(),
                    ),
                ],
            )
        };

        args.push("--auto-port".to_string());
        args.push(options.port.to_string());
        if let Some(host) = &options.host {
            args.push("--auto-host".to_string());
            args.push(host.clone());
        }

        SpawnArgs { program, args, envs }
    }

    /// Resolves the announced directory, or the conventional fallbacks.
    fn output_dir(&self, project_path: &Path, announced: Option<&str>) -> PathBuf {
        if let Some(dir) = announced {
            return project_path.join(dir);
        }
        let dist = project_path
            .join("dist")
            .join(self.mode.as_str())
            .join(&self.platform);
        if dist.exists() {
            return dist;
        }
        project_path
            .join("unpackage")
            .join("dist")
            .join(self.mode.as_str())
            .join(&self.platform)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Classifies one output line.
fn classify(line: &str) -> Option<Signal> {
    if line.contains(SIGNAL_DONE_H5) || line.contains(SIGNAL_DONE_VITE_H5) {
        let url = line
            .split_once("Network:")
            .map(|(_, rest)| rest.trim().to_string())?;
        return Some(Signal::Network(url));
    }
    if line.contains(SIGNAL_DONE) {
        let dir = PATH_RE
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        return Some(Signal::Done(dir));
    }
    None
}

/// Returns `true` if `<cli>/package.json` declares `script`.
fn has_npm_script(cli_path: &Path, script: &str) -> bool {
    std::fs::read_to_string(cli_path.join("package.json"))
        .ok()
        .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok())
        .is_some_and(|pkg| pkg["scripts"][script].is_string())
}

fn exited_early(status: Option<ExitStatus>) -> Error {
    match status {
        Some(status) => Error::compile(format!("build process exited ({status}) before completing")),
        None => Error::compile("build process exited before completing"),
    }
}

/// Sends each line of `reader` until EOF.
async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim().to_string();
                if !line.is_empty() && tx.send(line).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read build output");
                break;
            }
        }
    }
}

/// Owns the child: waits for exit or terminates it on request.
async fn supervise(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: oneshot::Sender<Option<ExitStatus>>,
) {
    let pid = child.id().unwrap_or(0);

    let status = tokio::select! {
        status = child.wait() => status.ok(),
        _ = kill_rx => terminate(&mut child, pid).await,
    };

    debug!(pid, ?status, "Build process terminated");
    let _ = exit_tx.send(status);
}

/// Sends SIGTERM and escalates to a kill after [`TERM_GRACE`].
async fn terminate(child: &mut Child, pid: u32) -> Option<ExitStatus> {
    #[cfg(unix)]
    if pid != 0 {
        // SAFETY: plain syscall on a pid this process spawned and still owns.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            if let Ok(status) = timeout(TERM_GRACE, child.wait()).await {
                return status.ok();
            }
            debug!(pid, "Build process ignored SIGTERM, killing");
        } else {
            debug!(pid, error = %std::io::Error::last_os_error(), "Failed to send SIGTERM");
        }
    }

    if let Err(e) = child.start_kill() {
        debug!(pid, error = %e, "Failed to send kill signal");
    }
    child.wait().await.ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn options(project: &Path, cli: &Path) -> CompileOptions {
        CompileOptions {
            project_path: project.to_path_buf(),
            cli_path: cli.to_path_buf(),
            port: 9520,
            host: None,
            silent: true,
        }
    }

    #[test]
    fn test_classify_markers() {
        assert_eq!(
            classify("  - Network: http://192.168.1.2:8080/"),
            Some(Signal::Network("http://192.168.1.2:8080/".into()))
        );
        assert_eq!(
            classify("> Network:  http://10.0.0.1:3000/"),
            Some(Signal::Network("http://10.0.0.1:3000/".into()))
        );
        assert_eq!(
            classify("DONE  Build complete. The dist/dev/mp-weixin directory is ready. Watching for changes..."),
            Some(Signal::Done(Some("dist/dev/mp-weixin".into())))
        );
        assert_eq!(classify("DONE  Build complete."), Some(Signal::Done(None)));
        assert_eq!(classify("compiling..."), None);
    }

    #[test]
    fn test_spawn_args_npm_script() {
        let cli = tempfile::tempdir().unwrap();
        std::fs::write(
            cli.path().join("package.json"),
            r#"{"scripts": {"dev:mp-weixin": "uni -p mp-weixin"}}"#,
        )
        .unwrap();

        let compiler = Compiler::with_target("mp-weixin", BuildMode::Dev, Environment::with_cwd("/"));
        let mut opts = options(Path::new("/p"), cli.path());
        opts.host = Some("10.0.0.2".into());
        let spawn = compiler.spawn_args(&opts);

        assert!(spawn.program.to_string_lossy().starts_with("npm"));
        assert_eq!(
            spawn.args,
            vec!["run", "dev:mp-weixin", "--", "--auto-port", "9520", "--auto-host", "10.0.0.2"]
        );
        assert!(spawn.envs.is_empty());
    }

    #[test]
    fn test_spawn_args_node_fallback() {
        let cli = tempfile::tempdir().unwrap();
        let mut env = Environment::with_cwd("/");
        env.node_path = Some(PathBuf::from("/opt/node"));

        let compiler = Compiler::with_target("app-plus", BuildMode::Build, env);
        let spawn = compiler.spawn_args(&options(Path::new("/p"), cli.path()));

        assert_eq!(spawn.program, PathBuf::from("/opt/node"));
        assert!(spawn.args[0].ends_with("uniapp-cli.js"));
        assert_eq!(&spawn.args[1..], ["--auto-port", "9520"]);
        assert!(spawn.envs.contains(&("UNI_INPUT_DIR".to_string(), "/p".to_string())));
        assert!(
            spawn
                .envs
                .iter()
                .any(|(k, v)| k == "UNI_OUTPUT_DIR" && v.ends_with("unpackage/dist/build/app-plus"))
        );
    }

    #[test]
    fn test_output_dir_fallbacks() {
        let project = tempfile::tempdir().unwrap();
        let compiler = Compiler::with_target("h5", BuildMode::Dev, Environment::with_cwd("/"));

        assert_eq!(
            compiler.output_dir(project.path(), None),
            project.path().join("unpackage/dist/dev/h5")
        );

        std::fs::create_dir_all(project.path().join("dist/dev/h5")).unwrap();
        assert_eq!(
            compiler.output_dir(project.path(), None),
            project.path().join("dist/dev/h5")
        );
        assert_eq!(
            compiler.output_dir(project.path(), Some("out/h5")),
            project.path().join("out/h5")
        );
    }

    #[test]
    fn test_stop_is_idempotent() {
        let compiler = Compiler::with_target("h5", BuildMode::Dev, Environment::with_cwd("/"));
        compiler.stop();
        compiler.stop();
        assert!(!compiler.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_build_script_done_marker() {
        let project = tempfile::tempdir().unwrap();
        let cli = tempfile::tempdir().unwrap();
        let mut env = Environment::with_cwd("/");
        // `sh <script> --auto-port 9520`
        env.node_path = Some(PathBuf::from("sh"));
        std::fs::create_dir_all(cli.path().join("bin")).unwrap();
        std::fs::write(
            cli.path().join("bin/uniapp-cli.js"),
            "echo compiling\necho 'DONE  Build complete. The dist/dev/h5 directory is ready.'\nsleep 30\n",
        )
        .unwrap();

        let compiler = Compiler::with_target("h5", BuildMode::Dev, env);
        let output = compiler
            .compile(&options(project.path(), cli.path()))
            .await
            .unwrap();

        assert_eq!(output.directory(), Some(project.path().join("dist/dev/h5").as_path()));
        assert!(!compiler.is_running());
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_build_that_exits_after_done_marker_succeeds() {
        let project = tempfile::tempdir().unwrap();
        let cli = tempfile::tempdir().unwrap();
        let mut env = Environment::with_cwd("/");
        env.node_path = Some(PathBuf::from("sh"));
        std::fs::create_dir_all(cli.path().join("bin")).unwrap();
        std::fs::write(
            cli.path().join("bin/uniapp-cli.js"),
            "echo 'DONE  Build complete. The dist/build/h5 directory is ready.'\nexit 0\n",
        )
        .unwrap();

        let compiler = Compiler::with_target("h5", BuildMode::Build, env);
        for _ in 0..40 {
            let output = compiler
                .compile(&options(project.path(), cli.path()))
                .await
                .unwrap();
            assert_eq!(
                output.directory(),
                Some(project.path().join("dist/build/h5").as_path())
            );
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_terminates_dev_server() {
        let project = tempfile::tempdir().unwrap();
        let cli = tempfile::tempdir().unwrap();
        let mut env = Environment::with_cwd("/");
        env.node_path = Some(PathBuf::from("sh"));
        std::fs::create_dir_all(cli.path().join("bin")).unwrap();
        std::fs::write(
            cli.path().join("bin/uniapp-cli.js"),
            "trap 'exit 0' TERM\necho '  - Network: http://127.0.0.1:8080/'\nwhile true; do sleep 0.1; done\n",
        )
        .unwrap();

        let compiler = Compiler::with_target("h5", BuildMode::Dev, env);
        let output = compiler
            .compile(&options(project.path(), cli.path()))
            .await
            .unwrap();
        assert_eq!(output, CompileOutput::Url("http://127.0.0.1:8080/".into()));
        assert!(compiler.is_running());

        compiler.stop();
        assert!(!compiler.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_early_exit_is_compile_error() {
        let project = tempfile::tempdir().unwrap();
        let cli = tempfile::tempdir().unwrap();
        let mut env = Environment::with_cwd("/");
        env.node_path = Some(PathBuf::from("sh"));
        std::fs::create_dir_all(cli.path().join("bin")).unwrap();
        std::fs::write(cli.path().join("bin/uniapp-cli.js"), "echo failing\nexit 3\n").unwrap();

        let compiler = Compiler::with_target("h5", BuildMode::Dev, env);
        let err = compiler
            .compile(&options(project.path(), cli.path()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Compile { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_fails_launch() {
        let project = tempfile::tempdir().unwrap();
        let cli = tempfile::tempdir().unwrap();
        let mut env = Environment::with_cwd("/");
        env.node_path = Some(PathBuf::from("/nonexistent/node-binary"));

        let compiler = Compiler::with_target("h5", BuildMode::Dev, env);
        let err = compiler
            .compile(&options(project.path(), cli.path()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ProcessLaunchFailed { .. }));
    }
}
