//! Launch orchestration.
//!
//! A [`Launcher`] holds the registered platform targets and turns
//! [`LaunchOptions`] into a connected [`Program`]:
//!
//! ```text
//! validate → devtools validated → compile | reuse build
//!          → runtime listener ∥ devtool creation → Program
//! ```
//!
//! # Example
//!
//! ```ignore
//! use uni_automator::{DevtoolsDescriptor, LaunchOptions, Launcher, TargetDescriptor};
//!
//! # async fn example() -> uni_automator::Result<()> {
//! let launcher = Launcher::new()
//!     .target("h5", TargetDescriptor::new(DevtoolsDescriptor::new("browser")));
//!
//! let program = launcher
//!     .launch(LaunchOptions::new("h5").with_project_path("./my-app"))
//!     .await?;
//! let page = program.current_page().await?;
//! program.teardown().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::compiler::{CompileOptions, CompileOutput, Compiler};
use crate::config::{DEFAULT_PORT, DevtoolsOptions, Environment, LaunchOptions};
use crate::error::{Error, Result};
use crate::program::{Program, ProgramOptions};
use crate::puppet::Puppet;
use crate::target::Target;
use crate::transport::Connection;

// ============================================================================
// Constants
// ============================================================================

/// Packages whose presence marks a directory as a build CLI.
const CLI_PACKAGES: [&str; 2] = ["@dcloudio/vue-cli-plugin-uni", "@dcloudio/vite-plugin-uni"];

// ============================================================================
// Types
// ============================================================================

/// Launch inputs after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLaunch {
    /// Absolute, existing project directory.
    pub project_path: PathBuf,
    /// Directory of the build CLI package.
    pub cli_path: PathBuf,
    /// Free runtime listening port.
    pub port: u16,
    /// Launch timeout.
    pub timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageJson {
    #[serde(default)]
    dependencies: FxHashMap<String, serde_json::Value>,
    #[serde(default)]
    dev_dependencies: FxHashMap<String, serde_json::Value>,
}

// ============================================================================
// Launcher
// ============================================================================

/// Launches programs for registered platform targets.
#[derive(Clone, Default)]
pub struct Launcher {
    targets: FxHashMap<String, Arc<dyn Target>>,
    environment: Option<Environment>,
}

impl fmt::Debug for Launcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut platforms: Vec<_> = self.targets.keys().collect();
        platforms.sort();
        f.debug_struct("Launcher")
            .field("platforms", &platforms)
            .field("environment", &self.environment)
            .finish()
    }
}

// ============================================================================
// Launcher - Builder
// ============================================================================

impl Launcher {
    /// Creates a launcher with no targets.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the target for `platform`.
    #[must_use]
    pub fn target(self, platform: impl Into<String>, target: impl Target) -> Self {
        self.target_arc(platform, Arc::new(target))
    }

    /// Registers a shared target for `platform`.
    #[must_use]
    pub fn target_arc(mut self, platform: impl Into<String>, target: Arc<dyn Target>) -> Self {
        self.targets.insert(platform.into(), target);
        self
    }

    /// Uses `environment` instead of reading the process environment at
    /// launch.
    #[must_use]
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Returns the target registered for `platform`.
    ///
    /// `app` and `app-plus` are interchangeable.
    ///
    /// # Errors
    ///
    /// [`Error::TargetNotProvided`] if none is registered.
    pub fn resolve_target(&self, platform: &str) -> Result<Arc<dyn Target>> {
        let alias = match platform {
            "app" => Some("app-plus"),
            "app-plus" => Some("app"),
            _ => None,
        };
        self.targets
            .get(platform)
            .or_else(|| alias.and_then(|a| self.targets.get(a)))
            .cloned()
            .ok_or_else(|| Error::target_not_provided(platform))
    }
}

// ============================================================================
// Launcher - Launch
// ============================================================================

impl Launcher {
    /// Launches a program.
    ///
    /// Any failure disposes what the launch created; no partial program is
    /// returned.
    pub async fn launch(&self, options: LaunchOptions) -> Result<Program> {
        let environment = match &self.environment {
            Some(environment) => environment.clone(),
            None => Environment::from_env()?,
        };
        let target = self.resolve_target(&options.platform)?;
        let puppet = Puppet::new(options.platform.clone(), target, environment);

        info!(platform = %options.platform, "Launching");
        let validated = validate(&options, puppet.environment()).await?;
        let devtools = puppet.validate_devtools(options.devtools_options()).await?;

        match self.connect(&puppet, &options, &validated, devtools).await {
            Ok(program) => Ok(program),
            Err(e) => {
                debug!(error = %e, "Launch failed, disposing");
                puppet.dispose();
                Err(e)
            }
        }
    }

    async fn connect(
        &self,
        puppet: &Puppet,
        options: &LaunchOptions,
        validated: &ValidatedLaunch,
        mut devtools: DevtoolsOptions,
    ) -> Result<Program> {
        let ValidatedLaunch {
            project_path,
            cli_path,
            port,
            timeout,
        } = validated;

        let mut should_compile = puppet.should_compile(project_path, *port, options, &devtools);
        let mut devtools_path = puppet
            .environment()
            .output_dir
            .clone()
            .unwrap_or_else(|| project_path.clone());

        if !should_compile {
            match find_build(puppet, project_path, &devtools_path) {
                Some(path) => devtools_path = path,
                None => should_compile = true,
            }
        }

        if should_compile {
            puppet.set_compiled(true);

            let compiler = Arc::new(Compiler::new(puppet));
            puppet.set_compiler(Arc::clone(&compiler));
            let output = compiler
                .compile(&CompileOptions {
                    project_path: project_path.clone(),
                    cli_path: cli_path.clone(),
                    port: *port,
                    host: options.host.clone(),
                    silent: options.silent,
                })
                .await?;

            match output {
                CompileOutput::Directory(path) => devtools_path = path,
                CompileOutput::Url(url) => devtools = devtools.with("url", url),
            }
        }

        let teardown = devtools
            .teardown
            .or(puppet.devtools().teardown)
            .unwrap_or_default();

        tokio::try_join!(
            Connection::create_runtime_connection(*port, puppet, *timeout),
            puppet.create_devtools(&devtools_path, devtools, *timeout),
        )?;

        info!(platform = %puppet.platform(), port, "Program ready");
        Ok(Program::new(
            puppet.clone(),
            ProgramOptions {
                teardown,
                port: *port,
            },
        ))
    }
}

/// Looks for an existing valid build: the output (or project) directory,
/// then `dist/<mode>/<platform>`, then `unpackage/dist/<mode>/<platform>`.
fn find_build(puppet: &Puppet, project_path: &Path, first: &Path) -> Option<PathBuf> {
    let suffix = Path::new(puppet.mode().as_str()).join(puppet.platform());
    [
        first.to_path_buf(),
        project_path.join("dist").join(&suffix),
        project_path.join("unpackage/dist").join(&suffix),
    ]
    .into_iter()
    .find(|candidate| puppet.validate_project(candidate))
}

// ============================================================================
// Validation
// ============================================================================

/// Resolves and checks project path, CLI path, port and timeout.
///
/// # Errors
///
/// - [`Error::ProjectNotFound`] if the project path does not exist
/// - [`Error::CliPathNotFound`] if no candidate CLI path qualifies
/// - [`Error::PortInUse`] if the requested or default port is taken
pub async fn validate(options: &LaunchOptions, environment: &Environment) -> Result<ValidatedLaunch> {
    let project_path = resolve_project_path(options.project_path.as_deref(), environment)?;
    let cli_path = resolve_cli_path(options.cli_path.as_deref(), environment, &project_path)?;
    let port = resolve_port(options.port).await?;

    let validated = ValidatedLaunch {
        project_path,
        cli_path,
        port,
        timeout: options.timeout(),
    };
    debug!(?validated, "Launch options validated");
    Ok(validated)
}

/// Option, else `UNI_INPUT_DIR`, else the working directory; made absolute.
fn resolve_project_path(option: Option<&Path>, environment: &Environment) -> Result<PathBuf> {
    let path = option
        .map(Path::to_path_buf)
        .or_else(|| environment.input_dir.clone())
        .unwrap_or_else(|| environment.cwd.clone());
    let path = if path.is_relative() {
        environment.cwd.join(path)
    } else {
        path
    };

    if path.exists() {
        Ok(path)
    } else {
        Err(Error::project_not_found(path))
    }
}

/// `UNI_CLI_PATH` or option, then the working directory, then the project;
/// the first whose `package.json` depends on the build CLI wins.
fn resolve_cli_path(
    option: Option<&Path>,
    environment: &Environment,
    project_path: &Path,
) -> Result<PathBuf> {
    let explicit = environment
        .cli_path
        .as_deref()
        .or(option)
        .map(|p| environment.cwd.join(p));

    explicit
        .into_iter()
        .chain([environment.cwd.clone(), project_path.to_path_buf()])
        .find(|candidate| has_cli_deps(candidate))
        .ok_or(Error::CliPathNotFound)
}

/// Returns `true` if `dir/package.json` lists a build CLI package in its
/// dependencies or dev dependencies.
fn has_cli_deps(dir: &Path) -> bool {
    let Ok(text) = std::fs::read_to_string(dir.join("package.json")) else {
        return false;
    };
    let Ok(package) = serde_json::from_str::<PackageJson>(&text) else {
        return false;
    };
    CLI_PACKAGES.iter().any(|name| {
        package.dependencies.contains_key(*name) || package.dev_dependencies.contains_key(*name)
    })
}

/// The requested port, or the default, must be free.
async fn resolve_port(requested: Option<u16>) -> Result<u16> {
    let port = requested.filter(|p| *p != 0).unwrap_or(DEFAULT_PORT);
    if port_available(port).await {
        Ok(port)
    } else {
        Err(Error::PortInUse { port })
    }
}

async fn port_available(port: u16) -> bool {
    TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .await
        .is_ok()
}

// ============================================================================
// Tests
// ============================================================================
