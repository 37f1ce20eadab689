//! Launch configuration.
//!
//! [`LaunchOptions`] is what a test suite passes to the launcher,
//! [`DevtoolsOptions`] is the per-platform devtool section inside it, and
//! [`Environment`] is a one-time snapshot of the process environment that is
//! threaded through the launch instead of reading globals.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use uni_automator::{DevtoolsOptions, LaunchOptions, TeardownMode};
//!
//! let options = LaunchOptions::new("mp-weixin")
//!     .with_project_path("/work/hello-uniapp")
//!     .with_port(9520)
//!     .with_timeout(Duration::from_secs(90))
//!     .with_devtools("mp-weixin", DevtoolsOptions::new().with_teardown(TeardownMode::Close));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default runtime listener port.
pub const DEFAULT_PORT: u16 = 9520;

/// Default launch timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// TeardownMode
// ============================================================================

/// What `Program::teardown` does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeardownMode {
    /// Drop the connections, leave the application running.
    #[default]
    Disconnect,
    /// Exit the application and close the devtool.
    Close,
}

// ============================================================================
// BuildMode
// ============================================================================

/// Build flavour passed to the CLI as `<mode>:<platform>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Development build.
    #[default]
    Dev,
    /// Production build.
    Build,
}

impl BuildMode {
    /// Returns `dev` or `build`.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Build => "build",
        }
    }

    /// Returns the `NODE_ENV` value for this mode.
    #[inline]
    #[must_use]
    pub const fn node_env(self) -> &'static str {
        match self {
            Self::Dev => "development",
            Self::Build => "production",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dev" => Ok(Self::Dev),
            "build" => Ok(Self::Build),
            other => Err(Error::config(format!("unknown build mode: {other}"))),
        }
    }
}

// ============================================================================
// DevtoolsOptions
// ============================================================================

/// Per-platform devtool options.
///
/// Only `teardown` is interpreted by the core. Every other key is kept for
/// the target (IDE path, account, `wsEndpoint`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevtoolsOptions {
    /// Teardown mode override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown: Option<TeardownMode>,

    /// Launch timeout in milliseconds, filled in by the launcher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Target-specific keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DevtoolsOptions {
    /// Creates empty options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the teardown mode.
    #[inline]
    #[must_use]
    pub fn with_teardown(mut self, teardown: TeardownMode) -> Self {
        self.teardown = Some(teardown);
        self
    }

    /// Sets a target-specific key.
    #[inline]
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Returns a target-specific key.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Returns a target-specific key as a string.
    #[inline]
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

// ============================================================================
// LaunchOptions
// ============================================================================

/// Options for one launch.
///
/// Deserializes from the camelCase JSON the test configuration files use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOptions {
    /// Platform id (`h5`, `app-plus`, `mp-weixin`, ...).
    pub platform: String,

    /// Project source directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<PathBuf>,

    /// Directory of the build CLI package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_path: Option<PathBuf>,

    /// Runtime listener port. An explicit port must be free.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Host injected into the build as `--auto-host`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Launch timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Force compilation.
    #[serde(default)]
    pub compile: bool,

    /// Do not echo build output.
    #[serde(default)]
    pub silent: bool,

    /// Devtool sections keyed by platform id.
    ///
    /// In JSON these are the top-level object keys (`"mp-weixin": {..}`,
    /// `"app-plus": {..}`); other unknown keys are ignored.
    #[serde(flatten, deserialize_with = "platform_sections")]
    pub devtools: FxHashMap<String, DevtoolsOptions>,
}

fn platform_sections<'de, D>(
    deserializer: D,
) -> std::result::Result<FxHashMap<String, DevtoolsOptions>, D::Error>
where
    D: Deserializer<'de>,
{
    Map::<String, Value>::deserialize(deserializer)?
        .into_iter()
        .filter(|(_, section)| section.is_object())
        .map(|(platform, section)| {
            serde_json::from_value(section)
                .map(|options| (platform, options))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}

// ============================================================================
// LaunchOptions - Constructors
// ============================================================================

impl LaunchOptions {
    /// Creates options for `platform` with defaults.
    #[must_use]
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            ..Default::default()
        }
    }

    /// Loads options from a JSON file.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::Json`] if it is not valid options JSON
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let options: Self = serde_json::from_str(&text)?;
        if options.platform.is_empty() {
            return Err(Error::config("platform is required"));
        }
        Ok(options)
    }
}

// ============================================================================
// LaunchOptions - Builder Methods
// ============================================================================

impl LaunchOptions {
    /// Sets the project path.
    #[inline]
    #[must_use]
    pub fn with_project_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_path = Some(path.into());
        self
    }

    /// Sets the CLI path.
    #[inline]
    #[must_use]
    pub fn with_cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cli_path = Some(path.into());
        self
    }

    /// Sets the runtime port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the `--auto-host` value.
    #[inline]
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the launch timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.as_millis() as u64);
        self
    }

    /// Forces compilation.
    #[inline]
    #[must_use]
    pub fn with_compile(mut self) -> Self {
        self.compile = true;
        self
    }

    /// Silences build output.
    #[inline]
    #[must_use]
    pub fn with_silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Sets the devtool section for `platform`.
    #[inline]
    #[must_use]
    pub fn with_devtools(mut self, platform: impl Into<String>, options: DevtoolsOptions) -> Self {
        self.devtools.insert(platform.into(), options);
        self
    }
}

// ============================================================================
// LaunchOptions - Accessors
// ============================================================================

impl LaunchOptions {
    /// Returns the launch timeout, defaulting to 60 s.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        match self.timeout {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ => DEFAULT_TIMEOUT,
        }
    }

    /// Returns the devtool section of the launch platform.
    ///
    /// `app` reads the `app` section, then `app-plus`.
    #[must_use]
    pub fn devtools_options(&self) -> DevtoolsOptions {
        let section = if self.platform == "app" {
            self.devtools
                .get("app")
                .or_else(|| self.devtools.get("app-plus"))
        } else {
            self.devtools.get(&self.platform)
        };
        section.cloned().unwrap_or_default()
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Snapshot of the environment variables the launch reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    /// `UNI_INPUT_DIR`.
    pub input_dir: Option<PathBuf>,
    /// `UNI_OUTPUT_DIR`.
    pub output_dir: Option<PathBuf>,
    /// `UNI_CLI_PATH`.
    pub cli_path: Option<PathBuf>,
    /// `UNI_NODE_PATH`.
    pub node_path: Option<PathBuf>,
    /// `UNI_NPM_PATH`.
    pub npm_path: Option<PathBuf>,
    /// `NODE_ENV`.
    pub node_env: Option<String>,
    /// Working directory at snapshot time.
    pub cwd: PathBuf,
}

impl Environment {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the working directory is unavailable.
    pub fn from_env() -> Result<Self> {
        let path = |key: &str| {
            std::env::var_os(key)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };

        Ok(Self {
            input_dir: path("UNI_INPUT_DIR"),
            output_dir: path("UNI_OUTPUT_DIR"),
            cli_path: path("UNI_CLI_PATH"),
            node_path: path("UNI_NODE_PATH"),
            npm_path: path("UNI_NPM_PATH"),
            node_env: std::env::var("NODE_ENV").ok().filter(|v| !v.is_empty()),
            cwd: std::env::current_dir()?,
        })
    }

    /// Creates an empty environment rooted at `cwd`.
    #[must_use]
    pub fn with_cwd(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            ..Default::default()
        }
    }

    /// Returns `true` when `NODE_ENV=production`.
    #[inline]
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.node_env.as_deref() == Some("production")
    }

    /// Returns the npm binary.
    #[must_use]
    pub fn npm(&self) -> PathBuf {
        self.npm_path.clone().unwrap_or_else(|| {
            PathBuf::from(if cfg!(windows) { "npm.cmd" } else { "npm" })
        })
    }

    /// Returns the node binary.
    #[must_use]
    pub fn node(&self) -> PathBuf {
        self.node_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("node"))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = LaunchOptions::new("h5");
        assert_eq!(options.timeout(), Duration::from_secs(60));
        assert_eq!(options.port, None);
        assert!(!options.compile);
        assert_eq!(options.devtools_options(), DevtoolsOptions::default());
    }

    #[test]
    fn test_builder_chain() {
        let options = LaunchOptions::new("mp-weixin")
            .with_port(9600)
            .with_host("10.0.0.2")
            .with_timeout(Duration::from_secs(5))
            .with_compile()
            .with_silent();

        assert_eq!(options.port, Some(9600));
        assert_eq!(options.host.as_deref(), Some("10.0.0.2"));
        assert_eq!(options.timeout(), Duration::from_secs(5));
        assert!(options.compile);
        assert!(options.silent);
    }

    #[test]
    fn test_app_reads_app_plus_section() {
        let options = LaunchOptions::new("app").with_devtools(
            "app-plus",
            DevtoolsOptions::new().with_teardown(TeardownMode::Close),
        );
        assert_eq!(options.devtools_options().teardown, Some(TeardownMode::Close));
    }

    #[test]
    fn test_deserialize_camel_case() {
        let options: LaunchOptions = serde_json::from_value(json!({
            "platform": "mp-weixin",
            "projectPath": "/p",
            "cliPath": "/c",
            "port": 9521,
            "timeout": 1000,
            "mp-weixin": {"teardown": "close", "executablePath": "/ide/cli"},
            "h5": {"options": {"headless": true}},
            "testTimeout": 30000
        }))
        .unwrap();

        assert_eq!(options.devtools.len(), 2);
        assert_eq!(options.devtools["h5"].get("options"), Some(&json!({"headless": true})));

        assert_eq!(options.project_path.as_deref(), Some(Path::new("/p")));
        assert_eq!(options.timeout(), Duration::from_millis(1000));
        let devtools = options.devtools_options();
        assert_eq!(devtools.teardown, Some(TeardownMode::Close));
        assert_eq!(devtools.get_str("executablePath"), Some("/ide/cli"));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("automator.json");
        std::fs::write(
            &path,
            r#"{"platform": "app", "compile": true, "app-plus": {"teardown": "disconnect"}}"#,
        )
        .unwrap();

        let options = LaunchOptions::from_json_file(&path).unwrap();
        assert_eq!(options.platform, "app");
        assert!(options.compile);
        assert_eq!(options.devtools_options().teardown, Some(TeardownMode::Disconnect));
    }

    #[test]
    fn test_from_json_file_requires_platform() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("automator.json");
        std::fs::write(&path, r#"{"platform": ""}"#).unwrap();

        assert!(matches!(
            LaunchOptions::from_json_file(&path),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_build_mode() {
        assert_eq!("build".parse::<BuildMode>().unwrap(), BuildMode::Build);
        assert_eq!(BuildMode::Dev.node_env(), "development");
        assert!("prod".parse::<BuildMode>().is_err());
    }

    #[test]
    fn test_environment_production() {
        let mut env = Environment::with_cwd("/tmp");
        assert!(!env.is_production());
        env.node_env = Some("production".into());
        assert!(env.is_production());
        assert_eq!(env.node(), PathBuf::from("node"));
    }
}
