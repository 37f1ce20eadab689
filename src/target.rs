//! Platform targets.
//!
//! A [`Target`] describes one platform: which files make a build valid, how
//! its devtool is brought up, and which methods need rewriting. The launcher
//! looks targets up by platform id.
//!
//! [`TargetDescriptor`] covers the common case of a target that only needs
//! static capabilities and, optionally, a devtool reachable at a known
//! WebSocket URL (the `wsEndpoint` devtool option).

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::adapter::Adapter;
use crate::config::{BuildMode, DevtoolsOptions, LaunchOptions, TeardownMode};
use crate::error::Result;
use crate::puppet::Puppet;
use crate::transport::Connection;

// ============================================================================
// DevtoolsDescriptor
// ============================================================================

/// Static devtool capabilities of a target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevtoolsDescriptor {
    /// Display name.
    pub name: String,
    /// Files that must exist for a build directory to be valid.
    pub required: Vec<String>,
    /// Supports remote (real device) debugging.
    pub remote: bool,
    /// Default teardown mode.
    pub teardown: Option<TeardownMode>,
}

impl DevtoolsDescriptor {
    /// Creates a descriptor named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds a required file.
    #[must_use]
    pub fn with_required(mut self, file: impl Into<String>) -> Self {
        self.required.push(file.into());
        self
    }

    /// Marks remote debugging as supported.
    #[must_use]
    pub fn with_remote(mut self) -> Self {
        self.remote = true;
        self
    }

    /// Sets the default teardown mode.
    #[must_use]
    pub fn with_teardown(mut self, teardown: TeardownMode) -> Self {
        self.teardown = Some(teardown);
        self
    }
}

// ============================================================================
// Target
// ============================================================================

/// Platform hooks used during a launch.
///
/// Every hook except [`Target::devtools`] has a default.
#[async_trait]
pub trait Target: Send + Sync + 'static {
    /// Static devtool capabilities.
    fn devtools(&self) -> &DevtoolsDescriptor;

    /// Method rewriting table.
    fn adapter(&self) -> Adapter {
        Adapter::default()
    }

    /// Fixed build mode, if the platform has one.
    fn mode(&self) -> Option<BuildMode> {
        None
    }

    /// Compile decision. `None` defers to the launcher's heuristic.
    fn should_compile(&self, _options: &LaunchOptions, _devtools: &DevtoolsOptions) -> Option<bool> {
        None
    }

    /// Validates and normalizes the devtool options.
    async fn validate(&self, options: DevtoolsOptions, _puppet: &Puppet) -> Result<DevtoolsOptions> {
        Ok(options)
    }

    /// Brings the devtool up for `project_path`.
    ///
    /// The default dials `options["wsEndpoint"]` when present and installs
    /// the connection on the puppet; otherwise the launch runs without a
    /// devtool connection.
    async fn create(
        &self,
        _project_path: &Path,
        options: &DevtoolsOptions,
        puppet: &Puppet,
    ) -> Result<()> {
        let Some(url) = options.get_str("wsEndpoint") else {
            debug!(target = %self.devtools().name, "No devtool endpoint configured");
            return Ok(());
        };
        let connection = Connection::create_devtool_connection(url, puppet).await?;
        puppet.set_devtool_connection(connection);
        Ok(())
    }
}

// ============================================================================
// TargetDescriptor
// ============================================================================

/// Data-only [`Target`].
///
/// # Example
///
/// ```ignore
/// use uni_automator::{AdapterEntry, DevtoolsDescriptor, TargetDescriptor};
///
/// let target = TargetDescriptor::new(DevtoolsDescriptor::new("Simulator").with_remote())
///     .with_adapter_entry("Element.tap", AdapterEntry::reflect("Element.customTap"));
/// ```
#[derive(Clone, Default)]
pub struct TargetDescriptor {
    devtools: DevtoolsDescriptor,
    adapter: Adapter,
    mode: Option<BuildMode>,
    compile: Option<bool>,
}

impl fmt::Debug for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetDescriptor")
            .field("devtools", &self.devtools)
            .field("adapter", &self.adapter.len())
            .field("mode", &self.mode)
            .field("compile", &self.compile)
            .finish()
    }
}

impl TargetDescriptor {
    /// Creates a target with `devtools` capabilities.
    #[must_use]
    pub fn new(devtools: DevtoolsDescriptor) -> Self {
        Self {
            devtools,
            ..Default::default()
        }
    }

    /// Sets the adapter table.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Adapter) -> Self {
        self.adapter = adapter;
        self
    }

    /// Adds one adapter entry.
    #[must_use]
    pub fn with_adapter_entry(
        mut self,
        method: impl Into<String>,
        entry: crate::adapter::AdapterEntry,
    ) -> Self {
        self.adapter = self.adapter.with(method, entry);
        self
    }

    /// Pins the build mode.
    #[must_use]
    pub fn with_mode(mut self, mode: BuildMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Pins the compile decision.
    #[must_use]
    pub fn with_compile(mut self, compile: bool) -> Self {
        self.compile = Some(compile);
        self
    }
}

#[async_trait]
impl Target for TargetDescriptor {
    fn devtools(&self) -> &DevtoolsDescriptor {
        &self.devtools
    }

    fn adapter(&self) -> Adapter {
        self.adapter.clone()
    }

    fn mode(&self) -> Option<BuildMode> {
        self.mode
    }

    fn should_compile(&self, _options: &LaunchOptions, _devtools: &DevtoolsOptions) -> Option<bool> {
        self.compile
    }
}

// ============================================================================
// Tests
// ============================================================================
