//! Per-launch state.
//!
//! The [`Puppet`] owns everything a launch produces: the runtime and devtool
//! connections, the runtime listening server, the build process, and the
//! target whose hooks drive the launch.
//!
//! # Lifecycle
//!
//! ```text
//! constructed → devtools validated → compiled | not
//!             → runtime + devtool connected → disposed
//! ```
//!
//! The runtime connection lives in a `watch` channel so launch code can
//! wait for the first peer and later peers (remote-debug reconnects) simply
//! replace it.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::adapter::Adapter;
use crate::compiler::Compiler;
use crate::config::{BuildMode, DevtoolsOptions, Environment, LaunchOptions};
use crate::descriptor::equal_ws_endpoint;
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::target::{DevtoolsDescriptor, Target};
use crate::transport::{Connection, RuntimeServer};

// ============================================================================
// Types
// ============================================================================

/// One-shot callback fired when the next runtime connection is installed.
type RuntimeCallback = Box<dyn FnOnce() + Send>;

/// Shared puppet state.
struct PuppetInner {
    platform: String,
    target: Arc<dyn Target>,
    adapter: Arc<Adapter>,
    events: EventBus,
    environment: Environment,
    runtime: watch::Sender<Option<Connection>>,
    devtool: RwLock<Option<Connection>>,
    runtime_server: Mutex<Option<RuntimeServer>>,
    compiler: Mutex<Option<Arc<Compiler>>>,
    remote_callback: Mutex<Option<RuntimeCallback>>,
    compiled: AtomicBool,
}

// ============================================================================
// Puppet
// ============================================================================

/// Launch state handle. Cloning shares the state.
#[derive(Clone)]
pub struct Puppet {
    inner: Arc<PuppetInner>,
}

/// Non-owning puppet handle, held by the runtime server.
#[derive(Clone)]
pub struct WeakPuppet(Weak<PuppetInner>);

impl WeakPuppet {
    /// Returns the puppet if it is still alive.
    #[inline]
    #[must_use]
    pub fn upgrade(&self) -> Option<Puppet> {
        self.0.upgrade().map(|inner| Puppet { inner })
    }
}

impl fmt::Debug for Puppet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Puppet")
            .field("platform", &self.inner.platform)
            .field("devtools", &self.inner.target.devtools().name)
            .field("compiled", &self.compiled())
            .field("runtime", &self.runtime_connection().is_some())
            .field("devtool", &self.devtool_connection().is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Puppet - Constructor
// ============================================================================

impl Puppet {
    /// Creates the state for one launch of `platform`.
    #[must_use]
    pub fn new(platform: impl Into<String>, target: Arc<dyn Target>, environment: Environment) -> Self {
        let adapter = Arc::new(target.adapter());
        let (runtime, _) = watch::channel(None);

        Self {
            inner: Arc::new(PuppetInner {
                platform: platform.into(),
                target,
                adapter,
                events: EventBus::new(),
                environment,
                runtime,
                devtool: RwLock::new(None),
                runtime_server: Mutex::new(None),
                compiler: Mutex::new(None),
                remote_callback: Mutex::new(None),
                compiled: AtomicBool::new(false),
            }),
        }
    }

    /// Returns a non-owning handle.
    #[inline]
    #[must_use]
    pub fn downgrade(&self) -> WeakPuppet {
        WeakPuppet(Arc::downgrade(&self.inner))
    }
}

// ============================================================================
// Puppet - Accessors
// ============================================================================

impl Puppet {
    /// Returns the platform id.
    #[inline]
    #[must_use]
    pub fn platform(&self) -> &str {
        &self.inner.platform
    }

    /// Returns the target.
    #[inline]
    #[must_use]
    pub fn target(&self) -> &Arc<dyn Target> {
        &self.inner.target
    }

    /// Returns the target's devtool capabilities.
    #[inline]
    #[must_use]
    pub fn devtools(&self) -> &DevtoolsDescriptor {
        self.inner.target.devtools()
    }

    /// Returns the adapter table.
    #[inline]
    #[must_use]
    pub fn adapter(&self) -> Arc<Adapter> {
        Arc::clone(&self.inner.adapter)
    }

    /// Returns the bus broadcast messages are emitted on.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Returns the environment snapshot.
    #[inline]
    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.inner.environment
    }

    /// Returns the build mode: the target's, else derived from `NODE_ENV`.
    #[must_use]
    pub fn mode(&self) -> BuildMode {
        self.inner.target.mode().unwrap_or(if self.inner.environment.is_production() {
            BuildMode::Build
        } else {
            BuildMode::Dev
        })
    }

    /// Returns `true` if property names are checked against public props.
    #[inline]
    #[must_use]
    pub fn check_property(&self) -> bool {
        self.inner.platform == "mp-weixin"
    }

    /// Returns `true` if this launch compiled the project.
    #[inline]
    #[must_use]
    pub fn compiled(&self) -> bool {
        self.inner.compiled.load(Ordering::SeqCst)
    }

    /// Records the compile decision.
    #[inline]
    pub fn set_compiled(&self, compiled: bool) {
        self.inner.compiled.store(compiled, Ordering::SeqCst);
    }
}

// ============================================================================
// Puppet - Launch Hooks
// ============================================================================

impl Puppet {
    /// Decides whether the project must be compiled.
    ///
    /// The target decides if it wants to; otherwise `compile: true` forces
    /// it; otherwise compile unless the persisted descriptor matches the
    /// current endpoint and tool version.
    pub fn should_compile(
        &self,
        project_path: &Path,
        port: u16,
        options: &LaunchOptions,
        devtools: &DevtoolsOptions,
    ) -> bool {
        let compiled = match self.inner.target.should_compile(options, devtools) {
            Some(decision) => decision,
            None if options.compile => true,
            None => !equal_ws_endpoint(
                project_path,
                port,
                &self.inner.platform,
                self.mode(),
                &self.inner.environment,
            ),
        };
        debug!(platform = %self.inner.platform, compiled, "Compile decision");
        self.set_compiled(compiled);
        compiled
    }

    /// Returns `true` if every required file exists under `project_path`.
    #[must_use]
    pub fn validate_project(&self, project_path: &Path) -> bool {
        self.devtools()
            .required
            .iter()
            .all(|file| project_path.join(file).exists())
    }

    /// Lets the target validate and normalize its devtool options.
    ///
    /// # Errors
    ///
    /// Whatever the target rejects with.
    pub async fn validate_devtools(&self, options: DevtoolsOptions) -> Result<DevtoolsOptions> {
        self.inner.target.validate(options, self).await
    }

    /// Lets the target bring its devtool up.
    ///
    /// # Errors
    ///
    /// Whatever the target fails with.
    pub async fn create_devtools(
        &self,
        project_path: &Path,
        mut options: DevtoolsOptions,
        timeout: Duration,
    ) -> Result<()> {
        options.timeout = Some(timeout.as_millis() as u64);
        self.inner.target.create(project_path, &options, self).await
    }
}

// ============================================================================
// Puppet - Connections
// ============================================================================

impl Puppet {
    /// Returns the runtime connection, if established.
    #[must_use]
    pub fn runtime_connection(&self) -> Option<Connection> {
        self.inner.runtime.borrow().clone()
    }

    /// Returns the devtool connection, if established.
    #[must_use]
    pub fn devtool_connection(&self) -> Option<Connection> {
        self.inner.devtool.read().clone()
    }

    /// Watches runtime connection changes.
    #[must_use]
    pub fn subscribe_runtime(&self) -> watch::Receiver<Option<Connection>> {
        self.inner.runtime.subscribe()
    }

    /// Installs a runtime connection, replacing any previous one.
    ///
    /// Fires the pending remote-runtime callback, if any.
    pub fn set_runtime_connection(&self, connection: Connection) {
        info!(platform = %self.inner.platform, "Runtime connected");
        self.inner.runtime.send_replace(Some(connection));

        let callback = self.inner.remote_callback.lock().take();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Installs the devtool connection.
    pub fn set_devtool_connection(&self, connection: Connection) {
        info!(platform = %self.inner.platform, "Devtool connected");
        *self.inner.devtool.write() = Some(connection);
    }

    /// Registers a callback for the next runtime connection.
    pub fn set_remote_runtime_connection_callback<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.inner.remote_callback.lock() = Some(Box::new(callback));
    }

    /// Keeps the runtime listening server alive for this launch.
    pub fn set_runtime_server(&self, server: RuntimeServer) {
        if let Some(previous) = self.inner.runtime_server.lock().replace(server) {
            previous.close();
        }
    }

    /// Keeps the build process for this launch.
    pub fn set_compiler(&self, compiler: Arc<Compiler>) {
        *self.inner.compiler.lock() = Some(compiler);
    }

    /// Sends on the runtime connection.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionClosed`] if no runtime connection exists, else see
    /// [`Connection::send`].
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        let connection = self.runtime_connection().ok_or(Error::ConnectionClosed)?;
        connection.send(method, params).await
    }
}

// ============================================================================
// Puppet - Dispose
// ============================================================================

impl Puppet {
    /// Closes the runtime connection.
    pub fn dispose_runtime(&self) {
        if let Some(connection) = self.runtime_connection() {
            connection.dispose();
        }
    }

    /// Stops the build process, then closes the devtool connection.
    pub fn dispose_devtool(&self) {
        if let Some(compiler) = self.inner.compiler.lock().as_ref() {
            compiler.stop();
        }
        if let Some(connection) = self.devtool_connection() {
            connection.dispose();
        }
    }

    /// Stops the runtime listening server.
    pub fn dispose_runtime_server(&self) {
        if let Some(server) = self.inner.runtime_server.lock().take() {
            server.close();
        }
    }

    /// Disposes everything: runtime, devtool side, runtime server.
    pub fn dispose(&self) {
        debug!(platform = %self.inner.platform, "Disposing puppet");
        self.dispose_runtime();
        self.dispose_devtool();
        self.dispose_runtime_server();
    }
}

// ============================================================================
// Tests
// ============================================================================
