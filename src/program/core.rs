//! Program struct, events, bindings and lifecycle.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::TeardownMode;
use crate::error::{Error, Result};
use crate::events::{EventBus, ListenerId};
use crate::protocol::BindingCall;
use crate::puppet::Puppet;

use super::app::App;
use super::invoke::Invoker;
use super::page::PageMap;
use super::tool::Tool;

// ============================================================================
// Constants
// ============================================================================

/// Program event carrying application console output.
pub const CONSOLE: &str = "console";

/// Program event carrying uncaught application exceptions.
pub const EXCEPTION: &str = "exception";

/// Grace period between `App.exit` and closing the devtool.
const EXIT_GRACE: Duration = Duration::from_secs(1);

/// Settle delay after the remote-debug client attaches.
const REMOTE_SETTLE: Duration = Duration::from_secs(1);

// ============================================================================
// Types
// ============================================================================

/// Host function callable from the application.
pub type Binding = Arc<dyn Fn(&[Value]) + Send + Sync>;

type BindingMap = Arc<Mutex<FxHashMap<String, Binding>>>;

/// Options a program is assembled with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramOptions {
    /// What [`Program::teardown`] does.
    pub teardown: TeardownMode,
    /// Runtime listening port.
    pub port: u16,
}

pub(crate) struct ProgramInner {
    pub(crate) puppet: Puppet,
    pub(crate) options: ProgramOptions,
    pub(crate) invoker: Invoker,
    pub(crate) pages: PageMap,
    pub(crate) app: App,
    pub(crate) tool: Tool,
    bindings: BindingMap,
    events: EventBus,
}

// ============================================================================
// Program
// ============================================================================

/// A launched application under automation.
///
/// Cloning shares the same program.
#[derive(Clone)]
pub struct Program {
    pub(crate) inner: Arc<ProgramInner>,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("puppet", &self.inner.puppet)
            .field("options", &self.inner.options)
            .field("pages", &self.inner.pages.lock().len())
            .finish_non_exhaustive()
    }
}

impl Program {
    /// Assembles a program over a connected puppet.
    ///
    /// Console output, binding calls and exceptions from the application
    /// are wired up here.
    #[must_use]
    pub fn new(puppet: Puppet, options: ProgramOptions) -> Self {
        let invoker = Invoker::new(puppet.clone());
        let app = App::new(invoker.clone());
        let tool = Tool::new(invoker.clone());
        let events = EventBus::new();
        let bindings: BindingMap = Arc::new(Mutex::new(FxHashMap::default()));

        let console = events.clone();
        app.on_log_added(move |params| {
            console.emit(CONSOLE, params);
        });

        let exceptions = events.clone();
        app.on_exception_thrown(move |params| {
            exceptions.emit(EXCEPTION, params);
        });

        let registered = Arc::clone(&bindings);
        app.on_binding_called(move |params| {
            call_binding(&registered, params);
        });

        Self {
            inner: Arc::new(ProgramInner {
                puppet,
                options,
                invoker,
                pages: Arc::new(Mutex::new(FxHashMap::default())),
                app,
                tool,
                bindings,
                events,
            }),
        }
    }
}

// ============================================================================
// Program - Accessors
// ============================================================================

impl Program {
    #[inline]
    #[must_use]
    pub fn puppet(&self) -> &Puppet {
        &self.inner.puppet
    }

    #[inline]
    #[must_use]
    pub fn options(&self) -> ProgramOptions {
        self.inner.options
    }

    /// Raw `App.*` API.
    #[inline]
    #[must_use]
    pub fn app(&self) -> &App {
        &self.inner.app
    }

    /// Raw `Tool.*` API.
    #[inline]
    #[must_use]
    pub fn tool(&self) -> &Tool {
        &self.inner.tool
    }
}

// ============================================================================
// Program - Events & Bindings
// ============================================================================

impl Program {
    /// Subscribes to a program event ([`CONSOLE`] or [`EXCEPTION`]).
    ///
    /// Subscribing to [`CONSOLE`] turns on remote logging.
    pub async fn on<F>(&self, event: &str, listener: F) -> Result<ListenerId>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.inner.events.on(event, listener);
        if event == CONSOLE {
            self.inner.app.enable_log().await?;
        }
        Ok(id)
    }

    /// Removes a program event listener.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.inner.events.off(event, id)
    }

    /// Exposes `binding` to the application as a global named `name`.
    ///
    /// # Errors
    ///
    /// [`Error::BindingExists`] if `name` is already exposed.
    pub async fn expose_function<F>(&self, name: &str, binding: F) -> Result<()>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        {
            let mut bindings = self.inner.bindings.lock();
            if bindings.contains_key(name) {
                return Err(Error::BindingExists {
                    name: name.to_string(),
                });
            }
            bindings.insert(name.to_string(), Arc::new(binding));
        }

        if let Err(e) = self.inner.app.add_binding(json!({ "name": name })).await {
            self.inner.bindings.lock().remove(name);
            return Err(e);
        }
        debug!(name, "Binding exposed");
        Ok(())
    }
}

/// Runs the binding named in a `bindingCalled` payload. Failures (unknown
/// name, bad payload, panics) are dropped.
fn call_binding(bindings: &BindingMap, params: &Value) {
    let Ok(call) = serde_json::from_value::<BindingCall>(params.clone()) else {
        debug!(%params, "Malformed binding call");
        return;
    };
    let binding = bindings.lock().get(&call.name).cloned();
    let Some(binding) = binding else {
        debug!(name = %call.name, "Unknown binding called");
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| binding(&call.args))).is_err() {
        warn!(name = %call.name, "Binding panicked");
    }
}

// ============================================================================
// Program - Lifecycle
// ============================================================================

impl Program {
    /// Enables remote (real device) debugging and waits until the device
    /// is attached and its runtime has connected.
    ///
    /// Logs a warning and returns if the devtool does not support it.
    pub async fn remote(&self, auto: bool) -> Result<()> {
        let devtools = self.inner.puppet.devtools();
        if !devtools.remote {
            warn!(devtools = %devtools.name, "Failed to enable remote, devtool does not implement it");
            return Ok(());
        }

        let (connected_tx, connected_rx) = oneshot::channel();
        self.inner.tool.on_remote_debug_connected(move |_| {
            let _ = connected_tx.send(());
        });
        let (runtime_tx, runtime_rx) = oneshot::channel();
        self.inner
            .puppet
            .set_remote_runtime_connection_callback(move || {
                let _ = runtime_tx.send(());
            });

        let response = self.inner.tool.enable_remote_debug(auto).await?;
        if let Some(code) = response.get("qrCode").and_then(Value::as_str) {
            info!(qr_code = %code, "Scan the code to start remote debugging");
        }

        let connected = async {
            connected_rx.await?;
            sleep(REMOTE_SETTLE).await;
            Ok::<_, Error>(())
        };
        let runtime = async { runtime_rx.await.map_err(Error::from) };
        tokio::try_join!(connected, runtime)?;

        info!("Remote debugging connected");
        Ok(())
    }

    /// Exits the application, closes the devtool and disconnects.
    ///
    /// A failing `App.exit` is ignored.
    pub async fn close(&self) -> Result<()> {
        if let Err(e) = self.inner.app.exit().await {
            debug!(error = %e, "App.exit failed");
        }
        sleep(EXIT_GRACE).await;
        self.inner.puppet.dispose_runtime_server();

        let closed = self.inner.tool.close().await;
        self.disconnect();
        closed.map(drop)
    }

    /// Closes or disconnects, per [`ProgramOptions::teardown`].
    pub async fn teardown(&self) -> Result<()> {
        match self.inner.options.teardown {
            TeardownMode::Disconnect => {
                self.disconnect();
                Ok(())
            }
            TeardownMode::Close => self.close().await,
        }
    }

    /// Drops every connection and stops background processes; the
    /// application keeps running.
    pub fn disconnect(&self) {
        info!(platform = %self.inner.puppet.platform(), "Disconnecting");
        self.inner.puppet.dispose();
    }
}

// ============================================================================
// Tests
// ============================================================================
