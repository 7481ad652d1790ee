//! Caller-facing handle to one engine instance.
//!
//! All operations lock the same mutex for the whole send-then-receive
//! sequence, so at most one call is outstanding per engine. Independent
//! controllers share nothing and run fully in parallel.

use std::io::{Read, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::connection::{Connection, ProgressFn};
use crate::error::{Error, Result};
use crate::ipc::{Parameter, Request};
use crate::sink::{MessageSink, TracingSink};
use crate::supervisor::{self, EngineConfig, EngineConnection, EngineProcess};

struct State {
    /// `None` once disposed.
    connection: Option<EngineConnection>,
    engine: Option<EngineProcess>,
    sink: Box<dyn MessageSink>,
    /// Set by the first fatal error; later calls fail without touching the wire.
    fault: Option<String>,
}

/// Synchronous bridge to an Emme Modeller engine.
///
/// # Example
///
/// ```no_run
/// use modeller_bridge::{EngineConfig, ModellerController, Parameter};
///
/// let controller = ModellerController::launch(&EngineConfig::new("network.emp"))?;
///
/// let mut report = |p: f32| println!("{:.0}%", p * 100.0);
/// controller.run("tmg.assignment.road", "1 2 \"out.bin\" 3", Some(&mut report))?;
///
/// let value = controller.run_with_parameters(
///     "tmg.analysis.export",
///     &[Parameter::new("scenario_id", "1")],
///     None,
/// )?;
/// println!("{value:?}");
///
/// controller.dispose();
/// # Ok::<(), modeller_bridge::Error>(())
/// ```
pub struct ModellerController {
    state: Mutex<State>,
}

impl ModellerController {
    /// Spawn an engine for the configured project and wait until it is ready.
    pub fn launch(config: &EngineConfig) -> Result<Self> {
        let (engine, connection) = supervisor::launch(config)?;
        Ok(Self::with_connection(connection, Some(engine)))
    }

    /// Build a bridge over already connected streams.
    ///
    /// Blocks until the peer sends its ready signal.
    pub fn from_streams(
        reader: impl Read + Send + 'static,
        writer: impl Write + Send + 'static,
    ) -> Result<Self> {
        let mut connection: EngineConnection = Connection::new(Box::new(reader), Box::new(writer));
        connection.wait_for_ready()?;
        Ok(Self::with_connection(connection, None))
    }

    fn with_connection(connection: EngineConnection, engine: Option<EngineProcess>) -> Self {
        Self {
            state: Mutex::new(State {
                connection: Some(connection),
                engine,
                sink: Box::new(TracingSink),
                fault: None,
            }),
        }
    }

    /// Replace the destination of text printed by engine tools.
    pub fn set_message_sink(&self, sink: impl MessageSink + 'static) {
        self.lock().sink = Box::new(sink);
    }

    /// Process id of the engine, if this bridge spawned one.
    pub fn engine_pid(&self) -> Option<u32> {
        self.lock().engine.as_ref().and_then(EngineProcess::pid)
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().connection.is_none()
    }

    /// Run a tool with an opaque argument string.
    ///
    /// Returns the tool's return value, if it produced one.
    pub fn run(
        &self,
        tool: &str,
        args: &str,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<Option<String>> {
        let request = Request::Run {
            tool: tool.to_string(),
            args: args.to_string(),
        };
        self.call(&request, progress)
    }

    /// Run a tool with name/value parameters.
    pub fn run_with_parameters(
        &self,
        tool: &str,
        parameters: &[Parameter],
        progress: Option<ProgressFn<'_>>,
    ) -> Result<Option<String>> {
        let request = Request::RunStructured {
            tool: tool.to_string(),
            parameters: parameters.to_vec(),
        };
        self.call(&request, progress)
    }

    /// Check whether a tool namespace exists in the engine.
    pub fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let request = Request::CheckNamespace {
            namespace: namespace.to_string(),
        };
        match self.call(&request, None) {
            Ok(_) => Ok(true),
            Err(Error::NamespaceNotFound(message)) => {
                tracing::debug!(namespace, %message, "Namespace not found");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Clear the modeller logbook.
    pub fn clean_log(&self) -> Result<()> {
        self.call(&Request::CleanLog, None).map(|_| ())
    }

    /// Turn engine-side logbook writing on or off.
    pub fn set_logbook_enabled(&self, enabled: bool) -> Result<()> {
        let request = if enabled {
            Request::EnableLog
        } else {
            Request::DisableLog
        };
        self.call(&request, None).map(|_| ())
    }

    /// Ask the engine to exit and release both streams.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub fn dispose(&self) {
        let mut state = self.lock();
        let Some(connection) = state.connection.take() else {
            return;
        };

        let (reader, mut writer) = connection.into_parts();
        drop(reader);
        // The engine may already be gone
        if let Err(e) = Request::Terminate.write_to(&mut writer) {
            tracing::debug!(error = %e, "Failed to send termination signal");
        }
        drop(writer);

        if let Some(engine) = state.engine.take() {
            tracing::debug!(pid = ?engine.pid(), "Engine bridge disposed");
        }
    }

    fn call(&self, request: &Request, progress: Option<ProgressFn<'_>>) -> Result<Option<String>> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let Some(connection) = state.connection.as_mut() else {
            return Err(Error::Disposed);
        };
        if let Some(fault) = &state.fault {
            return Err(Error::Faulted(fault.clone()));
        }

        let result = connection.call(request, progress, state.sink.as_mut());
        if let Err(e) = &result {
            if e.is_fatal() {
                tracing::warn!(signal = %request.signal(), error = %e, "Engine connection failed");
                state.fault = Some(e.to_string());
            }
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ModellerController {
    fn drop(&mut self) {
        self.dispose();
    }
}
