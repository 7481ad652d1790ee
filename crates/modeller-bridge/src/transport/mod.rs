//! Byte-stream transport between the host and the engine process.
//!
//! Platform-specific implementations:
//! - **LocalSocketTransport**: filesystem-path sockets (Linux, macOS, BSD)
//! - **NamedPipeTransport**: kernel named pipes (Windows)
//!
//! Both expose the same contract: two endpoint identifiers handed to the
//! engine on its command line, and a blocking `accept` yielding one stream
//! the host reads from and one it writes to.

use std::io::{Read, Write};
use std::path::Path;

use crate::error::Result;

#[cfg(unix)]
mod local_socket;
#[cfg(windows)]
mod named_pipe;

#[cfg(unix)]
pub use local_socket::LocalSocketTransport;
#[cfg(windows)]
pub use named_pipe::NamedPipeTransport;

/// The two connected halves of a bridge.
pub struct BridgeStreams {
    /// Engine → host.
    pub inbound: Box<dyn Read + Send>,
    /// Host → engine.
    pub outbound: Box<dyn Write + Send>,
}

/// Listening endpoints waiting for the engine to connect.
pub trait Transport: Send {
    /// Identifier of the endpoint the engine writes to.
    fn inbound_id(&self) -> String;

    /// Identifier of the endpoint the engine reads from.
    fn outbound_id(&self) -> String;

    /// Block until the engine has connected both endpoints.
    ///
    /// `check_alive` is polled while waiting where the platform allows it,
    /// so a child that dies before connecting surfaces as its error
    /// instead of an indefinite wait.
    fn accept(&mut self, check_alive: &mut dyn FnMut() -> Result<()>) -> Result<BridgeStreams>;
}

/// Create listening endpoints using the platform default.
///
/// `endpoint_dir` is where path-based endpoints are created; it is ignored
/// by kernel-named transports.
pub fn create_transport(endpoint_dir: Option<&Path>) -> Result<Box<dyn Transport>> {
    #[cfg(unix)]
    {
        let transport = LocalSocketTransport::create(endpoint_dir)?;
        Ok(Box::new(transport))
    }

    #[cfg(windows)]
    {
        let _ = endpoint_dir;
        let transport = NamedPipeTransport::create()?;
        Ok(Box::new(transport))
    }
}

/// Connect to a host's endpoints from the engine side.
///
/// Returns the stream the engine writes to and the one it reads from.
pub fn connect_endpoints(
    inbound_id: &str,
    outbound_id: &str,
) -> Result<(Box<dyn Write + Send>, Box<dyn Read + Send>)> {
    #[cfg(unix)]
    {
        local_socket::connect(inbound_id, outbound_id)
    }

    #[cfg(windows)]
    {
        named_pipe::connect(inbound_id, outbound_id)
    }
}
