//! Filesystem-path socket transport.
//!
//! Socket path format: `{endpoint_dir}/modeller-{uuid}/{inbound,outbound}.sock`

use std::io::{self, BufReader, BufWriter, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use uuid::Uuid;

use crate::error::Result;

use super::{BridgeStreams, Transport};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct LocalSocketTransport {
    dir: PathBuf,
    inbound_path: PathBuf,
    outbound_path: PathBuf,
    inbound: Option<UnixListener>,
    outbound: Option<UnixListener>,
}

impl LocalSocketTransport {
    /// Bind both listeners in a fresh per-connection directory.
    pub fn create(endpoint_dir: Option<&Path>) -> Result<Self> {
        let base = endpoint_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let dir = base.join(format!("modeller-{}", Uuid::new_v4().simple()));
        std::fs::create_dir_all(&dir)?;

        tracing::debug!(transport_type = "local-socket", dir = %dir.display(), "Creating bridge transport");

        let inbound_path = dir.join("inbound.sock");
        let outbound_path = dir.join("outbound.sock");

        // A failed bind drops `transport`, which removes the directory
        let mut transport = Self {
            dir,
            inbound_path,
            outbound_path,
            inbound: None,
            outbound: None,
        };
        transport.inbound = Some(bind(&transport.inbound_path)?);
        transport.outbound = Some(bind(&transport.outbound_path)?);
        Ok(transport)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cleanup(&mut self) -> io::Result<()> {
        self.inbound = None;
        self.outbound = None;
        if self.dir.exists() {
            tracing::debug!(dir = %self.dir.display(), "Cleaning up socket directory");
            std::fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

fn bind(path: &Path) -> Result<UnixListener> {
    let listener = UnixListener::bind(path)?;
    listener.set_nonblocking(true)?;
    tracing::trace!(path = %path.display(), "Bound socket");
    Ok(listener)
}

fn accept_one(
    listener: &UnixListener,
    check_alive: &mut dyn FnMut() -> Result<()>,
) -> Result<UnixStream> {
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                return Ok(stream);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                check_alive()?;
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
}

impl Transport for LocalSocketTransport {
    fn inbound_id(&self) -> String {
        self.inbound_path.display().to_string()
    }

    fn outbound_id(&self) -> String {
        self.outbound_path.display().to_string()
    }

    fn accept(&mut self, check_alive: &mut dyn FnMut() -> Result<()>) -> Result<BridgeStreams> {
        let (Some(inbound), Some(outbound)) = (self.inbound.take(), self.outbound.take()) else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport endpoints were already accepted",
            )
            .into());
        };

        tracing::trace!("Waiting for engine connection");
        let inbound = accept_one(&inbound, check_alive)?;
        let outbound = accept_one(&outbound, check_alive)?;
        tracing::trace!("Engine connected");

        Ok(BridgeStreams {
            inbound: Box::new(BufReader::new(inbound)),
            outbound: Box::new(BufWriter::new(outbound)),
        })
    }
}

impl Drop for LocalSocketTransport {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            tracing::warn!(error = %e, "Failed to cleanup socket directory");
        }
    }
}

/// Engine side: connect to both socket paths.
pub(super) fn connect(
    inbound_id: &str,
    outbound_id: &str,
) -> Result<(Box<dyn Write + Send>, Box<dyn Read + Send>)> {
    let to_host = UnixStream::connect(inbound_id)?;
    let from_host = UnixStream::connect(outbound_id)?;
    Ok((
        Box::new(BufWriter::new(to_host)),
        Box::new(BufReader::new(from_host)),
    ))
}
