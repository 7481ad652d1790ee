//! Synchronous call protocol over one pair of engine streams.
//!
//! A [`Connection`] writes one request, then reads events until a terminal
//! one arrives. Progress and print events are dispatched to callbacks on
//! the way. It holds no lock itself; callers serialize access (see
//! [`crate::ModellerController`]).

use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::ipc::{Event, Request};
use crate::sink::MessageSink;

/// Progress callback receiving values in [0, 1].
pub type ProgressFn<'a> = &'a mut dyn FnMut(f32);

/// The host's ends of the two engine streams.
pub struct Connection<R, W> {
    reader: R,
    writer: W,
}

impl<R: Read, W: Write> Connection<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Block until the engine reports it has finished booting.
    ///
    /// Any other signal is fatal. A closed stream at this point usually
    /// means the engine could not obtain a license.
    pub fn wait_for_ready(&mut self) -> Result<()> {
        match Event::read_from(&mut self.reader)? {
            Some(Event::Ready) => {
                tracing::debug!("Engine reported ready");
                Ok(())
            }
            Some(other) => Err(Error::UnexpectedSignal {
                signal: other.signal().name(),
                context: "while waiting for the engine to start",
            }),
            None => Err(Error::License),
        }
    }

    /// Write a request and flush it.
    pub fn send(&mut self, request: &Request) -> Result<()> {
        tracing::trace!(signal = %request.signal(), "Sending request");
        request.write_to(&mut self.writer)
    }

    /// Send a request and wait for its terminal response.
    ///
    /// Returns the value of `RunCompleteWithValue`, or `None` for a plain
    /// `RunComplete`.
    pub fn call(
        &mut self,
        request: &Request,
        progress: Option<ProgressFn<'_>>,
        sink: &mut dyn MessageSink,
    ) -> Result<Option<String>> {
        self.send(request)?;
        self.receive_response(progress, sink)
    }

    /// Read events until a terminal one arrives.
    pub fn receive_response(
        &mut self,
        mut progress: Option<ProgressFn<'_>>,
        sink: &mut dyn MessageSink,
    ) -> Result<Option<String>> {
        loop {
            let Some(event) = Event::read_from(&mut self.reader)? else {
                return Err(Error::Disconnected);
            };
            tracing::trace!(signal = %event.signal(), "Received event");

            match event {
                Event::Ready => {
                    // Duplicate startup message
                    continue;
                }
                Event::RunComplete => return Ok(None),
                Event::RunCompleteWithValue(value) => return Ok(Some(value)),
                Event::Terminated => return Err(Error::EngineTerminated),
                Event::ParameterError(message) => return Err(Error::Parameter(message)),
                Event::RuntimeError(message) => return Err(Error::Runtime(message)),
                Event::NamespaceNotFound(message) => {
                    return Err(Error::NamespaceNotFound(message));
                }
                Event::Print(text) => sink.print(&text),
                Event::Progress(value) => {
                    if let Some(callback) = progress.as_deref_mut() {
                        callback(value);
                    }
                }
            }
        }
    }

    /// Split into the inbound reader and the outbound writer.
    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}
