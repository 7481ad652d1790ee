//! Signal vocabulary of the modeller bridge.
//!
//! Every frame starts with a 4-byte signal identifier followed by the
//! signal's payload, encoded with [`super::codec`].

use std::fmt;
use std::io::{Read, Write};

use crate::error::{Error, Result};

use super::codec::{read_f32, read_signal_id, read_string, write_f32, write_i32, write_string};

/// Signal identifiers shared with `ModellerBridge.py`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Signal {
    /// Engine finished booting.
    Ready = 0,
    /// Host requests shutdown; from the engine it means it panicked.
    Terminate = 1,
    /// Run a tool with an opaque argument string.
    StartOperation = 2,
    /// Tool finished without a return value.
    RunComplete = 3,
    /// Tool arguments rejected.
    ParameterError = 4,
    /// Tool raised during execution.
    RuntimeError = 5,
    /// Clear the modeller logbook.
    CleanLog = 6,
    /// Progress update in [0, 1].
    ProgressReport = 7,
    /// Tool finished with a return value.
    RunCompleteWithValue = 8,
    /// Ask whether a tool namespace exists.
    CheckNamespaceExists = 9,
    /// Tool namespace missing.
    NamespaceNotFound = 10,
    /// Text printed by the tool.
    PrintMessage = 11,
    DisableLog = 12,
    EnableLog = 13,
    /// Run a tool with name/value parameters.
    StartOperationStructured = 14,
}

impl Signal {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Signal::Ready => "Ready",
            Signal::Terminate => "Terminate",
            Signal::StartOperation => "StartOperation",
            Signal::RunComplete => "RunComplete",
            Signal::ParameterError => "ParameterError",
            Signal::RuntimeError => "RuntimeError",
            Signal::CleanLog => "CleanLog",
            Signal::ProgressReport => "ProgressReport",
            Signal::RunCompleteWithValue => "RunCompleteWithValue",
            Signal::CheckNamespaceExists => "CheckNamespaceExists",
            Signal::NamespaceNotFound => "NamespaceNotFound",
            Signal::PrintMessage => "PrintMessage",
            Signal::DisableLog => "DisableLog",
            Signal::EnableLog => "EnableLog",
            Signal::StartOperationStructured => "StartOperationStructured",
        }
    }
}

impl TryFrom<i32> for Signal {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self> {
        Ok(match code {
            0 => Signal::Ready,
            1 => Signal::Terminate,
            2 => Signal::StartOperation,
            3 => Signal::RunComplete,
            4 => Signal::ParameterError,
            5 => Signal::RuntimeError,
            6 => Signal::CleanLog,
            7 => Signal::ProgressReport,
            8 => Signal::RunCompleteWithValue,
            9 => Signal::CheckNamespaceExists,
            10 => Signal::NamespaceNotFound,
            11 => Signal::PrintMessage,
            12 => Signal::DisableLog,
            13 => Signal::EnableLog,
            14 => Signal::StartOperationStructured,
            other => return Err(Error::Protocol(other)),
        })
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}

/// A named parameter of a structured call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Message sent from the host to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Ask the engine to exit.
    Terminate,

    /// Run a tool with a single opaque argument string.
    Run { tool: String, args: String },

    /// Run a tool with structured parameters.
    ///
    /// On the wire the count is sent as a string, then every name, then
    /// every value.
    RunStructured {
        tool: String,
        parameters: Vec<Parameter>,
    },

    /// Check whether a tool namespace exists.
    CheckNamespace { namespace: String },

    CleanLog,
    DisableLog,
    EnableLog,
}

impl Request {
    pub fn signal(&self) -> Signal {
        match self {
            Request::Terminate => Signal::Terminate,
            Request::Run { .. } => Signal::StartOperation,
            Request::RunStructured { .. } => Signal::StartOperationStructured,
            Request::CheckNamespace { .. } => Signal::CheckNamespaceExists,
            Request::CleanLog => Signal::CleanLog,
            Request::DisableLog => Signal::DisableLog,
            Request::EnableLog => Signal::EnableLog,
        }
    }

    /// Encode and flush the request.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_i32(writer, self.signal().code())?;
        match self {
            Request::Run { tool, args } => {
                write_string(writer, tool)?;
                write_string(writer, args)?;
            }
            Request::RunStructured { tool, parameters } => {
                write_string(writer, tool)?;
                write_string(writer, &parameters.len().to_string())?;
                for parameter in parameters {
                    write_string(writer, &parameter.name)?;
                }
                for parameter in parameters {
                    write_string(writer, &parameter.value)?;
                }
            }
            Request::CheckNamespace { namespace } => write_string(writer, namespace)?,
            Request::Terminate | Request::CleanLog | Request::DisableLog | Request::EnableLog => {}
        }
        writer.flush()?;
        Ok(())
    }

    /// Decode the next request, engine side.
    ///
    /// Returns `Ok(None)` if the host closed the stream between frames.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Option<Self>> {
        let Some(code) = read_signal_id(reader)? else {
            return Ok(None);
        };
        let request = match Signal::try_from(code)? {
            Signal::Terminate => Request::Terminate,
            Signal::StartOperation => Request::Run {
                tool: read_string(reader)?,
                args: read_string(reader)?,
            },
            Signal::StartOperationStructured => {
                let tool = read_string(reader)?;
                let count = read_string(reader)?;
                let count: usize = count.trim().parse().map_err(|_| {
                    Error::MalformedFrame(format!("invalid parameter count '{count}'"))
                })?;
                let mut names = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    names.push(read_string(reader)?);
                }
                let mut parameters = Vec::with_capacity(names.len());
                for name in names {
                    parameters.push(Parameter {
                        name,
                        value: read_string(reader)?,
                    });
                }
                Request::RunStructured { tool, parameters }
            }
            Signal::CheckNamespaceExists => Request::CheckNamespace {
                namespace: read_string(reader)?,
            },
            Signal::CleanLog => Request::CleanLog,
            Signal::DisableLog => Request::DisableLog,
            Signal::EnableLog => Request::EnableLog,
            other => {
                return Err(Error::UnexpectedSignal {
                    signal: other.name(),
                    context: "from the host",
                });
            }
        };
        Ok(Some(request))
    }
}

/// Message sent from the engine to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Engine finished booting.
    Ready,

    /// Engine panicked and is shutting down.
    Terminated,

    /// Call succeeded without a value.
    RunComplete,

    /// Call succeeded with a value.
    RunCompleteWithValue(String),

    /// Arguments rejected by the tool.
    ParameterError(String),

    /// Tool raised during execution.
    RuntimeError(String),

    /// Tool namespace does not exist.
    NamespaceNotFound(String),

    /// Output printed by the tool. Not terminal.
    Print(String),

    /// Progress in [0, 1]. Not terminal.
    Progress(f32),
}

impl Event {
    pub fn signal(&self) -> Signal {
        match self {
            Event::Ready => Signal::Ready,
            Event::Terminated => Signal::Terminate,
            Event::RunComplete => Signal::RunComplete,
            Event::RunCompleteWithValue(_) => Signal::RunCompleteWithValue,
            Event::ParameterError(_) => Signal::ParameterError,
            Event::RuntimeError(_) => Signal::RuntimeError,
            Event::NamespaceNotFound(_) => Signal::NamespaceNotFound,
            Event::Print(_) => Signal::PrintMessage,
            Event::Progress(_) => Signal::ProgressReport,
        }
    }

    /// Decode the next event, host side.
    ///
    /// Returns `Ok(None)` if the engine closed the stream between frames.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Option<Self>> {
        let Some(code) = read_signal_id(reader)? else {
            return Ok(None);
        };
        let event = match Signal::try_from(code)? {
            Signal::Ready => Event::Ready,
            Signal::Terminate => Event::Terminated,
            Signal::RunComplete => Event::RunComplete,
            Signal::RunCompleteWithValue => Event::RunCompleteWithValue(read_string(reader)?),
            Signal::ParameterError => Event::ParameterError(read_string(reader)?),
            Signal::RuntimeError => Event::RuntimeError(read_string(reader)?),
            Signal::NamespaceNotFound => Event::NamespaceNotFound(read_string(reader)?),
            Signal::PrintMessage => Event::Print(read_string(reader)?),
            Signal::ProgressReport => Event::Progress(read_f32(reader)?),
            other => {
                return Err(Error::UnexpectedSignal {
                    signal: other.name(),
                    context: "from the engine",
                });
            }
        };
        Ok(Some(event))
    }

    /// Encode and flush the event, engine side.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_i32(writer, self.signal().code())?;
        match self {
            Event::RunCompleteWithValue(text)
            | Event::ParameterError(text)
            | Event::RuntimeError(text)
            | Event::NamespaceNotFound(text)
            | Event::Print(text) => write_string(writer, text)?,
            Event::Progress(value) => write_f32(writer, *value)?,
            Event::Ready | Event::Terminated | Event::RunComplete => {}
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::ipc::codec::read_i32;

    #[test]
    fn test_signal_codes() {
        assert_eq!(Signal::Ready.code(), 0);
        assert_eq!(Signal::CleanLog.code(), 6);
        assert_eq!(Signal::CheckNamespaceExists.code(), 9);
        assert_eq!(Signal::StartOperationStructured.code(), 14);
        for code in 0..=14 {
            assert_eq!(Signal::try_from(code).unwrap().code(), code);
        }
        assert!(matches!(Signal::try_from(15), Err(Error::Protocol(15))));
        assert!(matches!(Signal::try_from(-1), Err(Error::Protocol(-1))));
    }

    #[test]
    fn test_structured_request_sends_names_before_values() {
        let request = Request::RunStructured {
            tool: "tmg.export".to_string(),
            parameters: vec![
                Parameter::new("scenario_id", "1"),
                Parameter::new("target_folder", "/tmp/out"),
            ],
        };
        let mut buf = Vec::new();
        request.write_to(&mut buf).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_i32(&mut cursor).unwrap(), 14);
        let fields: Vec<String> = (0..6).map(|_| read_string(&mut cursor).unwrap()).collect();
        assert_eq!(
            fields,
            ["tmg.export", "2", "scenario_id", "target_folder", "1", "/tmp/out"]
        );
        assert_eq!(cursor.position() as usize, cursor.get_ref().len());
    }

    #[test]
    fn test_structured_request_with_no_parameters() {
        let request = Request::RunStructured {
            tool: "pkg.missing".to_string(),
            parameters: vec![],
        };
        let mut buf = Vec::new();
        request.write_to(&mut buf).unwrap();

        let decoded = Request::read_from(&mut Cursor::new(buf)).unwrap().unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_requests_decode_on_engine_side() {
        let requests = [
            Request::Run {
                tool: "pkg.tool".to_string(),
                args: "1 2 \"out.bin\" 3".to_string(),
            },
            Request::CheckNamespace {
                namespace: "pkg".to_string(),
            },
            Request::CleanLog,
            Request::Terminate,
        ];
        let mut buf = Vec::new();
        for request in &requests {
            request.write_to(&mut buf).unwrap();
        }

        let mut cursor = Cursor::new(buf);
        for expected in &requests {
            assert_eq!(&Request::read_from(&mut cursor).unwrap().unwrap(), expected);
        }
        assert!(Request::read_from(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_simple_request_layout() {
        let mut buf = Vec::new();
        Request::Run {
            tool: "a".to_string(),
            args: "bc".to_string(),
        }
        .write_to(&mut buf)
        .unwrap();

        let mut expected = 2i32.to_ne_bytes().to_vec();
        expected.extend_from_slice(&1i32.to_ne_bytes());
        expected.extend_from_slice(b"a");
        expected.extend_from_slice(&2i32.to_ne_bytes());
        expected.extend_from_slice(b"bc");
        assert_eq!(buf, expected);
    }

    #[test]
    fn test_host_signal_from_engine_is_rejected() {
        let buf = Signal::StartOperation.code().to_ne_bytes().to_vec();
        let err = Event::read_from(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, Error::UnexpectedSignal { .. }));
    }

    #[test]
    fn test_event_payloads() {
        let mut buf = Vec::new();
        Event::Progress(0.5).write_to(&mut buf).unwrap();
        Event::Print("hello\n".to_string()).write_to(&mut buf).unwrap();
        Event::RunCompleteWithValue("42".to_string())
            .write_to(&mut buf)
            .unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(Event::read_from(&mut cursor).unwrap(), Some(Event::Progress(0.5)));
        assert_eq!(
            Event::read_from(&mut cursor).unwrap(),
            Some(Event::Print("hello\n".to_string()))
        );
        assert_eq!(
            Event::read_from(&mut cursor).unwrap(),
            Some(Event::RunCompleteWithValue("42".to_string()))
        );
    }
}
