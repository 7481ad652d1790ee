//! Error types for modeller-bridge.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for modeller-bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The bridge could not be established. Nothing was connected.
    Setup,
    /// The byte streams closed or carried a malformed frame.
    Connectivity,
    /// The engine sent something this host does not understand.
    Protocol,
    /// The engine rejected the arguments of a call.
    Caller,
    /// The remote operation itself failed.
    Engine,
    /// The bridge was used after `dispose()`.
    Disposed,
}

/// Errors that can occur while driving the modeller engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Project file missing or not an `.emp` file.
    #[error("Project file '{}' is not an existing Emme project file (*.emp)", .0.display())]
    ProjectFile(PathBuf),

    /// Required environment variable unset or blank.
    #[error("Environment variable {0} is not set")]
    MissingEnvironment(&'static str),

    /// Installation directory does not exist.
    #[error("Unable to find an Emme installation in the directory '{}'", .0.display())]
    InstallationNotFound(PathBuf),

    /// No scripting runtime inside the installation.
    #[error("Unable to find a version of python inside of '{}'", .0.display())]
    RuntimeNotFound(PathBuf),

    /// The engine process could not be started or died while connecting.
    #[error("Unable to create a bridge to Emme for '{}': {message}", project.display())]
    Spawn { project: PathBuf, message: String },

    /// Stream closed before the engine reported ready.
    #[error("Unable to communicate with Emme, the engine closed the connection during startup")]
    License,

    /// Stream closed while a signal was expected.
    #[error("Connection with Emme ended while waiting for data")]
    Disconnected,

    /// A frame could not be decoded (negative length, bad UTF-8, ...).
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// IO error on one of the streams.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unknown signal identifier on the wire.
    #[error("Unknown message passed back from the modeller bridge, signal number {0}")]
    Protocol(i32),

    /// A known signal arrived where it is not allowed.
    #[error("Unexpected {signal} signal {context}")]
    UnexpectedSignal {
        signal: &'static str,
        context: &'static str,
    },

    /// The engine panicked and shut itself down.
    #[error("The modeller bridge panicked and unexpectedly shut down")]
    EngineTerminated,

    /// The engine could not match the arguments to the tool.
    #[error("Parameter error: {0}")]
    Parameter(String),

    /// The tool raised while executing.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// The tool namespace does not exist.
    #[error("Tool not found: {0}")]
    NamespaceNotFound(String),

    /// The bridge has already been disposed.
    #[error("The Emme bridge was invoked even though it has already been disposed")]
    Disposed,

    /// An earlier call left the connection unusable.
    #[error("The Emme bridge is no longer usable: {0}")]
    Faulted(String),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ProjectFile(_)
            | Error::MissingEnvironment(_)
            | Error::InstallationNotFound(_)
            | Error::RuntimeNotFound(_)
            | Error::Spawn { .. } => ErrorKind::Setup,
            Error::License
            | Error::Disconnected
            | Error::MalformedFrame(_)
            | Error::Io(_)
            | Error::Faulted(_) => ErrorKind::Connectivity,
            Error::Protocol(_) | Error::UnexpectedSignal { .. } | Error::EngineTerminated => {
                ErrorKind::Protocol
            }
            Error::Parameter(_) => ErrorKind::Caller,
            Error::Runtime(_) | Error::NamespaceNotFound(_) => ErrorKind::Engine,
            Error::Disposed => ErrorKind::Disposed,
        }
    }

    /// Whether the connection must be considered unusable after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connectivity | ErrorKind::Protocol
        )
    }

    /// The engine's own message, for errors reported by the engine.
    pub fn engine_message(&self) -> Option<&str> {
        match self {
            Error::Parameter(m) | Error::Runtime(m) | Error::NamespaceNotFound(m) => Some(m),
            _ => None,
        }
    }

    /// Render the error with a recovery hint where one is known.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::License | Error::Disconnected => Some(
                "Make sure you have an active Emme license. If the problem persists, rebooting has helped fix this issue.",
            ),
            Error::MissingEnvironment(_) => {
                Some("Make sure EMMEPATH is on the system environment variables.")
            }
            Error::InstallationNotFound(_) => {
                Some("If you have just installed Emme, reboot your system.")
            }
            Error::Protocol(_) | Error::UnexpectedSignal { .. } => Some(
                "The host and ModellerBridge.py versions probably do not match.",
            ),
            _ => None,
        };
        match hint {
            Some(hint) => format!("{self}\n  hint: {hint}"),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(Error::Parameter("x".into()).kind(), ErrorKind::Caller);
        assert_eq!(Error::Runtime("x".into()).kind(), ErrorKind::Engine);
        assert_eq!(Error::NamespaceNotFound("x".into()).kind(), ErrorKind::Engine);
        assert_eq!(Error::Protocol(42).kind(), ErrorKind::Protocol);
        assert_eq!(Error::Disconnected.kind(), ErrorKind::Connectivity);
        assert_eq!(Error::Disposed.kind(), ErrorKind::Disposed);
        assert_eq!(
            Error::MissingEnvironment("EMMEPATH").kind(),
            ErrorKind::Setup
        );
    }

    #[test]
    fn test_fatal_errors() {
        assert!(Error::EngineTerminated.is_fatal());
        assert!(Error::MalformedFrame("negative length".into()).is_fatal());
        assert!(!Error::Parameter("bad".into()).is_fatal());
        assert!(!Error::Runtime("boom".into()).is_fatal());
        assert!(!Error::Disposed.is_fatal());
    }

    #[test]
    fn test_engine_message_is_verbatim() {
        let err = Error::NamespaceNotFound("pkg.missing not found".into());
        assert_eq!(err.engine_message(), Some("pkg.missing not found"));
        assert_eq!(Error::License.engine_message(), None);
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::Runtime("division by zero".into()).to_string(),
            "Runtime error: division by zero"
        );
        assert_eq!(
            Error::MissingEnvironment("EMMEPATH").to_string(),
            "Environment variable EMMEPATH is not set"
        );
        assert_eq!(
            Error::UnexpectedSignal {
                signal: "Progress",
                context: "during startup",
            }
            .to_string(),
            "Unexpected Progress signal during startup"
        );
    }

    #[test]
    fn test_hint() {
        let rendered = Error::License.with_hint();
        assert!(rendered.contains("hint:"));
        assert!(rendered.contains("license"));
        assert_eq!(Error::Disposed.with_hint(), Error::Disposed.to_string());
    }
}
