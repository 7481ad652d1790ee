//! Synchronous bridge to an Emme Modeller engine process.
//!
//! This crate provides:
//! - Wire codec and signal vocabulary shared with `ModellerBridge.py`
//! - Platform transports (path sockets, named pipes)
//! - Engine process discovery and startup
//! - The blocking call protocol with progress and print callbacks

pub mod connection;
pub mod controller;
pub mod error;
pub mod ipc;
pub mod sink;
pub mod supervisor;
pub mod transport;

pub use connection::{Connection, ProgressFn};
pub use controller::ModellerController;
pub use error::{Error, ErrorKind, Result};
pub use ipc::{Event, Parameter, Request, Signal};
pub use sink::{MessageSink, TracingSink};
pub use supervisor::{DisplayWrapper, EMME_PATH_VAR, EngineConfig, EngineProcess};
pub use transport::{BridgeStreams, Transport, connect_endpoints, create_transport};
