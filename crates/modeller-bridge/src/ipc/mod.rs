//! Wire protocol between the host and the modeller engine.
//!
//! - **codec**: primitive framing (integers, floats, length-prefixed strings)
//! - **protocol**: signal identifiers and the messages built from them

pub mod codec;
pub mod protocol;

pub use protocol::{Event, Parameter, Request, Signal};
