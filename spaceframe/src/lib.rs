//! Spaceframe
//!
//! A scalability-protocol messaging library. Sockets speak one of the
//! classic patterns — PAIR, PUSH/PULL, PUB/SUB, REQ/REP, SURVEYOR/
//! RESPONDENT, BUS — over pluggable transports; the inproc transport is
//! built in, and stream transports plug in behind the pipe contract.
//!
//! # Example
//!
//! ```
//! use spaceframe::{Context, Message, Protocol};
//!
//! # fn main() -> spaceframe::Result<()> {
//! let ctx = Context::new()?;
//!
//! let server = ctx.socket(Protocol::Pair)?;
//! server.bind("inproc://greeter")?;
//!
//! let client = ctx.socket(Protocol::Pair)?;
//! client.connect("inproc://greeter")?;
//!
//! client.send(Message::from("hello"))?;
//! let msg = server.recv()?;
//! assert_eq!(msg.body().as_ref(), b"hello");
//!
//! server.close()?;
//! client.close()?;
//! ctx.terminate()?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

mod ctx;
mod pipe;
mod poll;
mod proto;
mod socket;
mod transport;

pub use ctx::Context;
pub use poll::{poll, PollItem};
pub use proto::{Protocol, Readiness};
pub use socket::{EndpointId, Socket};

pub use spaceframe_core::addr::Address;
pub use spaceframe_core::error::{Result, SpaceframeError};
pub use spaceframe_core::message::Message;
pub use spaceframe_core::options::{SocketOption, SocketOptions};

/// Common imports for spaceframe applications.
pub mod prelude {
    pub use crate::{poll, Context, Message, PollItem, Protocol, Socket};
    pub use spaceframe_core::error::{Result, SpaceframeError};
    pub use spaceframe_core::options::{SocketOption, SocketOptions};
}
