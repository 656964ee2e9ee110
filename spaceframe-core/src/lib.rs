//! Spaceframe Core
//!
//! This crate contains the transport- and engine-agnostic building blocks
//! of the spaceframe messaging library:
//! - Two-part messages on reference-counted chunks (`message`)
//! - The error taxonomy shared by every layer (`error`)
//! - Socket option storage and runtime option edits (`options`)
//! - The `transport://rest` address grammar (`addr`)
//! - The compressed subscription trie used by SUB-side filtering (`trie`)
//! - Reconnect backoff bookkeeping for reconnecting transports (`backoff`)

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod addr;
pub mod backoff;
pub mod error;
pub mod message;
pub mod options;
pub mod trie;

// A small prelude so downstream crates pick up the common vocabulary
// without locking the full module paths into their API.
pub mod prelude {
    pub use crate::addr::Address;
    pub use crate::backoff::ReconnectState;
    pub use crate::error::{Result, SpaceframeError};
    pub use crate::message::Message;
    pub use crate::options::{SocketOption, SocketOptions};
    pub use crate::trie::SubscriptionTrie;
}
