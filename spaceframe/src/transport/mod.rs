//! Transports.
//!
//! A transport turns endpoint addresses into pipes. The inproc transport is
//! the only one serviced in-process; stream transports (TCP, IPC, WS)
//! integrate externally through the same pipe contract: deliver whole
//! two-part messages, report per-direction readiness.

pub(crate) mod inproc;
