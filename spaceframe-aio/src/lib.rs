//! Spaceframe AIO
//!
//! The asynchronous I/O engine underneath the socket layer:
//! - A cross-thread wakeup flag (`wakeup`)
//! - A readiness poller over OS handles (`poller`)
//! - An ordered monotonic timer set (`timers`)
//! - An event-driven state-machine framework with parent/child
//!   shutdown composition (`fsm`)
//! - Worker threads driving poll loop, timers and machine dispatch
//!   (`worker`), grouped into a fixed pool (`pool`)
//!
//! Every state machine is pinned to one worker for its whole life; all of
//! its events are delivered in order on that worker's thread. Handlers run
//! synchronously and must never block.

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod fsm;
pub mod poller;
pub mod pool;
pub mod timers;
pub mod wakeup;
pub mod worker;

pub use fsm::{Fsm, FsmCtx, FsmEvent, FsmId, Lifecycle, Progress, StateMachine, TimerToken};
pub use poller::{IoEvent, PollKey, Poller};
pub use pool::Pool;
pub use timers::TimerSet;
pub use wakeup::WakeFlag;
