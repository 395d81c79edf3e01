//! Core abstractions for byte-stream data-flow pipelines.
//!
//! A *flow* is a bidirectional pipeline stage with a connect/read/write
//! contract; stages compose by forwarding to a next hop. This crate provides
//! the contract every stage implements ([`DataFlow`] / [`RemoteDataFlow`])
//! together with the runtime primitives stages share: owned byte [`Buffer`]s,
//! advisory [`Cancelable`] tokens, the single-threaded [`Runloop`] scheduler,
//! and the [`FlowStateMachine`] guarding operation orderings.

#![deny(missing_docs, unreachable_pub, unused_must_use)]
#![deny(clippy::all)]
#![forbid(unsafe_code)]

mod buffer;
mod cancelable;
mod endpoint;
mod error;
mod flow;
mod resolver;
mod runloop;
mod session;
mod state;

pub use buffer::Buffer;
pub use cancelable::Cancelable;
pub use endpoint::Endpoint;
pub use error::FlowError;
pub use flow::{DataFlow, DataHandler, DataType, EventHandler, RemoteDataFlow};
pub use resolver::{AddressPreference, ResolveHandler, Resolver};
pub use runloop::Runloop;
pub use session::Session;
pub use state::{FlowState, FlowStateMachine};
