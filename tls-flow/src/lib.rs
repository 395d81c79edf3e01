//! A TLS client stage for data-flow pipelines.
//!
//! [`TlsDataFlow`] sits between an upstream consumer and an inner transport
//! flow: connecting it performs the TLS handshake against the remote peer,
//! after which outbound plaintext is ciphered and inbound ciphertext is
//! deciphered transparently. The record-layer engine itself is consumed as
//! an opaque [`Tunnel`]; this crate only drives it.

#![deny(missing_docs, unreachable_pub, unused_must_use)]
#![deny(clippy::all)]
#![forbid(unsafe_code)]

mod config;
mod data_flow;
mod tunnel;

pub use config::{TlsFlowConfig, TlsFlowConfigBuilder, TlsFlowConfigBuilderError};
pub use data_flow::TlsDataFlow;
pub use tunnel::{HandshakeAction, Tunnel};
