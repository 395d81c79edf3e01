use std::rc::Rc;

use crate::{Buffer, Cancelable, Endpoint, FlowError, FlowStateMachine, Runloop, Session};

/// Kind of payload a flow carries.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Stream,
    Packet,
}

/// Completion callback for operations that deliver no data.
pub type EventHandler = Box<dyn FnOnce(Result<(), FlowError>)>;

/// Completion callback for reads.
pub type DataHandler = Box<dyn FnOnce(Result<Buffer, FlowError>)>;

/// A bidirectional byte-stream pipeline stage.
///
/// Contract obligations, binding on every implementation:
///
/// - At most one read and one write may be outstanding at a time; arming a
///   second of either kind before the first completes is a caller bug.
/// - Completions are delivered through the stage's [`Runloop`], never inline
///   with the arming call.
/// - The returned [`Cancelable`] only suppresses delivery of the handler; it
///   does not abort the underlying I/O.
/// - Handlers are invoked exactly once, or never if canceled.
pub trait DataFlow {
    /// Arms a read. `buffer` is a capacity hint; the stage may ignore it and
    /// deliver a buffer of its own. A successful read delivers at least one
    /// byte.
    fn read(&self, buffer: Buffer, handler: DataHandler) -> Cancelable;

    /// Arms a write of `buffer`. Completion means the stage has accepted the
    /// bytes and handed them to its next hop, not that the peer received
    /// them.
    fn write(&self, buffer: Buffer, handler: EventHandler) -> Cancelable;

    /// Signals that no further bytes will be written.
    fn close_write(&self, handler: EventHandler) -> Cancelable;

    /// Snapshot of the stage's state machine.
    fn state_machine(&self) -> FlowStateMachine;

    /// Kind of payload the stage carries.
    fn data_type(&self) -> DataType;

    /// The session this stage serves.
    fn session(&self) -> Rc<Session>;

    /// The runloop all completions are delivered on.
    fn runloop(&self) -> Runloop;
}

/// A [`DataFlow`] that reaches a remote peer and must be connected before
/// any data operation.
pub trait RemoteDataFlow: DataFlow {
    /// Initiates the connection to `endpoint`. Exactly one completion:
    /// success once the stage is established, else the first error.
    fn connect(&self, endpoint: Rc<Endpoint>, handler: EventHandler) -> Cancelable;

    /// The endpoint a connect was issued for, if any.
    fn connecting_to(&self) -> Option<Rc<Endpoint>>;
}
