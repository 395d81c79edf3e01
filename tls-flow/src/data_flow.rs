use std::{cell::RefCell, mem, rc::Rc};

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

use flow_core::{
    Buffer, Cancelable, DataFlow, DataHandler, DataType, Endpoint, EventHandler, FlowError,
    FlowState, FlowStateMachine, RemoteDataFlow, Runloop, Session,
};

use crate::{
    config::TlsFlowConfig,
    tunnel::{HandshakeAction, Tunnel},
};

/// A user-handler slot. Arming and clearing are single state transitions;
/// `Delivering` marks a handler already moved into a posted closure, so a
/// completion can never be delivered twice.
enum Slot<H> {
    Idle,
    Armed(H),
    Delivering,
}

impl<H> Slot<H> {
    fn arm(&mut self, handler: H) {
        debug_assert!(
            matches!(self, Self::Idle),
            "operation already outstanding"
        );
        *self = Self::Armed(handler);
    }

    fn is_armed(&self) -> bool {
        matches!(self, Self::Armed(_))
    }

    /// Takes the armed handler for a posted delivery, leaving `Delivering`.
    fn begin_delivery(&mut self) -> Option<H> {
        match mem::replace(self, Self::Delivering) {
            Self::Armed(handler) => Some(handler),
            other => {
                *self = other;
                None
            }
        }
    }

    fn finish_delivery(&mut self) {
        *self = Self::Idle;
    }

    /// Takes the armed handler for an immediate invocation, leaving `Idle`.
    fn take(&mut self) -> Option<H> {
        match mem::replace(self, Self::Idle) {
            Self::Armed(handler) => Some(handler),
            other => {
                *self = other;
                None
            }
        }
    }
}

struct Shared {
    session: Rc<Session>,
    config: TlsFlowConfig,
    tunnel: Box<dyn Tunnel>,
    next_hop: Rc<dyn RemoteDataFlow>,
    runloop: Runloop,
    state_machine: FlowStateMachine,
    connect_to: Option<Rc<Endpoint>>,

    connect_handler: Option<EventHandler>,
    read_slot: Slot<DataHandler>,
    write_slot: Slot<EventHandler>,

    connect_cancelable: Cancelable,
    read_cancelable: Cancelable,
    write_cancelable: Cancelable,
    next_read_cancelable: Cancelable,
    next_write_cancelable: Cancelable,

    pending_error: Option<FlowError>,
    error_reported: bool,
}

/// A TLS client stage in a data-flow pipeline.
///
/// Connecting performs the TLS handshake through the inner transport flow;
/// afterwards outbound plaintext is ciphered and inbound ciphertext is
/// deciphered transparently, with the engine driven by a single reactor that
/// keeps at most one inner read and one inner write in flight.
///
/// Dropping the flow cancels every outstanding operation; in-flight
/// completions observe their tokens as canceled and are absorbed silently.
pub struct TlsDataFlow {
    shared: Rc<RefCell<Shared>>,
}

impl TlsDataFlow {
    /// Creates a TLS stage over `next_hop` with the default configuration.
    pub fn new(
        session: Rc<Session>,
        tunnel: Box<dyn Tunnel>,
        next_hop: impl RemoteDataFlow + 'static,
    ) -> Self {
        Self::with_config(session, TlsFlowConfig::default(), tunnel, next_hop)
    }

    /// Creates a TLS stage over `next_hop`.
    pub fn with_config(
        session: Rc<Session>,
        config: TlsFlowConfig,
        tunnel: Box<dyn Tunnel>,
        next_hop: impl RemoteDataFlow + 'static,
    ) -> Self {
        let runloop = next_hop.runloop();
        Self {
            shared: Rc::new(RefCell::new(Shared {
                session,
                config,
                tunnel,
                next_hop: Rc::new(next_hop),
                runloop,
                state_machine: FlowStateMachine::new(),
                connect_to: None,
                connect_handler: None,
                read_slot: Slot::Idle,
                write_slot: Slot::Idle,
                connect_cancelable: Cancelable::new(),
                read_cancelable: Cancelable::new(),
                write_cancelable: Cancelable::new(),
                next_read_cancelable: Cancelable::new(),
                next_write_cancelable: Cancelable::new(),
                pending_error: None,
                error_reported: false,
            })),
        }
    }

    /// The inner transport flow ciphertext travels over.
    pub fn next_hop(&self) -> Rc<dyn RemoteDataFlow> {
        self.shared.borrow().next_hop.clone()
    }
}

impl DataFlow for TlsDataFlow {
    fn read(&self, buffer: Buffer, handler: DataHandler) -> Cancelable {
        // Plaintext is produced by the tunnel; the hint buffer is unused.
        let _ = buffer;
        let cancelable = Cancelable::new();
        {
            let mut s = self.shared.borrow_mut();
            debug_assert!(!s.error_reported, "read after error was reported");
            s.read_cancelable = cancelable.clone();
            s.read_slot.arm(handler);
            s.state_machine.read_begin();
        }
        process(&self.shared);
        cancelable
    }

    fn write(&self, buffer: Buffer, handler: EventHandler) -> Cancelable {
        let cancelable = Cancelable::new();
        {
            let mut s = self.shared.borrow_mut();
            debug_assert!(!s.error_reported, "write after error was reported");
            s.write_cancelable = cancelable.clone();
            s.write_slot.arm(handler);
            s.state_machine.write_begin();
            s.tunnel.write_plaintext(buffer);
        }
        process(&self.shared);
        cancelable
    }

    fn close_write(&self, handler: EventHandler) -> Cancelable {
        // A TLS half-close needs a shutdown capability the tunnel does not
        // expose; the handler is dropped and the current write token
        // returned.
        drop(handler);
        self.shared.borrow().write_cancelable.clone()
    }

    fn state_machine(&self) -> FlowStateMachine {
        self.shared.borrow().state_machine
    }

    fn data_type(&self) -> DataType {
        DataType::Stream
    }

    fn session(&self) -> Rc<Session> {
        self.shared.borrow().session.clone()
    }

    fn runloop(&self) -> Runloop {
        self.shared.borrow().runloop.clone()
    }
}

impl RemoteDataFlow for TlsDataFlow {
    fn connect(&self, endpoint: Rc<Endpoint>, handler: EventHandler) -> Cancelable {
        let cancelable = Cancelable::new();
        let next_hop = {
            let mut s = self.shared.borrow_mut();
            s.connect_cancelable = cancelable.clone();
            s.connect_to = Some(endpoint.clone());
            let domain = s
                .config
                .server_name()
                .unwrap_or_else(|| endpoint.host())
                .to_owned();
            s.tunnel.set_domain(&domain);
            s.connect_handler = Some(handler);
            s.state_machine.connect_begin();
            s.next_hop.clone()
        };
        #[cfg(feature = "tracing")]
        debug!(
            "[{}] connecting to {endpoint}",
            self.shared.borrow().session.id()
        );
        let weak = Rc::downgrade(&self.shared);
        let token = cancelable.clone();
        next_hop.connect(
            endpoint,
            Box::new(move |result| {
                let Some(shared) = weak.upgrade() else { return };
                if token.canceled() {
                    return;
                }
                match result {
                    Ok(()) => drive_handshake(&shared),
                    Err(err) => fail_handshake(&shared, err),
                }
            }),
        );
        cancelable
    }

    fn connecting_to(&self) -> Option<Rc<Endpoint>> {
        self.shared.borrow().connect_to.clone()
    }
}

impl Drop for TlsDataFlow {
    fn drop(&mut self) {
        let mut s = self.shared.borrow_mut();
        s.read_cancelable.cancel();
        s.write_cancelable.cancel();
        s.connect_cancelable.cancel();
        s.next_read_cancelable.cancel();
        s.next_write_cancelable.cancel();
        if s.state_machine.state() != FlowState::Errored {
            s.state_machine.close();
        }
    }
}

/// One step of the handshake driver. Re-entered from every inner completion
/// until the tunnel reports `Success` with no ciphertext left to send.
fn drive_handshake(shared: &Rc<RefCell<Shared>>) {
    let action = shared.borrow_mut().tunnel.handshake();
    match action {
        HandshakeAction::Success => {
            let ciphertext = shared.borrow_mut().tunnel.read_ciphertext();
            if ciphertext.is_empty() {
                let handler = {
                    let mut s = shared.borrow_mut();
                    s.state_machine.connected();
                    s.connect_handler.take()
                };
                #[cfg(feature = "tracing")]
                debug!("handshake complete");
                if let Some(handler) = handler {
                    handler(Ok(()));
                }
            } else {
                send_handshake_ciphertext(shared, ciphertext);
            }
        }
        HandshakeAction::WantIo => {
            let ciphertext = shared.borrow_mut().tunnel.read_ciphertext();
            if ciphertext.is_empty() {
                recv_handshake_ciphertext(shared);
            } else {
                send_handshake_ciphertext(shared, ciphertext);
            }
        }
        HandshakeAction::Error => fail_handshake(shared, FlowError::Tls),
    }
}

fn send_handshake_ciphertext(shared: &Rc<RefCell<Shared>>, ciphertext: Buffer) {
    #[cfg(feature = "tracing")]
    trace!("sending {} tls bytes", ciphertext.len());
    let (next_hop, token) = {
        let s = shared.borrow();
        (s.next_hop.clone(), s.connect_cancelable.clone())
    };
    let weak = Rc::downgrade(shared);
    let cancelable = next_hop.write(
        ciphertext,
        Box::new(move |result| {
            let Some(shared) = weak.upgrade() else { return };
            if token.canceled() {
                return;
            }
            match result {
                Ok(()) => drive_handshake(&shared),
                Err(err) => fail_handshake(&shared, err),
            }
        }),
    );
    shared.borrow_mut().next_write_cancelable = cancelable;
}

fn recv_handshake_ciphertext(shared: &Rc<RefCell<Shared>>) {
    let (next_hop, token, chunk) = {
        let s = shared.borrow();
        (
            s.next_hop.clone(),
            s.connect_cancelable.clone(),
            s.config.read_chunk_size(),
        )
    };
    let weak = Rc::downgrade(shared);
    let cancelable = next_hop.read(
        Buffer::with_capacity(chunk),
        Box::new(move |result| {
            let Some(shared) = weak.upgrade() else { return };
            if token.canceled() {
                return;
            }
            match result {
                Ok(ciphertext) => {
                    #[cfg(feature = "tracing")]
                    trace!("received {} tls bytes", ciphertext.len());
                    let engine_failed = {
                        let mut s = shared.borrow_mut();
                        s.tunnel.write_ciphertext(ciphertext);
                        s.tunnel.errored()
                    };
                    if engine_failed {
                        fail_handshake(&shared, FlowError::Tls);
                    } else {
                        drive_handshake(&shared);
                    }
                }
                Err(err) => fail_handshake(&shared, err),
            }
        }),
    );
    shared.borrow_mut().next_read_cancelable = cancelable;
}

fn fail_handshake(shared: &Rc<RefCell<Shared>>, err: FlowError) {
    let handler = {
        let mut s = shared.borrow_mut();
        s.state_machine.errored();
        s.connect_handler.take()
    };
    #[cfg(feature = "tracing")]
    debug!("handshake failed: {err}");
    if let Some(handler) = handler {
        handler(Err(err));
    }
}

/// The steady-state pump. Invoked after every state change: user call, inner
/// read completion, inner write completion.
fn process(shared: &Rc<RefCell<Shared>>) {
    let pending = {
        let s = shared.borrow();
        if s.error_reported {
            return;
        }
        s.pending_error.clone()
    };
    if let Some(err) = pending {
        deliver_pending_error(shared, err);
        return;
    }
    try_read(shared);
    try_write(shared);
}

enum ErrorSide {
    Read(DataHandler),
    Write(EventHandler),
}

/// Surfaces an error observed while no user handler was armed to receive it.
/// Latches `error_reported` once a handler accepts it; delivery is deferred
/// through the runloop because this runs inline with the user call that armed
/// the handler.
fn deliver_pending_error(shared: &Rc<RefCell<Shared>>, err: FlowError) {
    let delivery = {
        let mut s = shared.borrow_mut();
        if let Some(handler) = s.read_slot.take() {
            Some((ErrorSide::Read(handler), s.read_cancelable.clone()))
        } else if let Some(handler) = s.write_slot.take() {
            Some((ErrorSide::Write(handler), s.write_cancelable.clone()))
        } else {
            None
        }
    };
    let Some((side, token)) = delivery else { return };
    let runloop = {
        let mut s = shared.borrow_mut();
        s.error_reported = true;
        s.runloop.clone()
    };
    runloop.post(move || {
        if token.canceled() {
            return;
        }
        match side {
            ErrorSide::Read(handler) => handler(Err(err)),
            ErrorSide::Write(handler) => handler(Err(err)),
        }
    });
}

fn try_read(shared: &Rc<RefCell<Shared>>) {
    enum Next {
        Deliver {
            handler: DataHandler,
            plaintext: Buffer,
            need_input: bool,
        },
        ReadNextHop,
        Idle,
    }

    let next = {
        let mut s = shared.borrow_mut();
        if s.read_slot.is_armed() {
            if s.tunnel.has_plaintext() {
                match s.read_slot.begin_delivery() {
                    Some(handler) => Next::Deliver {
                        handler,
                        plaintext: s.tunnel.read_plaintext(),
                        need_input: s.tunnel.need_cipher_input(),
                    },
                    None => Next::Idle,
                }
            } else {
                Next::ReadNextHop
            }
        } else if s.tunnel.need_cipher_input() {
            // No reader armed, but an in-progress record needs draining.
            Next::ReadNextHop
        } else {
            Next::Idle
        }
    };

    match next {
        Next::Deliver {
            handler,
            plaintext,
            need_input,
        } => {
            post_read_delivery(shared, handler, plaintext);
            if need_input {
                try_read_next_hop(shared);
            }
        }
        Next::ReadNextHop => try_read_next_hop(shared),
        Next::Idle => {}
    }
}

fn try_write(shared: &Rc<RefCell<Shared>>) {
    enum Next {
        Complete(EventHandler),
        Flush,
        Idle,
    }

    let next = {
        let mut s = shared.borrow_mut();
        if s.tunnel.finished_writing_ciphertext() {
            match s.write_slot.begin_delivery() {
                Some(handler) => Next::Complete(handler),
                None => Next::Idle,
            }
        } else {
            Next::Flush
        }
    };

    match next {
        Next::Complete(handler) => post_write_completion(shared, handler),
        Next::Flush => try_write_next_hop(shared),
        Next::Idle => {}
    }
}

fn post_read_delivery(shared: &Rc<RefCell<Shared>>, handler: DataHandler, plaintext: Buffer) {
    #[cfg(feature = "tracing")]
    trace!("delivering {} plaintext bytes", plaintext.len());
    let weak = Rc::downgrade(shared);
    let (token, runloop) = {
        let s = shared.borrow();
        (s.read_cancelable.clone(), s.runloop.clone())
    };
    runloop.post(move || {
        let Some(shared) = weak.upgrade() else { return };
        if token.canceled() {
            shared.borrow_mut().read_slot.finish_delivery();
            return;
        }
        {
            let mut s = shared.borrow_mut();
            s.read_slot.finish_delivery();
            s.state_machine.read_end();
        }
        handler(Ok(plaintext));
    });
}

fn post_write_completion(shared: &Rc<RefCell<Shared>>, handler: EventHandler) {
    let weak = Rc::downgrade(shared);
    let (token, runloop) = {
        let s = shared.borrow();
        (s.write_cancelable.clone(), s.runloop.clone())
    };
    runloop.post(move || {
        let Some(shared) = weak.upgrade() else { return };
        if token.canceled() {
            shared.borrow_mut().write_slot.finish_delivery();
            return;
        }
        {
            let mut s = shared.borrow_mut();
            s.write_slot.finish_delivery();
            s.state_machine.write_end();
        }
        handler(Ok(()));
    });
}

fn try_read_next_hop(shared: &Rc<RefCell<Shared>>) {
    let (next_hop, token, chunk) = {
        let s = shared.borrow();
        if s.next_hop.state_machine().is_reading() {
            return;
        }
        (
            s.next_hop.clone(),
            s.read_cancelable.clone(),
            s.config.read_chunk_size(),
        )
    };
    let weak = Rc::downgrade(shared);
    let cancelable = next_hop.read(
        Buffer::with_capacity(chunk),
        Box::new(move |result| {
            let Some(shared) = weak.upgrade() else { return };
            if token.canceled() {
                return;
            }
            match result {
                Ok(ciphertext) => {
                    #[cfg(feature = "tracing")]
                    trace!("received {} tls bytes", ciphertext.len());
                    let engine_failed = {
                        let mut s = shared.borrow_mut();
                        s.tunnel.write_ciphertext(ciphertext);
                        s.tunnel.errored()
                    };
                    if engine_failed {
                        handle_inner_error(&shared, FlowError::Tls, true);
                    } else {
                        process(&shared);
                    }
                }
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    debug!("inner read failed: {err}");
                    handle_inner_error(&shared, err, true);
                }
            }
        }),
    );
    shared.borrow_mut().next_read_cancelable = cancelable;
}

fn try_write_next_hop(shared: &Rc<RefCell<Shared>>) {
    let (next_hop, token, ciphertext) = {
        let mut s = shared.borrow_mut();
        if s.next_hop.state_machine().is_writing() {
            return;
        }
        if s.tunnel.finished_writing_ciphertext() {
            return;
        }
        (
            s.next_hop.clone(),
            s.write_cancelable.clone(),
            s.tunnel.read_ciphertext(),
        )
    };
    #[cfg(feature = "tracing")]
    trace!("sending {} tls bytes", ciphertext.len());
    let weak = Rc::downgrade(shared);
    let cancelable = next_hop.write(
        ciphertext,
        Box::new(move |result| {
            let Some(shared) = weak.upgrade() else { return };
            if token.canceled() {
                return;
            }
            match result {
                Ok(()) => process(&shared),
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    debug!("inner write failed: {err}");
                    handle_inner_error(&shared, err, false);
                }
            }
        }),
    );
    shared.borrow_mut().next_write_cancelable = cancelable;
}

/// Routes an inner-flow error to a user handler. Inner read errors usually
/// mean the peer half-closed or dropped, so the user's read is the natural
/// surface; inner write errors prefer the user's write. When the preferred
/// side has no handler the other is tried; when neither does, the error is
/// parked until the next user operation.
fn handle_inner_error(shared: &Rc<RefCell<Shared>>, err: FlowError, try_read_first: bool) {
    if report_error(shared, err.clone(), try_read_first) {
        shared.borrow_mut().error_reported = true;
    } else {
        shared.borrow_mut().pending_error = Some(err);
    }
}

fn report_error(shared: &Rc<RefCell<Shared>>, err: FlowError, try_read_first: bool) -> bool {
    if try_read_first {
        report_read_error(shared, err.clone()) || report_write_error(shared, err)
    } else {
        report_write_error(shared, err.clone()) || report_read_error(shared, err)
    }
}

fn report_read_error(shared: &Rc<RefCell<Shared>>, err: FlowError) -> bool {
    let handler = shared.borrow_mut().read_slot.take();
    match handler {
        Some(handler) => {
            handler(Err(err));
            true
        }
        None => false,
    }
}

fn report_write_error(shared: &Rc<RefCell<Shared>>, err: FlowError) -> bool {
    let handler = shared.borrow_mut().write_slot.take();
    match handler {
        Some(handler) => {
            handler(Err(err));
            true
        }
        None => false,
    }
}
