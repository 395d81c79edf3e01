//! Test doubles: a scripted TLS engine and a mock inner transport flow.

use std::{cell::RefCell, collections::VecDeque, rc::Rc, sync::Once};

use flow_core::{
    Buffer, Cancelable, DataFlow, DataHandler, DataType, Endpoint, EventHandler, FlowStateMachine,
    RemoteDataFlow, Runloop, Session,
};
use tls_flow::{HandshakeAction, Tunnel};

/// Installs the log subscriber once for the whole test binary.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing_subscriber::filter::LevelFilter::TRACE)
            .with_test_writer()
            .try_init();
    });
}

fn rot1(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b.wrapping_add(1)).collect()
}

fn unrot1(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b.wrapping_sub(1)).collect()
}

#[derive(Default)]
struct TunnelState {
    domain: Option<String>,
    script: VecDeque<(HandshakeAction, Vec<u8>)>,
    handshake_input: Vec<u8>,
    plaintext_in: Vec<u8>,
    ciphertext_out: VecDeque<Vec<u8>>,
    need_input: bool,
    errored: bool,
}

/// A scripted [`Tunnel`]. Handshake steps are queued up front; in steady
/// state plaintext and ciphertext map to each other by a byte-wise ROT1, so
/// tests can assert exact wire bytes.
///
/// Clones share state: keep one clone as a handle after moving the other
/// into the flow.
#[derive(Clone, Default)]
pub struct ScriptedTunnel {
    state: Rc<RefCell<TunnelState>>,
}

impl ScriptedTunnel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a handshake step: the action [`Tunnel::handshake`] returns,
    /// and the ciphertext it leaves in the out-queue.
    pub fn push_step(&self, action: HandshakeAction, ciphertext: &[u8]) {
        self.state
            .borrow_mut()
            .script
            .push_back((action, ciphertext.to_vec()));
    }

    pub fn set_need_input(&self, need: bool) {
        self.state.borrow_mut().need_input = need;
    }

    pub fn set_errored(&self, errored: bool) {
        self.state.borrow_mut().errored = errored;
    }

    /// Pushes already-decrypted plaintext, as if a record had been processed.
    pub fn inject_plaintext(&self, data: &[u8]) {
        self.state.borrow_mut().plaintext_in.extend_from_slice(data);
    }

    pub fn domain(&self) -> Option<String> {
        self.state.borrow().domain.clone()
    }

    /// Ciphertext fed to the engine while the handshake script was running.
    pub fn handshake_input(&self) -> Vec<u8> {
        self.state.borrow().handshake_input.clone()
    }
}

impl Tunnel for ScriptedTunnel {
    fn set_domain(&mut self, host: &str) {
        self.state.borrow_mut().domain = Some(host.to_owned());
    }

    fn handshake(&mut self) -> HandshakeAction {
        let mut state = self.state.borrow_mut();
        match state.script.pop_front() {
            Some((action, ciphertext)) => {
                if !ciphertext.is_empty() {
                    state.ciphertext_out.push_back(ciphertext);
                }
                action
            }
            None => HandshakeAction::Success,
        }
    }

    fn read_ciphertext(&mut self) -> Buffer {
        match self.state.borrow_mut().ciphertext_out.pop_front() {
            Some(chunk) => Buffer::from(chunk),
            None => Buffer::new(),
        }
    }

    fn write_ciphertext(&mut self, buffer: Buffer) {
        let mut state = self.state.borrow_mut();
        if state.script.is_empty() {
            let plaintext = unrot1(&buffer);
            state.plaintext_in.extend_from_slice(&plaintext);
        } else {
            state.handshake_input.extend_from_slice(&buffer);
        }
    }

    fn has_plaintext(&self) -> bool {
        !self.state.borrow().plaintext_in.is_empty()
    }

    fn read_plaintext(&mut self) -> Buffer {
        Buffer::from(std::mem::take(&mut self.state.borrow_mut().plaintext_in))
    }

    fn write_plaintext(&mut self, buffer: Buffer) {
        let ciphertext = rot1(&buffer);
        self.state.borrow_mut().ciphertext_out.push_back(ciphertext);
    }

    fn need_cipher_input(&self) -> bool {
        self.state.borrow().need_input
    }

    fn finished_writing_ciphertext(&self) -> bool {
        self.state.borrow().ciphertext_out.is_empty()
    }

    fn errored(&self) -> bool {
        self.state.borrow().errored
    }
}

#[derive(Default)]
struct MockFlowState {
    state_machine: FlowStateMachine,
    connect: Option<(Rc<Endpoint>, EventHandler)>,
    read: Option<(usize, DataHandler)>,
    write: Option<EventHandler>,
    written: Vec<Vec<u8>>,
    reads_issued: usize,
}

/// A mock inner transport flow. Operations are recorded; tests complete them
/// explicitly, with completions delivered through the runloop like any real
/// flow. Arming a second read or write before completing the first panics,
/// which checks the single-outstanding-I/O invariant for free.
///
/// Clones share state: keep one clone as a handle after moving the other
/// into the flow under test.
#[derive(Clone)]
pub struct MockRemoteFlow {
    state: Rc<RefCell<MockFlowState>>,
    runloop: Runloop,
    session: Rc<Session>,
}

impl MockRemoteFlow {
    pub fn new(session: Rc<Session>, runloop: Runloop) -> Self {
        Self {
            state: Rc::new(RefCell::new(MockFlowState::default())),
            runloop,
            session,
        }
    }

    pub fn has_pending_connect(&self) -> bool {
        self.state.borrow().connect.is_some()
    }

    pub fn has_pending_read(&self) -> bool {
        self.state.borrow().read.is_some()
    }

    pub fn has_pending_write(&self) -> bool {
        self.state.borrow().write.is_some()
    }

    /// Every payload ever handed to `write`, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.borrow().written.clone()
    }

    pub fn reads_issued(&self) -> usize {
        self.state.borrow().reads_issued
    }

    /// Capacity hint of the pending read.
    pub fn pending_read_hint(&self) -> Option<usize> {
        self.state.borrow().read.as_ref().map(|(hint, _)| *hint)
    }

    pub fn complete_connect(&self, result: Result<(), flow_core::FlowError>) {
        let (_, handler) = self
            .state
            .borrow_mut()
            .connect
            .take()
            .expect("no pending connect");
        let state = self.state.clone();
        self.runloop.post(move || {
            if result.is_ok() {
                state.borrow_mut().state_machine.connected();
            }
            handler(result);
        });
    }

    pub fn complete_read(&self, result: Result<Vec<u8>, flow_core::FlowError>) {
        let (_, handler) = self
            .state
            .borrow_mut()
            .read
            .take()
            .expect("no pending read");
        let state = self.state.clone();
        self.runloop.post(move || {
            state.borrow_mut().state_machine.read_end();
            handler(result.map(Buffer::from));
        });
    }

    pub fn complete_write(&self, result: Result<(), flow_core::FlowError>) {
        let handler = self
            .state
            .borrow_mut()
            .write
            .take()
            .expect("no pending write");
        let state = self.state.clone();
        self.runloop.post(move || {
            state.borrow_mut().state_machine.write_end();
            handler(result);
        });
    }
}

impl DataFlow for MockRemoteFlow {
    fn read(&self, buffer: Buffer, handler: DataHandler) -> Cancelable {
        let mut state = self.state.borrow_mut();
        assert!(state.read.is_none(), "second inner read while one is in flight");
        state.state_machine.read_begin();
        state.read = Some((buffer.capacity(), handler));
        state.reads_issued += 1;
        Cancelable::new()
    }

    fn write(&self, buffer: Buffer, handler: EventHandler) -> Cancelable {
        let mut state = self.state.borrow_mut();
        assert!(
            state.write.is_none(),
            "second inner write while one is in flight"
        );
        state.state_machine.write_begin();
        state.written.push(buffer.to_vec());
        state.write = Some(handler);
        Cancelable::new()
    }

    fn close_write(&self, _handler: EventHandler) -> Cancelable {
        Cancelable::new()
    }

    fn state_machine(&self) -> FlowStateMachine {
        self.state.borrow().state_machine
    }

    fn data_type(&self) -> DataType {
        DataType::Stream
    }

    fn session(&self) -> Rc<Session> {
        self.session.clone()
    }

    fn runloop(&self) -> Runloop {
        self.runloop.clone()
    }
}

impl RemoteDataFlow for MockRemoteFlow {
    fn connect(&self, endpoint: Rc<Endpoint>, handler: EventHandler) -> Cancelable {
        let mut state = self.state.borrow_mut();
        state.state_machine.connect_begin();
        state.connect = Some((endpoint, handler));
        Cancelable::new()
    }

    fn connecting_to(&self) -> Option<Rc<Endpoint>> {
        self.state
            .borrow()
            .connect
            .as_ref()
            .map(|(endpoint, _)| endpoint.clone())
    }
}
