/// Position of a flow in its lifecycle.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Init,
    Connecting,
    Established,
    Reading,
    Writing,
    ReadingWriting,
    ReadClosed,
    WriteClosed,
    Closed,
    Errored,
}

/// Guards the legality of operation orderings on a data-flow stage.
///
/// Each operation method applies one labelled transition. Illegal transitions
/// are programmer errors: they fail a `debug_assert` in debug builds and
/// leave the state unchanged in release builds. `Errored` is terminal with
/// respect to data operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowStateMachine {
    state: FlowState,
}

impl FlowStateMachine {
    /// Creates a machine in `Init`.
    pub fn new() -> Self {
        Self {
            state: FlowState::Init,
        }
    }

    /// Current state.
    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Whether a read is in progress.
    pub fn is_reading(&self) -> bool {
        matches!(
            self.state,
            FlowState::Reading | FlowState::ReadingWriting
        )
    }

    /// Whether a write is in progress.
    pub fn is_writing(&self) -> bool {
        matches!(
            self.state,
            FlowState::Writing | FlowState::ReadingWriting
        )
    }

    /// A connect was initiated.
    pub fn connect_begin(&mut self) {
        self.state = match self.state {
            FlowState::Init => FlowState::Connecting,
            s => Self::illegal("connect_begin", s),
        };
    }

    /// The connect completed successfully.
    pub fn connected(&mut self) {
        self.state = match self.state {
            FlowState::Connecting => FlowState::Established,
            s => Self::illegal("connected", s),
        };
    }

    /// A read was armed.
    pub fn read_begin(&mut self) {
        self.state = match self.state {
            FlowState::Established => FlowState::Reading,
            FlowState::Writing => FlowState::ReadingWriting,
            s => Self::illegal("read_begin", s),
        };
    }

    /// The armed read completed.
    pub fn read_end(&mut self) {
        self.state = match self.state {
            FlowState::Reading => FlowState::Established,
            FlowState::ReadingWriting => FlowState::Writing,
            s => Self::illegal("read_end", s),
        };
    }

    /// A write was armed.
    pub fn write_begin(&mut self) {
        self.state = match self.state {
            FlowState::Established => FlowState::Writing,
            FlowState::Reading => FlowState::ReadingWriting,
            s => Self::illegal("write_begin", s),
        };
    }

    /// The armed write completed.
    pub fn write_end(&mut self) {
        self.state = match self.state {
            FlowState::Writing => FlowState::Established,
            FlowState::ReadingWriting => FlowState::Reading,
            s => Self::illegal("write_end", s),
        };
    }

    /// The read side was half-closed.
    pub fn close_read(&mut self) {
        self.state = match self.state {
            FlowState::Established => FlowState::ReadClosed,
            FlowState::WriteClosed => FlowState::Closed,
            s => Self::illegal("close_read", s),
        };
    }

    /// The write side was half-closed.
    pub fn close_write(&mut self) {
        self.state = match self.state {
            FlowState::Established => FlowState::WriteClosed,
            FlowState::ReadClosed => FlowState::Closed,
            s => Self::illegal("close_write", s),
        };
    }

    /// The flow was closed.
    pub fn close(&mut self) {
        self.state = match self.state {
            FlowState::Errored => Self::illegal("close", FlowState::Errored),
            _ => FlowState::Closed,
        };
    }

    /// The flow failed permanently.
    pub fn errored(&mut self) {
        self.state = FlowState::Errored;
    }

    fn illegal(op: &str, state: FlowState) -> FlowState {
        if cfg!(debug_assertions) {
            panic!("{op} is illegal in state {state:?}");
        }
        state
    }
}

impl Default for FlowStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
