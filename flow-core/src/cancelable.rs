use std::{cell::Cell, rc::Rc};

/// A shared advisory cancellation flag.
///
/// Every suspended continuation captures a clone of the token guarding its
/// slot and must consult [`canceled`](Self::canceled) before touching any
/// shared state; a canceled token means the completion is discarded without
/// side effects. Cancelling never aborts in-flight I/O.
///
/// Clones are cheap and all observe the same flag. Arming a new operation
/// installs a fresh token in its slot, which invalidates continuations still
/// holding the previous one.
#[derive(Debug, Clone, Default)]
pub struct Cancelable {
    flag: Rc<Cell<bool>>,
}

impl Cancelable {
    /// Creates a new, active token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the token canceled. Idempotent.
    pub fn cancel(&self) {
        self.flag.set(true);
    }

    /// Whether any clone of this token has been canceled.
    pub fn canceled(&self) -> bool {
        self.flag.get()
    }
}
