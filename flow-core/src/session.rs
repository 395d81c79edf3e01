use std::rc::Rc;

use crate::Endpoint;

/// Shared immutable context for one upstream request.
///
/// Held by shared reference by every stage serving the request; the `id` is
/// carried into log lines so a connection's events can be correlated.
#[derive(Debug)]
pub struct Session {
    id: String,
    endpoint: Rc<Endpoint>,
}

impl Session {
    /// Creates a session targeting `endpoint`.
    pub fn new(id: impl Into<String>, endpoint: Rc<Endpoint>) -> Self {
        Self {
            id: id.into(),
            endpoint,
        }
    }

    /// Correlation id of the session.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The peer this session targets.
    pub fn endpoint(&self) -> &Rc<Endpoint> {
        &self.endpoint
    }
}
