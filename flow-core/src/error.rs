use std::io;

/// Errors observable at a flow boundary.
///
/// Transport variants are propagated verbatim from the stage that observed
/// them; `Tls` is the single general failure surfaced for any handshake or
/// record-layer error. Cancellation is not an error: a canceled operation's
/// handler simply never fires.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("connection reset by peer")]
    ConnectionReset,
    #[error("connection refused")]
    ConnectionRefused,
    #[error("connection closed")]
    Closed,
    #[error("operation timed out")]
    TimedOut,
    #[error("address resolution failed")]
    ResolutionFailed,
    #[error("tls protocol error")]
    Tls,
    #[error("io error: {0}")]
    Io(String),
}

impl From<io::Error> for FlowError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset => Self::ConnectionReset,
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused,
            io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe => Self::Closed,
            io::ErrorKind::TimedOut => Self::TimedOut,
            _ => Self::Io(err.to_string()),
        }
    }
}
