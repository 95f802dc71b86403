use thiserror::Error;

use conveyor_network::NetError;

use crate::identity::StreamId;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("inbound event for unknown stream {0}")]
    UnknownStream(StreamId),
    #[error("a source is already registered for stream {0}")]
    DuplicateSource(StreamId),
    #[error("ack beyond end-of-stream position: expected at most {expected}, got {got}")]
    AckOverrun { expected: u64, got: u64 },
    #[error("stream {0} is not pending removal")]
    NotRemoved(StreamId),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("{0}")]
    Misuse(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("transport error")]
    Net(#[from] NetError),
    #[error("io error")]
    Io(#[from] std::io::Error),
}

impl ConnectorError {
    /// True when the session dropped and the caller may `connect` again.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ConnectorError::Net(NetError::Disconnected))
    }
}
