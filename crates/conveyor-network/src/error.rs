use thiserror::Error;

use conveyor_wire::WireError;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("connection lost")]
    Disconnected,
    #[error("session is not connected")]
    NotConnected,
    #[error("session is already connected")]
    AlreadyConnected,
    #[error("exceptional state on the acceptor socket")]
    UnexpectedSocket,
    #[error("wire error")]
    Wire(#[from] WireError),
    #[error("io error")]
    Io(#[from] std::io::Error),
}
