use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("frame too short for {0}")]
    Truncated(&'static str),
    #[error("malformed frame: {0}")]
    Malformed(&'static str),
    #[error("io error")]
    Io(#[from] std::io::Error),
}
