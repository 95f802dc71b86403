//! Readiness-driven TCP plumbing for the connector: a single-connection
//! outbound [`Session`] and the multi-connection [`SinkReader`] counterpart.

mod error;
mod session;
mod sink;
mod stream;

pub use error::NetError;
pub use session::{ConnectRetry, Session};
pub use sink::SinkReader;
pub use stream::{FramedStream, LinkState};
