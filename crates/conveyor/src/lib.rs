//! At-least-once source connector for a stream-processing engine.
//!
//! A [`Connector`] owns one framed TCP session and any number of local
//! [`Source`]s, each bound to a stream with a stable 64-bit id. Records are
//! multiplexed round-robin; the engine acknowledges progress per stream and
//! may reposition a source at any time, so every record reaches the engine
//! at least once across crashes, disconnects and replays.
//!
//! ```no_run
//! use conveyor::{Connector, ConnectorConfig, FramedFileSource};
//!
//! let config = ConnectorConfig::new(
//!     "127.0.0.1", 7100, "0.0.1", "Dragons-Love-Tacos", "celsius", "instance",
//! );
//! let mut client = Connector::new(config)?;
//! client.connect()?;
//! client.add_source(FramedFileSource::open("celsius.msg")?)?;
//! client.run()?; // until every source is exhausted and acknowledged
//! # Ok::<(), conveyor::ConnectorError>(())
//! ```

pub mod config;
mod connector;
mod error;
pub mod identity;
mod registry;
mod schedule;
pub mod source;

pub use config::{AppDescriptor, ConnectorConfig, ConnectorEntry, ConnectorParams, ParamSpec, Role};
pub use connector::{Connector, Tick};
pub use conveyor_network::ConnectRetry;
pub use error::ConnectorError;
pub use identity::{IdHasher, Sha256Id, StreamId};
pub use registry::StreamState;
pub use source::{
    FramedFileSource, GenSource, Generate, Item, POR_NONE, ReadMode, Source, ThrottledFileSource,
};
