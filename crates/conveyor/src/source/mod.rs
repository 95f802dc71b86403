//! Local record producers. Each source feeds exactly one stream and is
//! addressable by a monotonic position: for file-backed sources, the byte
//! offset just past the last emitted record.

mod framed;
mod generate;
mod throttled;

use std::io;

pub use framed::FramedFileSource;
pub use generate::{GenSource, Generate};
pub use throttled::{ReadMode, ThrottledFileSource};

use conveyor_wire::WireError;

/// Sentinel position meaning the engine has no record of the stream.
/// A source receiving it in `reset` must rewind to its origin.
pub const POR_NONE: u64 = u64::MAX;

/// One step of a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// A record and the position just past it.
    Record { payload: Vec<u8>, por: u64 },
    /// Nothing available right now; the position must not advance.
    Yield { por: u64 },
    /// The sequence is exhausted.
    End,
}

/// A lazy, resettable producer of records for one stream.
///
/// `reset(p)` repositions the source so that the following `next` returns
/// the first record not yet processed at position `p`; `reset(POR_NONE)`
/// rewinds to the origin. `acked` is informational only.
pub trait Source {
    fn name(&self) -> &[u8];
    fn key(&self) -> &[u8];
    fn point_of_ref(&self) -> u64;
    fn reset(&mut self, por: u64) -> io::Result<()>;
    fn next(&mut self) -> io::Result<Item>;
    fn acked(&mut self, _por: u64) {}
    fn close(&mut self) {}
}

pub(crate) fn wire_to_io(err: WireError) -> io::Error {
    match err {
        WireError::Io(err) => err,
        other => io::Error::other(other),
    }
}
