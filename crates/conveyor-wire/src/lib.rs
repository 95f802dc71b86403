//! Wire-level building blocks: the session frame vocabulary spoken between a
//! connector and the engine, the generic fixed-header codec used by sink
//! readers, and the on-disk framed record format.

mod codec;
mod error;
mod frame;
mod framed;

pub use codec::{Decoder, Encoder, FrameSplitter, RawFrameDecoder, RawFrameEncoder};
pub use error::WireError;
pub use frame::{ClientFrame, EngineFrame, SESSION_HEADER_LEN, session_frame};
pub use framed::{RECORD_HEADER_LEN, read_record, record_len, write_record};
