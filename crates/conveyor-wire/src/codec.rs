use crate::WireError;

/// Fixed-header frame decoder supplied by the application.
///
/// The reader side buffers raw bytes; once `header_length` bytes are
/// available it asks for the payload length, and once the whole payload is
/// buffered it hands exactly the payload to `decode`.
pub trait Decoder {
    type Record;

    fn header_length(&self) -> usize;
    fn payload_length(&self, header: &[u8]) -> Result<u32, WireError>;
    fn decode(&self, payload: &[u8]) -> Result<Self::Record, WireError>;
}

/// Application-side encoder: serialises one record, header included.
pub trait Encoder {
    type Record;

    fn encode(&self, record: &Self::Record, buf: &mut Vec<u8>);
}

/// Accumulates inbound bytes for one connection and yields whole payloads
/// according to a [`Decoder`]'s header rules.
#[derive(Default)]
pub struct FrameSplitter {
    buf: Vec<u8>,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    #[inline]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Extracts and decodes the next whole frame, or returns `None` when the
    /// buffer does not yet hold one.
    pub fn next_record<D: Decoder>(&mut self, decoder: &D) -> Result<Option<D::Record>, WireError> {
        let header_len = decoder.header_length();
        if self.buf.len() < header_len {
            return Ok(None);
        }
        let payload_len = decoder.payload_length(&self.buf[..header_len])? as usize;
        if self.buf.len() < header_len + payload_len {
            return Ok(None);
        }
        let record = decoder.decode(&self.buf[header_len..header_len + payload_len])?;
        self.buf.drain(..header_len + payload_len);
        Ok(Some(record))
    }
}

/// Default session codec: `[u32 BE length][payload]`, payload returned raw.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawFrameDecoder;

impl Decoder for RawFrameDecoder {
    type Record = Vec<u8>;

    fn header_length(&self) -> usize {
        4
    }

    fn payload_length(&self, header: &[u8]) -> Result<u32, WireError> {
        if header.len() < 4 {
            return Err(WireError::Truncated("length header"));
        }
        Ok(u32::from_be_bytes(header[..4].try_into().unwrap()))
    }

    fn decode(&self, payload: &[u8]) -> Result<Self::Record, WireError> {
        Ok(payload.to_vec())
    }
}

/// Counterpart of [`RawFrameDecoder`] for tests and simple feeds.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawFrameEncoder;

impl Encoder for RawFrameEncoder {
    type Record = Vec<u8>;

    fn encode(&self, record: &Self::Record, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(record.len() as u32).to_be_bytes());
        buf.extend_from_slice(record);
    }
}
