use crate::WireError;

/// Session frames are `[u32 BE payload length][payload]`; the payload starts
/// with a one-byte tag followed by big-endian fields. Variable-length byte
/// strings carry a u16 BE length prefix, except `Message.payload` which runs
/// to the end of the frame.
pub const SESSION_HEADER_LEN: usize = 4;

mod tag {
    pub const HELLO: u8 = 0x01;
    pub const OK: u8 = 0x02;
    pub const ERR: u8 = 0x03;
    pub const NOTIFY: u8 = 0x04;
    pub const STREAM_ADDED: u8 = 0x05;
    pub const STREAM_OPENED: u8 = 0x06;
    pub const STREAM_CLOSED: u8 = 0x07;
    pub const ACK: u8 = 0x08;
    pub const EOS: u8 = 0x09;
    pub const MESSAGE: u8 = 0x0a;
}

/// Wraps an already-encoded frame payload in the session length header.
pub fn session_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(SESSION_HEADER_LEN + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Frames sent by the connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Hello { version: String, cookie: String, program: String, instance: String },
    Notify { stream_id: u64, name: Vec<u8>, por: u64 },
    Eos { stream_id: u64 },
    Message { stream_id: u64, message_id: u64, event_time: u64, key: Vec<u8>, payload: Vec<u8> },
}

/// Frames sent by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineFrame {
    Ok { credits: Vec<(u64, u64)> },
    Err { reason: String },
    StreamAdded { stream_id: u64, por: u64 },
    StreamOpened { stream_id: u64, por: u64 },
    StreamClosed { stream_id: u64 },
    Ack { stream_id: u64, por: u64 },
}

impl ClientFrame {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            ClientFrame::Hello { version, cookie, program, instance } => {
                buf.push(tag::HELLO);
                put_bytes(buf, version.as_bytes());
                put_bytes(buf, cookie.as_bytes());
                put_bytes(buf, program.as_bytes());
                put_bytes(buf, instance.as_bytes());
            }
            ClientFrame::Notify { stream_id, name, por } => {
                buf.push(tag::NOTIFY);
                buf.extend_from_slice(&stream_id.to_be_bytes());
                put_bytes(buf, name);
                buf.extend_from_slice(&por.to_be_bytes());
            }
            ClientFrame::Eos { stream_id } => {
                buf.push(tag::EOS);
                buf.extend_from_slice(&stream_id.to_be_bytes());
            }
            ClientFrame::Message { stream_id, message_id, event_time, key, payload } => {
                buf.push(tag::MESSAGE);
                buf.extend_from_slice(&stream_id.to_be_bytes());
                buf.extend_from_slice(&message_id.to_be_bytes());
                buf.extend_from_slice(&event_time.to_be_bytes());
                put_bytes(buf, key);
                buf.extend_from_slice(payload);
            }
        }
    }

    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(frame);
        let frame = match r.u8("tag")? {
            tag::HELLO => ClientFrame::Hello {
                version: r.string("version")?,
                cookie: r.string("cookie")?,
                program: r.string("program")?,
                instance: r.string("instance")?,
            },
            tag::NOTIFY => ClientFrame::Notify {
                stream_id: r.u64("stream_id")?,
                name: r.byte_string("name")?,
                por: r.u64("por")?,
            },
            tag::EOS => ClientFrame::Eos { stream_id: r.u64("stream_id")? },
            tag::MESSAGE => ClientFrame::Message {
                stream_id: r.u64("stream_id")?,
                message_id: r.u64("message_id")?,
                event_time: r.u64("event_time")?,
                key: r.byte_string("key")?,
                payload: r.rest().to_vec(),
            },
            _ => return Err(WireError::Malformed("unknown client frame tag")),
        };
        r.finish()?;
        Ok(frame)
    }
}

impl EngineFrame {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            EngineFrame::Ok { credits } => {
                buf.push(tag::OK);
                buf.extend_from_slice(&(credits.len() as u32).to_be_bytes());
                for (stream_id, por) in credits {
                    buf.extend_from_slice(&stream_id.to_be_bytes());
                    buf.extend_from_slice(&por.to_be_bytes());
                }
            }
            EngineFrame::Err { reason } => {
                buf.push(tag::ERR);
                put_bytes(buf, reason.as_bytes());
            }
            EngineFrame::StreamAdded { stream_id, por } => {
                buf.push(tag::STREAM_ADDED);
                buf.extend_from_slice(&stream_id.to_be_bytes());
                buf.extend_from_slice(&por.to_be_bytes());
            }
            EngineFrame::StreamOpened { stream_id, por } => {
                buf.push(tag::STREAM_OPENED);
                buf.extend_from_slice(&stream_id.to_be_bytes());
                buf.extend_from_slice(&por.to_be_bytes());
            }
            EngineFrame::StreamClosed { stream_id } => {
                buf.push(tag::STREAM_CLOSED);
                buf.extend_from_slice(&stream_id.to_be_bytes());
            }
            EngineFrame::Ack { stream_id, por } => {
                buf.push(tag::ACK);
                buf.extend_from_slice(&stream_id.to_be_bytes());
                buf.extend_from_slice(&por.to_be_bytes());
            }
        }
    }

    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(frame);
        let frame = match r.u8("tag")? {
            tag::OK => {
                let count = r.u32("credit count")?;
                let mut credits = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    credits.push((r.u64("credit stream_id")?, r.u64("credit por")?));
                }
                EngineFrame::Ok { credits }
            }
            tag::ERR => EngineFrame::Err { reason: r.string("reason")? },
            tag::STREAM_ADDED => {
                EngineFrame::StreamAdded { stream_id: r.u64("stream_id")?, por: r.u64("por")? }
            }
            tag::STREAM_OPENED => {
                EngineFrame::StreamOpened { stream_id: r.u64("stream_id")?, por: r.u64("por")? }
            }
            tag::STREAM_CLOSED => EngineFrame::StreamClosed { stream_id: r.u64("stream_id")? },
            tag::ACK => EngineFrame::Ack { stream_id: r.u64("stream_id")?, por: r.u64("por")? },
            _ => return Err(WireError::Malformed("unknown engine frame tag")),
        };
        r.finish()?;
        Ok(frame)
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    debug_assert!(bytes.len() <= u16::MAX as usize);
    buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    buf.extend_from_slice(bytes);
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], WireError> {
        if self.buf.len() < n {
            return Err(WireError::Truncated(what));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, WireError> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, WireError> {
        Ok(u16::from_be_bytes(self.take(2, what)?.try_into().unwrap()))
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, WireError> {
        Ok(u32::from_be_bytes(self.take(4, what)?.try_into().unwrap()))
    }

    fn u64(&mut self, what: &'static str) -> Result<u64, WireError> {
        Ok(u64::from_be_bytes(self.take(8, what)?.try_into().unwrap()))
    }

    fn byte_string(&mut self, what: &'static str) -> Result<Vec<u8>, WireError> {
        let len = self.u16(what)? as usize;
        Ok(self.take(len, what)?.to_vec())
    }

    fn string(&mut self, what: &'static str) -> Result<String, WireError> {
        let bytes = self.byte_string(what)?;
        String::from_utf8(bytes).map_err(|_| WireError::Malformed("invalid utf8"))
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    /// All fixed-layout frames must consume the frame exactly.
    fn finish(&self) -> Result<(), WireError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(WireError::Malformed("trailing bytes after frame"))
        }
    }
}
