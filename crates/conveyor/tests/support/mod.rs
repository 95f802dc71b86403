//! Scripted engine-side stub for exercising the connector over a real
//! socket, plus small in-memory sources with observable reset behavior.

use std::{
    io::{self, Read, Write},
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream},
    sync::{Arc, Mutex},
    time::Duration,
};

use conveyor::{ConnectorConfig, Item, POR_NONE, Source};
use conveyor_wire::{ClientFrame, EngineFrame, session_frame};

pub struct EngineStub {
    listener: TcpListener,
}

impl EngineStub {
    pub fn bind() -> Self {
        let listener = TcpListener::bind((IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).unwrap();
        Self { listener }
    }

    pub fn addr(&self) -> SocketAddr {
        self.listener.local_addr().unwrap()
    }

    pub fn config(&self) -> ConnectorConfig {
        let addr = self.addr();
        ConnectorConfig::new(
            addr.ip().to_string(),
            addr.port(),
            "0.0.1",
            "Dragons-Love-Tacos",
            "testprog",
            "instance",
        )
    }

    pub fn accept(&self) -> EngineConn {
        let (stream, _) = self.listener.accept().unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        EngineConn { stream }
    }
}

pub struct EngineConn {
    stream: TcpStream,
}

impl EngineConn {
    pub fn send(&mut self, frame: &EngineFrame) {
        let mut payload = Vec::new();
        frame.encode(&mut payload);
        self.stream.write_all(&session_frame(&payload)).unwrap();
    }

    pub fn recv(&mut self) -> ClientFrame {
        let mut header = [0u8; 4];
        self.stream.read_exact(&mut header).expect("engine stub timed out waiting for a frame");
        let len = u32::from_be_bytes(header) as usize;
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).unwrap();
        ClientFrame::decode(&payload).unwrap()
    }

    pub fn expect_hello(&mut self) {
        match self.recv() {
            ClientFrame::Hello { .. } => {}
            other => panic!("expected hello, got {other:?}"),
        }
    }

    /// Returns (stream_id, por) of the next notify.
    pub fn expect_notify(&mut self) -> (u64, u64) {
        match self.recv() {
            ClientFrame::Notify { stream_id, por, .. } => (stream_id, por),
            other => panic!("expected notify, got {other:?}"),
        }
    }

    /// Returns (stream_id, message_id, payload) of the next message.
    pub fn expect_message(&mut self) -> (u64, u64, Vec<u8>) {
        match self.recv() {
            ClientFrame::Message { stream_id, message_id, payload, .. } => {
                (stream_id, message_id, payload)
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    pub fn expect_eos(&mut self) -> u64 {
        match self.recv() {
            ClientFrame::Eos { stream_id } => stream_id,
            other => panic!("expected end-of-stream, got {other:?}"),
        }
    }
}

/// Shared log of the positions a [`VecSource`] was reset to.
pub type ResetLog = Arc<Mutex<Vec<u64>>>;

/// In-memory source over `(position, payload)` pairs. `reset(p)` repositions
/// to the first record with a position greater than `p`. When `hold_open` is
/// set, exhaustion yields instead of ending so a test can keep the stream
/// open.
pub struct VecSource {
    name: Vec<u8>,
    records: Vec<(u64, Vec<u8>)>,
    idx: usize,
    hold_open: bool,
    resets: ResetLog,
}

impl VecSource {
    pub fn new(name: &str, records: Vec<(u64, Vec<u8>)>) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            records,
            idx: 0,
            hold_open: false,
            resets: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn reset_log(&self) -> ResetLog {
        Arc::clone(&self.resets)
    }
}

impl Source for VecSource {
    fn name(&self) -> &[u8] {
        &self.name
    }

    fn key(&self) -> &[u8] {
        &self.name
    }

    fn point_of_ref(&self) -> u64 {
        if self.idx == 0 { 0 } else { self.records[self.idx - 1].0 }
    }

    fn reset(&mut self, por: u64) -> io::Result<()> {
        self.resets.lock().unwrap().push(por);
        if por == POR_NONE {
            self.idx = 0;
            return Ok(());
        }
        self.idx = self.records.iter().position(|(p, _)| *p > por).unwrap_or(self.records.len());
        Ok(())
    }

    fn next(&mut self) -> io::Result<Item> {
        match self.records.get(self.idx) {
            Some((por, payload)) => {
                self.idx += 1;
                Ok(Item::Record { payload: payload.clone(), por: *por })
            }
            None if self.hold_open => Ok(Item::Yield { por: self.point_of_ref() }),
            None => Ok(Item::End),
        }
    }
}
