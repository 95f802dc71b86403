use std::{
    io::{self, Read, Write},
    net::SocketAddr,
};

use conveyor_wire::{FrameSplitter, RawFrameDecoder, SESSION_HEADER_LEN};
use mio::{Interest, Registry, Token, event::Event};
use tracing::{debug, warn};

/// Bytes pulled off the socket per read call.
const READ_CHUNK: usize = 4096;

/// Whether the link is still usable after a call. On `Closed` the caller
/// must drop this connection and rebuild the session.
#[derive(Debug, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Closed,
}

/// Single mio-backed TCP connection carrying `[u32 BE length][payload]`
/// frames in both directions.
///
/// Inbound bytes accumulate in a [`FrameSplitter`]; every readable event
/// drains the socket and then hands each whole frame to the caller, so a
/// frame completed just before the peer hung up is still delivered.
///
/// Outbound frames are written to the kernel immediately when possible.
/// Whatever the kernel does not take lands in a flat outbox that is flushed
/// on writable events; since frames enter the outbox whole and in order, a
/// frame's bytes are never interleaved with another's.
pub struct FramedStream {
    stream: mio::net::TcpStream,
    peer_addr: SocketAddr,
    token: Token,

    rx: FrameSplitter,
    /// Unsent frame bytes, oldest first. `flushed` marks the prefix the
    /// kernel has already taken; the buffer resets once fully drained.
    outbox: Vec<u8>,
    flushed: usize,
    /// True while WRITABLE interest is registered, i.e. while the outbox
    /// holds unsent bytes.
    want_writable: bool,
}

impl FramedStream {
    pub fn new(
        stream: mio::net::TcpStream,
        peer_addr: SocketAddr,
        token: Token,
    ) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            peer_addr,
            token,
            rx: FrameSplitter::new(),
            outbox: Vec::new(),
            flushed: 0,
            want_writable: false,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Handles one readiness event, calling `on_frame` for every whole
    /// inbound frame. The slice is only valid for the duration of the
    /// callback.
    pub fn poll_event<F>(&mut self, registry: &Registry, ev: &Event, on_frame: &mut F) -> LinkState
    where
        F: for<'a> FnMut(&'a [u8]),
    {
        if ev.is_readable() && self.pull_frames(on_frame) == LinkState::Closed {
            return LinkState::Closed;
        }
        if ev.is_writable() && self.flush_outbox(registry) == LinkState::Closed {
            return LinkState::Closed;
        }
        LinkState::Up
    }

    /// Frames the serialised payload and writes it out, parking any
    /// remainder in the outbox for the next writable event.
    pub fn write_or_enqueue_with<F>(&mut self, registry: &Registry, serialise: F) -> LinkState
    where
        F: FnOnce(&mut Vec<u8>),
    {
        // Serialise after a length-sized hole, then patch the prefix.
        let mut frame = vec![0u8; SESSION_HEADER_LEN];
        serialise(&mut frame);
        let body_len = (frame.len() - SESSION_HEADER_LEN) as u32;
        frame[..SESSION_HEADER_LEN].copy_from_slice(&body_len.to_be_bytes());

        if !self.outbox.is_empty() {
            // Earlier bytes must leave first; just queue behind them.
            self.outbox.extend_from_slice(&frame);
            return LinkState::Up;
        }

        let mut written = 0;
        while written < frame.len() {
            match self.stream.write(&frame[written..]) {
                Ok(0) => {
                    warn!(peer = ?self.peer_addr, "peer stopped accepting bytes");
                    return LinkState::Closed;
                }
                Ok(n) => written += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.outbox.extend_from_slice(&frame[written..]);
                    return self.watch_writable(registry);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(?err, peer = ?self.peer_addr, "session write failed");
                    return LinkState::Closed;
                }
            }
        }
        LinkState::Up
    }

    /// Drains the socket into the splitter, then dispatches every complete
    /// frame. An EOF or read error still dispatches what arrived before it.
    fn pull_frames<F>(&mut self, on_frame: &mut F) -> LinkState
    where
        F: for<'a> FnMut(&'a [u8]),
    {
        let mut state = LinkState::Up;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    state = LinkState::Closed;
                    break;
                }
                Ok(n) => self.rx.extend(&chunk[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    debug!(?err, peer = ?self.peer_addr, "session read failed");
                    state = LinkState::Closed;
                    break;
                }
            }
        }

        loop {
            match self.rx.next_record(&RawFrameDecoder) {
                Ok(Some(frame)) => on_frame(&frame),
                Ok(None) => break,
                Err(err) => {
                    debug!(?err, "inbound framing broke");
                    return LinkState::Closed;
                }
            }
        }
        state
    }

    /// Pushes outbox bytes to the kernel until it blocks or the outbox is
    /// empty; on a full drain the buffer resets and WRITABLE interest drops.
    fn flush_outbox(&mut self, registry: &Registry) -> LinkState {
        while self.flushed < self.outbox.len() {
            match self.stream.write(&self.outbox[self.flushed..]) {
                Ok(0) => {
                    warn!(peer = ?self.peer_addr, "peer stopped accepting bytes");
                    return LinkState::Closed;
                }
                Ok(n) => self.flushed += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return LinkState::Up,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    debug!(?err, "flush of queued frames failed");
                    return LinkState::Closed;
                }
            }
        }

        self.outbox.clear();
        self.flushed = 0;
        if self.want_writable {
            if let Err(err) = registry.reregister(&mut self.stream, self.token, Interest::READABLE)
            {
                debug!(?err, "could not update socket interest");
                return LinkState::Closed;
            }
            self.want_writable = false;
        }
        LinkState::Up
    }

    fn watch_writable(&mut self, registry: &Registry) -> LinkState {
        if self.want_writable {
            return LinkState::Up;
        }
        match registry.reregister(
            &mut self.stream,
            self.token,
            Interest::READABLE | Interest::WRITABLE,
        ) {
            Ok(()) => {
                self.want_writable = true;
                LinkState::Up
            }
            Err(err) => {
                debug!(?err, "could not update socket interest");
                LinkState::Closed
            }
        }
    }

    pub fn close(&mut self, registry: &Registry) -> SocketAddr {
        debug!(peer = ?self.peer_addr, "closing link");
        let _ = registry.deregister(&mut self.stream);
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        self.peer_addr
    }
}
