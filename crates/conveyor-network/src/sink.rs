use std::{
    io::{self, Read},
    net::SocketAddr,
    time::Duration,
};

use conveyor_wire::{Decoder, FrameSplitter};
use mio::{Events, Interest, Poll, Token, event::Event, net::TcpListener};
use tracing::{debug, error, info};

use crate::NetError;

const ACCEPTOR: Token = Token(0);
/// Bytes appended to a connection buffer per read call.
const READ_CHUNK: usize = 4096;

/// Passive counterpart of the connector session, used by code that
/// terminates pipelines: accepts any number of inbound connections and
/// surfaces whole decoded records from any of them.
///
/// Framing is delegated to the caller's [`Decoder`]; the reader itself is
/// codec-agnostic. An exceptional acceptor socket is fatal; an exceptional
/// client socket tears down that one connection only.
pub struct SinkReader<D: Decoder> {
    events: Events,
    inner: Inner<D>,
}

struct Inner<D> {
    poll: Poll,
    acceptor: TcpListener,
    conns: Vec<Conn>,
    decoder: D,
    next_token: usize,
}

struct Conn {
    token: Token,
    stream: mio::net::TcpStream,
    splitter: FrameSplitter,
}

impl<D: Decoder> SinkReader<D> {
    pub fn bind(addr: SocketAddr, decoder: D) -> Result<Self, NetError> {
        let poll = Poll::new()?;
        let mut acceptor = TcpListener::bind(addr)?;
        poll.registry().register(&mut acceptor, ACCEPTOR, Interest::READABLE)?;
        info!(?addr, "sink listening");
        Ok(Self {
            events: Events::with_capacity(128),
            inner: Inner { poll, acceptor, conns: Vec::new(), decoder, next_token: 1 },
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.acceptor.local_addr()
    }

    /// Number of currently connected clients.
    pub fn connections(&self) -> usize {
        self.inner.conns.len()
    }

    /// Returns the next decoded record from any connection.
    ///
    /// With `timeout: None` this blocks until a record arrives. With a
    /// timeout, `None` is returned if no readiness was observed within it.
    pub fn read(&mut self, timeout: Option<Duration>) -> Result<Option<D::Record>, NetError> {
        loop {
            if let Some(record) = self.inner.next_buffered()? {
                return Ok(Some(record));
            }

            if let Err(err) = self.inner.poll.poll(&mut self.events, timeout) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err.into());
            }
            if self.events.is_empty() {
                if timeout.is_some() {
                    return Ok(None);
                }
                continue;
            }
            for ev in self.events.iter() {
                self.inner.handle_event(ev)?;
            }
        }
    }
}

impl<D: Decoder> Inner<D> {
    /// Pulls one already-buffered record out of any connection.
    fn next_buffered(&mut self) -> Result<Option<D::Record>, NetError> {
        for conn in &mut self.conns {
            if let Some(record) = conn.splitter.next_record(&self.decoder)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn handle_event(&mut self, ev: &Event) -> Result<(), NetError> {
        let token = ev.token();
        if token == ACCEPTOR {
            if ev.is_error() {
                error!("acceptor socket in exceptional state");
                return Err(NetError::UnexpectedSocket);
            }
            return self.accept_ready();
        }

        let Some(i) = self.conns.iter().position(|c| c.token == token) else {
            return Ok(());
        };
        if ev.is_error() {
            self.teardown_at(i);
            return Ok(());
        }
        if ev.is_readable() && !self.fill_conn(i) {
            self.teardown_at(i);
        }
        Ok(())
    }

    fn accept_ready(&mut self) -> Result<(), NetError> {
        loop {
            match self.acceptor.accept() {
                Ok((mut stream, addr)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    if let Err(err) =
                        self.poll.registry().register(&mut stream, token, Interest::READABLE)
                    {
                        error!(?err, "couldn't register sink client");
                        let _ = stream.shutdown(std::net::Shutdown::Both);
                        continue;
                    }
                    debug!(?addr, "sink client connected");
                    self.conns.push(Conn { token, stream, splitter: FrameSplitter::new() });
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(NetError::Io(err)),
            }
        }
    }

    /// Reads everything currently available on one connection into its
    /// splitter. Returns false when the connection is gone.
    fn fill_conn(&mut self, i: usize) -> bool {
        let conn = &mut self.conns[i];
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match conn.stream.read(&mut chunk) {
                Ok(0) => return false,
                Ok(n) => conn.splitter.extend(&chunk[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    debug!(?err, "sink client read");
                    return false;
                }
            }
        }
    }

    fn teardown_at(&mut self, i: usize) {
        let mut conn = self.conns.swap_remove(i);
        debug!(token = ?conn.token, "sink client torn down");
        let _ = self.poll.registry().deregister(&mut conn.stream);
        let _ = conn.stream.shutdown(std::net::Shutdown::Both);
    }
}
