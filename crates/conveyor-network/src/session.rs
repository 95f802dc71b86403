use std::{io, net::SocketAddr, thread, time::Duration};

use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info};

use crate::{FramedStream, LinkState, NetError};

const STREAM: Token = Token(0);

/// Pacing for the initial TCP connect.
///
/// Refused connections are retried after `delay`; `max_attempts: None`
/// retries forever.
#[derive(Clone, Copy, Debug)]
pub struct ConnectRetry {
    pub delay: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for ConnectRetry {
    fn default() -> Self {
        Self { delay: Duration::from_secs(1), max_attempts: None }
    }
}

/// Single outbound TCP connection carrying length-delimited frames.
///
/// `connect` blocks until the peer accepts (retrying refusals per
/// [`ConnectRetry`]); after that all IO is non-blocking and driven by
/// [`poll_frames`]. Frame writes are whole-frame: bytes of one frame are
/// never interleaved with another's.
///
/// A `Disconnected` error from any call means the transport is gone; the
/// caller decides whether to `connect` again and replay its handshake.
pub struct Session {
    events: Events,
    poll: Poll,
    stream: Option<FramedStream>,
    retry: ConnectRetry,
}

impl Session {
    pub fn new(retry: ConnectRetry) -> io::Result<Self> {
        Ok(Self {
            events: Events::with_capacity(128),
            poll: Poll::new()?,
            stream: None,
            retry,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn connect(&mut self, addr: SocketAddr) -> Result<(), NetError> {
        if self.stream.is_some() {
            return Err(NetError::AlreadyConnected);
        }
        let std_stream = self.connect_with_retry(addr)?;
        std_stream.set_nonblocking(true)?;
        let mut stream = mio::net::TcpStream::from_std(std_stream);
        self.poll.registry().register(&mut stream, STREAM, Interest::READABLE)?;
        self.stream = Some(FramedStream::new(stream, addr, STREAM)?);
        info!(?addr, "session connected");
        Ok(())
    }

    fn connect_with_retry(&self, addr: SocketAddr) -> io::Result<std::net::TcpStream> {
        let mut attempts = 0u32;
        loop {
            match std::net::TcpStream::connect(addr) {
                Ok(stream) => return Ok(stream),
                Err(err) if err.kind() == io::ErrorKind::ConnectionRefused => {
                    attempts += 1;
                    if self.retry.max_attempts.is_some_and(|cap| attempts >= cap) {
                        return Err(err);
                    }
                    debug!(?addr, attempts, "connection refused, retrying");
                    thread::sleep(self.retry.delay);
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close(self.poll.registry());
        }
    }

    /// Writes one frame (or enqueues it if the socket is saturated).
    pub fn send_frame<F>(&mut self, serialise: F) -> Result<(), NetError>
    where
        F: FnOnce(&mut Vec<u8>),
    {
        let Some(stream) = self.stream.as_mut() else {
            return Err(NetError::NotConnected);
        };
        if stream.write_or_enqueue_with(self.poll.registry(), serialise) == LinkState::Closed {
            self.disconnect();
            return Err(NetError::Disconnected);
        }
        Ok(())
    }

    /// Polls the socket once and hands every complete inbound frame to
    /// `on_frame`. Returns whether any IO readiness was observed.
    pub fn poll_frames<F>(
        &mut self,
        timeout: Option<Duration>,
        mut on_frame: F,
    ) -> Result<bool, NetError>
    where
        F: for<'a> FnMut(&'a [u8]),
    {
        if self.stream.is_none() {
            return Err(NetError::NotConnected);
        }
        if let Err(err) = self.poll.poll(&mut self.events, timeout) {
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err.into());
        }

        let mut any = false;
        for ev in self.events.iter() {
            any = true;
            let Some(stream) = self.stream.as_mut() else { break };
            if stream.poll_event(self.poll.registry(), ev, &mut on_frame) == LinkState::Closed {
                if let Some(mut stream) = self.stream.take() {
                    stream.close(self.poll.registry());
                }
                return Err(NetError::Disconnected);
            }
        }
        Ok(any)
    }
}
