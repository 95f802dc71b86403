use std::{cmp::Ordering, collections::HashMap, time::Duration};

use conveyor_network::Session;
use conveyor_timing::{Nanos, Repeater};
use conveyor_wire::{ClientFrame, EngineFrame};
use tracing::{debug, info, warn};

use crate::{
    ConnectorError,
    config::ConnectorConfig,
    identity::{IdHasher, Sha256Id, StreamId},
    registry::{StreamRegistry, StreamState},
    schedule::RoundRobin,
    source::{Item, Source},
};

/// How long an idle `run` iteration parks on the socket.
const IDLE_PARK: Duration = Duration::from_millis(1);

/// Outcome of one scheduler step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// A record was framed and written for this stream.
    Sent(StreamId),
    /// Nothing to send right now.
    Idle,
    /// Every source has been removed and acknowledged.
    Done,
}

/// Client side of the at-least-once stream protocol.
///
/// Multiplexes records from any number of local sources into one framed
/// session, in round-robin order. The engine remains the source of truth
/// for per-stream progress: every inbound position event either repositions
/// a source (`reset`) or completes an end-of-stream handshake.
///
/// Expected call order: `connect`, then `add_source` for each feed, then
/// drive with `run` (or `poll_events` + `tick` for manual loops). After a
/// `Disconnected` error, call `connect` again: live streams re-announce
/// themselves and the engine's replies reposition their sources.
pub struct Connector {
    config: ConnectorConfig,
    session: Session,
    registry: StreamRegistry,
    schedule: RoundRobin,
    hasher: Box<dyn IdHasher>,
    /// Engine-reported positions for streams with no local source yet;
    /// applied when the matching `add_source` arrives.
    pending_pors: HashMap<StreamId, u64>,
    added_any: bool,
}

impl Connector {
    pub fn new(config: ConnectorConfig) -> Result<Self, ConnectorError> {
        let session = Session::new(config.retry)?;
        Ok(Self {
            config,
            session,
            registry: StreamRegistry::default(),
            schedule: RoundRobin::default(),
            hasher: Box::new(Sha256Id),
            pending_pors: HashMap::new(),
            added_any: false,
        })
    }

    /// Replaces the id derivation. Only useful for tests and migrations.
    pub fn with_hasher(mut self, hasher: impl IdHasher + 'static) -> Self {
        self.hasher = Box::new(hasher);
        self
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// The id `add_source` would assign to a source with this name.
    pub fn stream_id_for(&self, name: &[u8]) -> StreamId {
        self.hasher.stream_id(name)
    }

    pub fn stream_state(&self, id: StreamId) -> Option<StreamState> {
        self.registry.state(id)
    }

    /// End-of-stream position a `remove_source` is still waiting on, if any.
    pub fn pending_eos(&self, id: StreamId) -> Option<u64> {
        self.registry.pending_eos(id)
    }

    /// Establishes the session and sends the hello announcement. Does not
    /// wait for the engine's reply; it is applied by the event loop, which
    /// lets sources added in the meantime pick up engine positions.
    ///
    /// On a reconnect, every live stream drops back to joining and is
    /// re-announced at its current position.
    pub fn connect(&mut self) -> Result<(), ConnectorError> {
        let addr = self.config.socket_addr()?;
        self.session.connect(addr)?;
        let hello = ClientFrame::Hello {
            version: self.config.version.clone(),
            cookie: self.config.cookie.clone(),
            program: self.config.program.clone(),
            instance: self.config.instance.clone(),
        };
        self.write_frame(&hello)?;
        for id in self.registry.rejoin_all() {
            self.notify(id)?;
        }
        Ok(())
    }

    /// Registers a source and announces its stream to the engine.
    pub fn add_source(&mut self, source: impl Source + 'static) -> Result<StreamId, ConnectorError> {
        let mut source: Box<dyn Source> = Box::new(source);
        let id = self.hasher.stream_id(source.name());
        if self.registry.contains(id) {
            return Err(ConnectorError::DuplicateSource(id));
        }
        self.added_any = true;
        if let Some(por) = self.pending_pors.remove(&id) {
            if por != source.point_of_ref() {
                source.reset(por)?;
            }
        }
        info!(%id, name = %String::from_utf8_lossy(source.name()), "adding source");
        self.registry.add(id, source);
        self.schedule.insert(id);
        self.notify(id)?;
        Ok(id)
    }

    /// Starts an asynchronous close of an open stream: sends end-of-stream
    /// and waits for the matching ack before the source is deleted. A no-op
    /// for streams that are not open.
    pub fn remove_source(&mut self, id: StreamId) -> Result<(), ConnectorError> {
        if !self.registry.is_open(id) {
            debug!(%id, "remove requested for a stream that is not open");
            return Ok(());
        }
        let Some(entry) = self.registry.entry_mut(id) else {
            return Err(ConnectorError::UnknownStream(id));
        };
        let por = entry.source.point_of_ref();
        self.registry.begin_eos(id, por);
        debug!(%id, por, "end of stream");
        self.write_frame(&ClientFrame::Eos { stream_id: id.0 })
    }

    /// Emits one record on an open stream at its current position.
    pub fn send(
        &mut self,
        id: StreamId,
        event_time: u64,
        payload: Vec<u8>,
    ) -> Result<(), ConnectorError> {
        if !self.registry.is_open(id) {
            return Err(ConnectorError::Misuse(format!("stream {id} is not open")));
        }
        let Some(entry) = self.registry.entry_mut(id) else {
            return Err(ConnectorError::UnknownStream(id));
        };
        let frame = ClientFrame::Message {
            stream_id: id.0,
            message_id: entry.source.point_of_ref(),
            event_time,
            key: entry.source.key().to_vec(),
            payload,
        };
        self.write_frame(&frame)
    }

    /// Drains inbound engine frames and applies them to the registry.
    pub fn poll_events(&mut self, timeout: Option<Duration>) -> Result<(), ConnectorError> {
        let mut frames = Vec::new();
        let polled =
            self.session.poll_frames(timeout, |bytes| frames.push(EngineFrame::decode(bytes)));
        // Frames that landed before a disconnect still count; apply them
        // before surfacing the transport error.
        for frame in frames {
            let frame = frame.map_err(|e| ConnectorError::Protocol(e.to_string()))?;
            self.apply(frame)?;
        }
        polled?;
        Ok(())
    }

    /// One round-robin step: pull the next record from the next open stream
    /// and write it as a message.
    pub fn tick(&mut self) -> Result<Tick, ConnectorError> {
        if self.schedule.is_empty() {
            if !self.added_any {
                // Fast loops can get here before the first add_source.
                return Ok(Tick::Idle);
            }
            if !self.registry.any_closed() {
                // Sources were added but their announcements are in flight.
                return Ok(Tick::Idle);
            }
            return Ok(Tick::Done);
        }

        let Some(id) = self.schedule.advance() else {
            return Ok(Tick::Idle);
        };
        if !self.registry.is_open(id) {
            return Ok(Tick::Idle);
        }
        let Some(entry) = self.registry.entry_mut(id) else {
            return Ok(Tick::Idle);
        };
        match entry.source.next()? {
            Item::Record { payload, por } => {
                let key = entry.source.key().to_vec();
                let frame = ClientFrame::Message {
                    stream_id: id.0,
                    message_id: por,
                    event_time: 0,
                    key,
                    payload,
                };
                self.write_frame(&frame)?;
                Ok(Tick::Sent(id))
            }
            Item::Yield { .. } => Ok(Tick::Idle),
            Item::End => {
                debug!(%id, "source exhausted");
                self.remove_source(id)?;
                Ok(Tick::Idle)
            }
        }
    }

    /// Drives the connector until every source has been removed and its
    /// end-of-stream acknowledged.
    pub fn run(&mut self) -> Result<(), ConnectorError> {
        let mut progress = Repeater::every(Nanos::from_secs(10));
        let mut sent: u64 = 0;
        loop {
            match self.tick()? {
                Tick::Done => {
                    info!(sent, "all streams closed");
                    return Ok(());
                }
                Tick::Sent(_) => {
                    sent += 1;
                    self.poll_events(Some(Duration::ZERO))?;
                }
                Tick::Idle => self.poll_events(Some(IDLE_PARK))?,
            }
            if progress.fired() {
                debug!(sent, streams = self.schedule.len(), "feeding");
            }
        }
    }

    fn apply(&mut self, frame: EngineFrame) -> Result<(), ConnectorError> {
        match frame {
            EngineFrame::Ok { credits } => {
                info!(streams = credits.len(), "session established");
                for (stream_id, por) in credits {
                    self.on_stream_added(StreamId(stream_id), por)?;
                }
                Ok(())
            }
            EngineFrame::Err { reason } => Err(ConnectorError::Protocol(reason)),
            EngineFrame::StreamAdded { stream_id, por } => {
                self.on_stream_added(StreamId(stream_id), por)
            }
            EngineFrame::StreamOpened { stream_id, por } => {
                self.on_stream_opened(StreamId(stream_id), por)
            }
            EngineFrame::StreamClosed { stream_id } => {
                self.on_stream_closed(StreamId(stream_id));
                Ok(())
            }
            EngineFrame::Ack { stream_id, por } => self.on_stream_acked(StreamId(stream_id), por),
        }
    }

    fn on_stream_added(&mut self, id: StreamId, por: u64) -> Result<(), ConnectorError> {
        match self.registry.entry_mut(id) {
            Some(entry) => {
                debug!(%id, por, "stream added");
                if por != entry.source.point_of_ref() {
                    entry.source.reset(por)?;
                }
            }
            None => {
                // The engine tracks state for streams we have not added yet
                // (typically from the hello reply); hold the position for the
                // matching add_source.
                debug!(%id, por, "holding position for a stream not added yet");
                self.pending_pors.insert(id, por);
            }
        }
        Ok(())
    }

    fn on_stream_opened(&mut self, id: StreamId, por: u64) -> Result<(), ConnectorError> {
        if !self.registry.contains(id) {
            return Err(ConnectorError::UnknownStream(id));
        }
        if self.registry.take_joining(id) {
            if let Some(entry) = self.registry.entry_mut(id) {
                if por != entry.source.point_of_ref() {
                    entry.source.reset(por)?;
                }
            }
        }
        self.registry.set_open(id);
        debug!(%id, por, "stream opened");
        Ok(())
    }

    fn on_stream_closed(&mut self, id: StreamId) {
        if self.registry.take_open(id) {
            // The engine closed us; drop back to joining and wait for the
            // next open.
            self.registry.set_joining(id);
            debug!(%id, "stream closed by engine, rejoining");
        } else if self.registry.take_pending_eos(id).is_some() {
            // End-of-stream handshake interrupted before the ack landed.
            self.registry.set_joining(id);
            debug!(%id, "end-of-stream interrupted, rejoining");
        } else if self.registry.has_closed(id) {
            warn!(%id, "close for an already closed stream");
        } else {
            debug!(%id, "close for an inactive stream, ignoring");
        }
    }

    fn on_stream_acked(&mut self, id: StreamId, ack_por: u64) -> Result<(), ConnectorError> {
        if !self.registry.contains(id) {
            if self.registry.has_closed(id) {
                debug!(%id, ack_por, "ack for a closed stream, ignoring");
                return Ok(());
            }
            return Err(ConnectorError::UnknownStream(id));
        }
        let eos_por = self.registry.pending_eos(id);
        let Some(entry) = self.registry.entry_mut(id) else {
            return Err(ConnectorError::UnknownStream(id));
        };
        entry.source.acked(ack_por);

        let mut finalize = false;
        if let Some(eos_por) = eos_por {
            match ack_por.cmp(&eos_por) {
                Ordering::Equal => finalize = true,
                Ordering::Less => {} // keep waiting for the final ack
                Ordering::Greater => {
                    return Err(ConnectorError::AckOverrun { expected: eos_por, got: ack_por });
                }
            }
        } else if entry.ack_seen && ack_por < entry.acked {
            // The engine is replaying: reposition and resend from there.
            warn!(%id, ack_por, prior = entry.acked, "ack went backwards, replaying");
            entry.source.reset(ack_por)?;
        } else if !entry.ack_seen {
            // First ack for a source added before the session settled; the
            // engine's position wins.
            entry.source.reset(ack_por)?;
        }
        entry.acked = ack_por;
        entry.ack_seen = true;

        if finalize {
            debug!(%id, ack_por, "end of stream acknowledged");
            self.finalize(id)?;
        }
        Ok(())
    }

    fn finalize(&mut self, id: StreamId) -> Result<(), ConnectorError> {
        self.registry.finalize(id)?;
        self.schedule.remove(id);
        Ok(())
    }

    fn notify(&mut self, id: StreamId) -> Result<(), ConnectorError> {
        let Some(entry) = self.registry.entry_mut(id) else {
            return Err(ConnectorError::UnknownStream(id));
        };
        let frame = ClientFrame::Notify {
            stream_id: id.0,
            name: entry.source.name().to_vec(),
            por: entry.source.point_of_ref(),
        };
        self.write_frame(&frame)
    }

    fn write_frame(&mut self, frame: &ClientFrame) -> Result<(), ConnectorError> {
        self.session.send_frame(|buf| frame.encode(buf))?;
        Ok(())
    }
}
