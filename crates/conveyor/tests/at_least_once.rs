//! Socket-level tests of the connector against a scripted engine stub.

mod support;

use std::{io::Write, time::Duration};

use conveyor::{
    Connector, ConnectorError, FramedFileSource, IdHasher, POR_NONE, StreamId, StreamState, Tick,
};
use conveyor_wire::{EngineFrame, write_record};
use support::{EngineStub, VecSource};

const POLL: Duration = Duration::from_millis(10);

fn framed_file(payloads: &[&[u8]]) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    for p in payloads {
        write_record(&mut f, p).unwrap();
    }
    f.flush().unwrap();
    f
}

fn drive_until(client: &mut Connector, mut cond: impl FnMut(&Connector) -> bool) {
    for _ in 0..500 {
        if cond(client) {
            return;
        }
        client.poll_events(Some(POLL)).unwrap();
    }
    panic!("engine events never produced the expected state");
}

/// Ticks until `n` records went out, polling while idle.
fn pump_sends(client: &mut Connector, n: usize) -> Vec<StreamId> {
    let mut sent = Vec::new();
    for _ in 0..1000 {
        if sent.len() == n {
            return sent;
        }
        match client.tick().unwrap() {
            Tick::Sent(id) => sent.push(id),
            Tick::Idle => client.poll_events(Some(POLL)).unwrap(),
            Tick::Done => panic!("sources ended while {} sends were pending", n - sent.len()),
        }
    }
    panic!("never reached {n} sends");
}

#[test]
fn framed_file_resumes_after_reconnect() {
    let file = framed_file(&[b"a", b"bb", b"ccc"]);
    let stub = EngineStub::bind();
    let mut client = Connector::new(stub.config()).unwrap();

    client.connect().unwrap();
    let mut engine = stub.accept();
    engine.expect_hello();

    let id = client.add_source(FramedFileSource::open(file.path()).unwrap()).unwrap();
    let (notify_id, notify_por) = engine.expect_notify();
    assert_eq!((notify_id, notify_por), (id.0, 0));
    assert_eq!(client.stream_state(id), Some(StreamState::Joining));

    engine.send(&EngineFrame::Ok { credits: vec![] });
    engine.send(&EngineFrame::StreamOpened { stream_id: id.0, por: POR_NONE });
    drive_until(&mut client, |c| c.stream_state(id) == Some(StreamState::Open));

    pump_sends(&mut client, 3);
    assert_eq!(engine.expect_message(), (id.0, 5, b"a".to_vec()));
    assert_eq!(engine.expect_message(), (id.0, 11, b"bb".to_vec()));
    assert_eq!(engine.expect_message(), (id.0, 18, b"ccc".to_vec()));

    engine.send(&EngineFrame::Ack { stream_id: id.0, por: 18 });
    drop(engine);

    let mut disconnected = false;
    for _ in 0..500 {
        match client.poll_events(Some(POLL)) {
            Ok(()) => {}
            Err(err) if err.is_disconnect() => {
                disconnected = true;
                break;
            }
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    assert!(disconnected, "dropping the engine side must surface a disconnect");
    assert!(!client.is_connected());

    // Reconnect: the stream re-announces itself at its current position.
    client.connect().unwrap();
    let mut engine = stub.accept();
    engine.expect_hello();
    assert_eq!(engine.expect_notify(), (id.0, 18));
    assert_eq!(client.stream_state(id), Some(StreamState::Joining));

    // The engine restarted from a checkpoint past the first record; the
    // source steps over the record at that position and resends the tail.
    engine.send(&EngineFrame::Ok { credits: vec![(id.0, 5)] });
    engine.send(&EngineFrame::StreamOpened { stream_id: id.0, por: 11 });
    drive_until(&mut client, |c| c.stream_state(id) == Some(StreamState::Open));

    pump_sends(&mut client, 1);
    assert_eq!(engine.expect_message(), (id.0, 18, b"ccc".to_vec()));

    // Exhaustion starts the end-of-stream handshake; the matching ack
    // completes the close.
    while client.pending_eos(id).is_none() {
        client.tick().unwrap();
    }
    assert_eq!(client.pending_eos(id), Some(18));
    assert_eq!(engine.expect_eos(), id.0);
    engine.send(&EngineFrame::Ack { stream_id: id.0, por: 18 });
    drive_until(&mut client, |c| c.stream_state(id) == Some(StreamState::Closed));
    assert_eq!(client.tick().unwrap(), Tick::Done);
}

#[test]
fn two_sources_round_robin_until_one_ends() {
    let stub = EngineStub::bind();
    let mut client = Connector::new(stub.config()).unwrap();
    client.connect().unwrap();
    let mut engine = stub.accept();
    engine.expect_hello();

    let a = client
        .add_source(VecSource::new(
            "alpha",
            vec![
                (10, b"a1".to_vec()),
                (20, b"a2".to_vec()),
                (30, b"a3".to_vec()),
                (40, b"a4".to_vec()),
                (50, b"a5".to_vec()),
            ],
        ))
        .unwrap();
    engine.expect_notify();
    let b = client
        .add_source(VecSource::new("bravo", vec![(10, b"b1".to_vec()), (20, b"b2".to_vec())]))
        .unwrap();
    engine.expect_notify();

    engine.send(&EngineFrame::Ok { credits: vec![] });
    engine.send(&EngineFrame::StreamOpened { stream_id: a.0, por: 0 });
    engine.send(&EngineFrame::StreamOpened { stream_id: b.0, por: 0 });
    drive_until(&mut client, |c| {
        c.stream_state(a) == Some(StreamState::Open) && c.stream_state(b) == Some(StreamState::Open)
    });

    // Strict alternation while both streams have records.
    let order = pump_sends(&mut client, 5);
    assert_eq!(order, vec![a, b, a, b, a]);
    for _ in 0..5 {
        engine.expect_message();
    }

    // bravo's next turn exhausts it.
    while client.pending_eos(b).is_none() {
        client.tick().unwrap();
    }
    assert_eq!(client.pending_eos(b), Some(20));
    assert_eq!(engine.expect_eos(), b.0);
    engine.send(&EngineFrame::Ack { stream_id: b.0, por: 20 });
    drive_until(&mut client, |c| c.stream_state(b) == Some(StreamState::Closed));

    // The rotation now serves alpha alone.
    let tail = pump_sends(&mut client, 2);
    assert_eq!(tail, vec![a, a]);
    assert_eq!(engine.expect_message(), (a.0, 40, b"a4".to_vec()));
    assert_eq!(engine.expect_message(), (a.0, 50, b"a5".to_vec()));
}

#[test]
fn smaller_ack_replays_from_that_position() {
    let stub = EngineStub::bind();
    let mut client = Connector::new(stub.config()).unwrap();
    client.connect().unwrap();
    let mut engine = stub.accept();
    engine.expect_hello();

    let source = VecSource::new(
        "replay",
        vec![(10, b"r1".to_vec()), (20, b"r2".to_vec()), (30, b"r3".to_vec())],
    )
    .hold_open();
    let resets = source.reset_log();
    let id = client.add_source(source).unwrap();
    engine.expect_notify();
    engine.send(&EngineFrame::Ok { credits: vec![] });
    engine.send(&EngineFrame::StreamOpened { stream_id: id.0, por: 0 });
    drive_until(&mut client, |c| c.stream_state(id) == Some(StreamState::Open));

    pump_sends(&mut client, 3);
    for expected in [10, 20, 30] {
        assert_eq!(engine.expect_message().1, expected);
    }

    // A first ack at the current position, then a regression: the source is
    // repositioned once and the records past it go out again.
    engine.send(&EngineFrame::Ack { stream_id: id.0, por: 30 });
    engine.send(&EngineFrame::Ack { stream_id: id.0, por: 15 });
    drive_until(&mut client, |_| resets.lock().unwrap().len() == 2);
    assert_eq!(*resets.lock().unwrap(), vec![30, 15]);

    pump_sends(&mut client, 2);
    assert_eq!(engine.expect_message(), (id.0, 20, b"r2".to_vec()));
    assert_eq!(engine.expect_message(), (id.0, 30, b"r3".to_vec()));
}

#[test]
fn engine_close_interrupts_eos_and_restores_joining() {
    let stub = EngineStub::bind();
    let mut client = Connector::new(stub.config()).unwrap();
    client.connect().unwrap();
    let mut engine = stub.accept();
    engine.expect_hello();

    let source =
        VecSource::new("pending", vec![(1, b"x".to_vec()), (2, b"y".to_vec())]).hold_open();
    let id = client.add_source(source).unwrap();
    engine.expect_notify();
    engine.send(&EngineFrame::Ok { credits: vec![] });
    engine.send(&EngineFrame::StreamOpened { stream_id: id.0, por: 0 });
    drive_until(&mut client, |c| c.stream_state(id) == Some(StreamState::Open));

    pump_sends(&mut client, 1);
    assert_eq!(engine.expect_message(), (id.0, 1, b"x".to_vec()));

    client.remove_source(id).unwrap();
    assert_eq!(client.stream_state(id), Some(StreamState::PendingEosAck));
    assert_eq!(client.pending_eos(id), Some(1));
    assert_eq!(engine.expect_eos(), id.0);

    // The engine closes the stream before acknowledging the end-of-stream:
    // the handshake is abandoned, not completed.
    engine.send(&EngineFrame::StreamClosed { stream_id: id.0 });
    drive_until(&mut client, |c| c.stream_state(id) == Some(StreamState::Joining));
    assert_eq!(client.pending_eos(id), None);

    // A later open resumes the stream where it left off.
    engine.send(&EngineFrame::StreamOpened { stream_id: id.0, por: 1 });
    drive_until(&mut client, |c| c.stream_state(id) == Some(StreamState::Open));
    pump_sends(&mut client, 1);
    assert_eq!(engine.expect_message(), (id.0, 2, b"y".to_vec()));
}

#[test]
fn colliding_ids_refuse_the_second_source() {
    struct FixedId(u64);

    impl IdHasher for FixedId {
        fn stream_id(&self, _name: &[u8]) -> StreamId {
            StreamId(self.0)
        }
    }

    let stub = EngineStub::bind();
    let mut client = Connector::new(stub.config()).unwrap().with_hasher(FixedId(0xbeef));
    client.connect().unwrap();
    let mut engine = stub.accept();
    engine.expect_hello();

    client.add_source(VecSource::new("one", vec![(1, b"x".to_vec())])).unwrap();
    engine.expect_notify();

    let err = client.add_source(VecSource::new("two", vec![(1, b"y".to_vec())])).unwrap_err();
    assert!(matches!(err, ConnectorError::DuplicateSource(StreamId(0xbeef))));
}

#[test]
fn events_for_unregistered_streams_are_refused() {
    let stub = EngineStub::bind();
    let mut client = Connector::new(stub.config()).unwrap();
    client.connect().unwrap();
    let mut engine = stub.accept();
    engine.expect_hello();

    engine.send(&EngineFrame::StreamOpened { stream_id: 0x999, por: 0 });
    let mut refused = false;
    for _ in 0..500 {
        match client.poll_events(Some(POLL)) {
            Ok(()) => {}
            Err(ConnectorError::UnknownStream(StreamId(0x999))) => {
                refused = true;
                break;
            }
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    assert!(refused);
}

#[test]
fn ack_past_the_eos_position_is_an_overrun() {
    let stub = EngineStub::bind();
    let mut client = Connector::new(stub.config()).unwrap();
    client.connect().unwrap();
    let mut engine = stub.accept();
    engine.expect_hello();

    let source = VecSource::new("overrun", vec![(5, b"p".to_vec())]).hold_open();
    let id = client.add_source(source).unwrap();
    engine.expect_notify();
    engine.send(&EngineFrame::Ok { credits: vec![] });
    engine.send(&EngineFrame::StreamOpened { stream_id: id.0, por: 0 });
    drive_until(&mut client, |c| c.stream_state(id) == Some(StreamState::Open));

    pump_sends(&mut client, 1);
    client.remove_source(id).unwrap();
    assert_eq!(client.pending_eos(id), Some(5));
    assert_eq!(engine.expect_eos(), id.0);

    engine.send(&EngineFrame::Ack { stream_id: id.0, por: 7 });
    let mut overrun = false;
    for _ in 0..500 {
        match client.poll_events(Some(POLL)) {
            Ok(()) => {}
            Err(ConnectorError::AckOverrun { expected: 5, got: 7 }) => {
                overrun = true;
                break;
            }
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    assert!(overrun);
}

#[test]
fn engine_position_waits_for_the_matching_add_source() {
    let file = framed_file(&[b"a", b"bb", b"ccc"]);
    let stub = EngineStub::bind();
    let mut client = Connector::new(stub.config()).unwrap();
    client.connect().unwrap();
    let mut engine = stub.accept();
    engine.expect_hello();

    // The hello reply carries state for a stream nothing local claims yet.
    let id = client.stream_id_for(b"early");
    engine.send(&EngineFrame::Ok { credits: vec![(id.0, 5)] });
    client.poll_events(Some(Duration::from_secs(1))).unwrap();

    // The late add picks the position up: its announcement is already past
    // the engine's checkpoint.
    let source = FramedFileSource::open(file.path()).unwrap().with_stream_name("early");
    let added = client.add_source(source).unwrap();
    assert_eq!(added, id);
    assert_eq!(engine.expect_notify(), (id.0, 11));
}
