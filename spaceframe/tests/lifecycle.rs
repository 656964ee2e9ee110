//! Socket and context lifecycle: close, linger, timeouts, options, poll.

use std::thread;
use std::time::{Duration, Instant};

use spaceframe::{poll, Context, Message, PollItem, Protocol, SocketOption, SpaceframeError};

fn settle() {
    thread::sleep(Duration::from_millis(80));
}

fn test_ctx() -> Context {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Context::new().unwrap()
}

/// Fill the push side until its single pipe releases.
fn fill(push: &spaceframe::Socket) -> usize {
    let mut sent = 0;
    loop {
        match push.try_send(Message::from_body(vec![sent as u8; 16])) {
            Ok(()) => sent += 1,
            Err(SpaceframeError::Again) => return sent,
            Err(e) => panic!("unexpected send error: {e}"),
        }
    }
}

#[test]
fn closed_socket_rejects_everything() {
    let ctx = test_ctx();
    let socket = ctx.socket(Protocol::Pair).unwrap();
    socket.bind("inproc://closing").unwrap();
    socket.close().unwrap();

    assert!(matches!(
        socket.send(Message::from("x")),
        Err(SpaceframeError::BadHandle)
    ));
    assert!(matches!(socket.recv(), Err(SpaceframeError::BadHandle)));
    assert!(matches!(
        socket.bind("inproc://other"),
        Err(SpaceframeError::BadHandle)
    ));
    assert!(matches!(socket.close(), Err(SpaceframeError::BadHandle)));

    // The name is free again.
    let fresh = ctx.socket(Protocol::Pair).unwrap();
    fresh.bind("inproc://closing").unwrap();

    ctx.terminate().unwrap();
}

#[test]
fn linger_delivers_buffered_messages() {
    let ctx = test_ctx();
    let pull = ctx.socket(Protocol::Pull).unwrap();
    pull.set_option(SocketOption::RecvBuffer(64)).unwrap();
    pull.bind("inproc://drain").unwrap();
    let push = ctx.socket(Protocol::Push).unwrap();
    push.connect("inproc://drain").unwrap();
    settle();

    let sent = fill(&push);
    assert!(sent >= 2, "expected the small buffer to fill, sent {sent}");

    let closer = thread::spawn(move || {
        let started = Instant::now();
        push.close().unwrap();
        started.elapsed()
    });

    // A slow consumer still gets every buffered message.
    thread::sleep(Duration::from_millis(100));
    for _ in 0..sent {
        thread::sleep(Duration::from_millis(10));
        pull.recv().unwrap();
    }

    let close_time = closer.join().unwrap();
    assert!(
        close_time < Duration::from_millis(900),
        "close should return once drained, took {close_time:?}"
    );

    ctx.terminate().unwrap();
}

#[test]
fn linger_deadline_bounds_close() {
    let ctx = test_ctx();
    let pull = ctx.socket(Protocol::Pull).unwrap();
    pull.set_option(SocketOption::RecvBuffer(64)).unwrap();
    pull.bind("inproc://stuck").unwrap();
    let push = ctx.socket(Protocol::Push).unwrap();
    push.set_option(SocketOption::Linger(Some(Duration::from_millis(300))))
        .unwrap();
    push.connect("inproc://stuck").unwrap();
    settle();

    fill(&push);

    // Nobody ever reads; close must give up at the linger deadline.
    let started = Instant::now();
    push.close().unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(250), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(900), "overstayed: {elapsed:?}");

    assert!(matches!(
        push.send(Message::from("late")),
        Err(SpaceframeError::BadHandle)
    ));

    ctx.terminate().unwrap();
}

#[test]
fn zero_linger_closes_immediately() {
    let ctx = test_ctx();
    let pull = ctx.socket(Protocol::Pull).unwrap();
    pull.set_option(SocketOption::RecvBuffer(64)).unwrap();
    pull.bind("inproc://impatient").unwrap();
    let push = ctx.socket(Protocol::Push).unwrap();
    push.set_option(SocketOption::Linger(None)).unwrap();
    push.connect("inproc://impatient").unwrap();
    settle();

    fill(&push);

    let started = Instant::now();
    push.close().unwrap();
    assert!(started.elapsed() < Duration::from_millis(200));

    ctx.terminate().unwrap();
}

#[test]
fn blocking_deadlines_and_nonblocking_probes() {
    let ctx = test_ctx();
    let lonely = ctx.socket(Protocol::Pair).unwrap();
    lonely.bind("inproc://deadline").unwrap();

    lonely
        .set_option(SocketOption::RecvTimeout(Some(Duration::from_millis(100))))
        .unwrap();
    let started = Instant::now();
    assert!(matches!(lonely.recv(), Err(SpaceframeError::TimedOut)));
    assert!(started.elapsed() >= Duration::from_millis(90));

    assert!(matches!(lonely.try_recv(), Err(SpaceframeError::Again)));
    assert!(matches!(
        lonely.try_send(Message::from("x")),
        Err(SpaceframeError::Again)
    ));

    lonely
        .set_option(SocketOption::SendTimeout(Some(Duration::from_millis(100))))
        .unwrap();
    assert!(matches!(
        lonely.send(Message::from("x")),
        Err(SpaceframeError::TimedOut)
    ));

    ctx.terminate().unwrap();
}

#[test]
fn option_change_wakes_a_blocked_caller() {
    let ctx = test_ctx();
    let socket = ctx.socket(Protocol::Pair).unwrap();
    socket.bind("inproc://freshness").unwrap();

    let blocked = {
        let socket = socket.clone();
        thread::spawn(move || socket.recv())
    };
    thread::sleep(Duration::from_millis(100));

    // The blocked receiver picks the new deadline up mid-wait.
    socket
        .set_option(SocketOption::RecvTimeout(Some(Duration::from_millis(200))))
        .unwrap();

    let result = blocked.join().unwrap();
    assert!(matches!(result, Err(SpaceframeError::TimedOut)));

    ctx.terminate().unwrap();
}

#[test]
fn close_interrupts_blocked_callers() {
    let ctx = test_ctx();
    let socket = ctx.socket(Protocol::Pair).unwrap();
    socket.bind("inproc://interrupted").unwrap();

    let blocked = {
        let socket = socket.clone();
        thread::spawn(move || socket.recv())
    };
    thread::sleep(Duration::from_millis(100));
    socket.close().unwrap();

    let result = blocked.join().unwrap();
    assert!(matches!(
        result,
        Err(SpaceframeError::Interrupted | SpaceframeError::BadHandle)
    ));

    ctx.terminate().unwrap();
}

#[test]
fn message_size_limits() {
    let ctx = test_ctx();

    // Sender-side limit reports synchronously.
    let push = ctx.socket(Protocol::Push).unwrap();
    push.set_option(SocketOption::MaxMsgSize(Some(10))).unwrap();
    push.bind("inproc://sized").unwrap();
    assert!(matches!(
        push.send(Message::from_body(vec![0u8; 20])),
        Err(SpaceframeError::MessageTooLarge { size: 20, max: 10 })
    ));

    // Receiver-side limit drops at the pipe boundary.
    let pull = ctx.socket(Protocol::Pull).unwrap();
    pull.set_option(SocketOption::MaxMsgSize(Some(8))).unwrap();
    pull.set_option(SocketOption::RecvTimeout(Some(Duration::from_millis(500))))
        .unwrap();
    pull.connect("inproc://sized").unwrap();
    settle();

    push.send(Message::from_body(vec![1u8; 9])).unwrap();
    push.send(Message::from_body(vec![2u8; 4])).unwrap();
    let got = pull.recv().unwrap();
    assert_eq!(got.body().as_ref(), &[2u8; 4][..]);
    assert!(matches!(pull.recv(), Err(SpaceframeError::TimedOut)));

    ctx.terminate().unwrap();
}

#[test]
fn endpoint_shutdown_detaches_its_pipes() {
    let ctx = test_ctx();
    let a = ctx.socket(Protocol::Pair).unwrap();
    a.bind("inproc://detach").unwrap();
    let b = ctx.socket(Protocol::Pair).unwrap();
    let eid = b.connect("inproc://detach").unwrap();

    b.send(Message::from("alive")).unwrap();
    assert_eq!(a.recv().unwrap().body().as_ref(), b"alive");

    b.shutdown(eid).unwrap();
    settle();
    assert!(matches!(
        b.try_send(Message::from("gone")),
        Err(SpaceframeError::Again)
    ));

    // The PAIR slot is free for a new peer.
    let c = ctx.socket(Protocol::Pair).unwrap();
    c.connect("inproc://detach").unwrap();
    c.send(Message::from("replacement")).unwrap();
    assert_eq!(a.recv().unwrap().body().as_ref(), b"replacement");

    // Unknown endpoint ids are rejected.
    assert!(b.shutdown(eid + 99).is_err());

    ctx.terminate().unwrap();
}

#[test]
fn bind_conflicts_and_pending_connects() {
    let ctx = test_ctx();
    let first = ctx.socket(Protocol::Pair).unwrap();
    first.bind("inproc://taken").unwrap();
    let second = ctx.socket(Protocol::Pair).unwrap();
    assert!(matches!(
        second.bind("inproc://taken"),
        Err(SpaceframeError::AddrInUse(_))
    ));

    // Connect-before-bind parks and completes on a later bind.
    let early = ctx.socket(Protocol::Pair).unwrap();
    early.connect("inproc://eventually").unwrap();
    let late = ctx.socket(Protocol::Pair).unwrap();
    late.bind("inproc://eventually").unwrap();

    early.send(Message::from("waited")).unwrap();
    assert_eq!(late.recv().unwrap().body().as_ref(), b"waited");

    ctx.terminate().unwrap();
}

#[test]
fn unknown_transports_and_addresses_fail() {
    let ctx = test_ctx();
    let socket = ctx.socket(Protocol::Pair).unwrap();

    assert!(matches!(
        socket.bind("carrier-pigeon://roof"),
        Err(SpaceframeError::InvalidAddress(_))
    ));
    assert!(matches!(
        socket.bind("inproc://"),
        Err(SpaceframeError::InvalidAddress(_))
    ));
    // Parses fine, but stream transports live outside this crate.
    assert!(matches!(
        socket.connect("tcp://127.0.0.1:5555"),
        Err(SpaceframeError::InvalidAddress(_))
    ));

    ctx.terminate().unwrap();
}

#[test]
fn poll_reports_readiness() {
    let ctx = test_ctx();
    let pull = ctx.socket(Protocol::Pull).unwrap();
    pull.bind("inproc://polled").unwrap();
    let push = ctx.socket(Protocol::Push).unwrap();
    push.connect("inproc://polled").unwrap();
    settle();

    // Nothing to read yet; the writer is ready straight away.
    let mut items = [PollItem::readable(&pull), PollItem::writable(&push)];
    let ready = poll(&mut items, Some(Duration::from_millis(100))).unwrap();
    assert_eq!(ready, 1);
    assert!(!items[0].can_recv());
    assert!(items[1].can_send());

    // A message flips the reader to ready.
    push.send(Message::from("wake")).unwrap();
    let mut items = [PollItem::readable(&pull)];
    let ready = poll(&mut items, Some(Duration::from_secs(2))).unwrap();
    assert_eq!(ready, 1);
    assert!(items[0].can_recv());
    assert_eq!(pull.recv().unwrap().body().as_ref(), b"wake");

    // And an empty queue times out at zero ready items.
    let mut items = [PollItem::readable(&pull)];
    assert_eq!(poll(&mut items, Some(Duration::from_millis(50))).unwrap(), 0);

    ctx.terminate().unwrap();
}

#[test]
fn terminate_closes_live_sockets() {
    let ctx = test_ctx();
    let a = ctx.socket(Protocol::Pair).unwrap();
    a.bind("inproc://doomed").unwrap();
    let b = ctx.socket(Protocol::Pair).unwrap();
    b.connect("inproc://doomed").unwrap();

    ctx.terminate().unwrap();
    assert_eq!(ctx.socket_count(), 0);

    assert!(matches!(
        ctx.socket(Protocol::Pair),
        Err(SpaceframeError::Terminating)
    ));
    assert!(matches!(
        a.send(Message::from("x")),
        Err(SpaceframeError::BadHandle)
    ));
    assert!(matches!(b.recv(), Err(SpaceframeError::BadHandle)));

    // Termination is idempotent.
    ctx.terminate().unwrap();
}
