//! REQ/REP semantics: request ids, retransmission, envelope routing.

use std::thread;
use std::time::Duration;

use spaceframe::{Context, Message, Protocol, SocketOption, SpaceframeError};

const ID_FLAG: u32 = 0x8000_0000;

fn settle() {
    thread::sleep(Duration::from_millis(80));
}

fn test_ctx() -> Context {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Context::new().unwrap()
}

#[test]
fn request_reply_roundtrip() {
    let ctx = test_ctx();
    let rep = ctx.socket(Protocol::Rep).unwrap();
    rep.bind("inproc://service").unwrap();
    let req = ctx.socket(Protocol::Req).unwrap();
    req.connect("inproc://service").unwrap();

    req.send(Message::from("question")).unwrap();
    let q = rep.recv().unwrap();
    assert_eq!(q.body().as_ref(), b"question");
    assert_eq!(q.header_word_count(), 0, "cooked REP hides the envelope");

    rep.send(Message::from("answer")).unwrap();
    let a = req.recv().unwrap();
    assert_eq!(a.body().as_ref(), b"answer");
    assert_eq!(a.header_word_count(), 0);

    // The cycle restarts cleanly.
    req.send(Message::from("again")).unwrap();
    assert_eq!(rep.recv().unwrap().body().as_ref(), b"again");

    ctx.terminate().unwrap();
}

#[test]
fn state_machine_misuse_is_reported() {
    let ctx = test_ctx();
    let rep = ctx.socket(Protocol::Rep).unwrap();
    rep.bind("inproc://strict").unwrap();
    let req = ctx.socket(Protocol::Req).unwrap();
    req.connect("inproc://strict").unwrap();

    // Reply with nothing pending.
    assert!(matches!(
        rep.send(Message::from("eager")),
        Err(SpaceframeError::BadState(_))
    ));
    // Receive with nothing in flight.
    assert!(matches!(req.recv(), Err(SpaceframeError::BadState(_))));

    ctx.terminate().unwrap();
}

#[test]
fn retransmission_reaches_a_second_peer() {
    let ctx = test_ctx();
    let req = ctx.socket(Protocol::Req).unwrap();
    req.set_option(SocketOption::ResendIvl(Duration::from_millis(200)))
        .unwrap();
    req.bind("inproc://workers").unwrap();

    // Raw repliers so the test can watch the request ids on the wire.
    let r1 = ctx.socket(Protocol::XRep).unwrap();
    r1.connect("inproc://workers").unwrap();
    settle();
    let r2 = ctx.socket(Protocol::XRep).unwrap();
    r2.connect("inproc://workers").unwrap();
    settle();

    req.send(Message::from("q")).unwrap();

    // r1 is paused: it never reads. After the resend interval the same
    // request id shows up at r2.
    r2.set_option(SocketOption::RecvTimeout(Some(Duration::from_secs(2))))
        .unwrap();
    let mut at_r2 = r2.recv().unwrap();
    let route = at_r2.pop_header_word().unwrap();
    let id_at_r2 = at_r2.pop_header_word().unwrap();
    assert_ne!(id_at_r2 & ID_FLAG, 0, "request id carries the flag bit");
    assert_eq!(at_r2.body().as_ref(), b"q");

    // r2 answers; the requester accepts it.
    let mut reply = Message::from("from-r2");
    reply.push_header_word(id_at_r2);
    reply.push_header_word(route);
    r2.send(reply).unwrap();
    assert_eq!(req.recv().unwrap().body().as_ref(), b"from-r2");

    // The paused peer holds the original transmission with the same id.
    r1.set_option(SocketOption::RecvTimeout(Some(Duration::from_secs(2))))
        .unwrap();
    let mut at_r1 = r1.recv().unwrap();
    let _route = at_r1.pop_header_word().unwrap();
    let id_at_r1 = at_r1.pop_header_word().unwrap();
    assert_eq!(id_at_r1, id_at_r2);

    ctx.terminate().unwrap();
}

#[test]
fn losing_the_inflight_pipe_resends_immediately() {
    let ctx = test_ctx();
    let req = ctx.socket(Protocol::Req).unwrap();
    // A huge resend interval: only the pipe-loss path can explain a
    // prompt retransmission.
    req.set_option(SocketOption::ResendIvl(Duration::from_secs(60)))
        .unwrap();
    req.bind("inproc://flaky").unwrap();

    let r1 = ctx.socket(Protocol::Rep).unwrap();
    r1.connect("inproc://flaky").unwrap();
    settle();
    let r2 = ctx.socket(Protocol::Rep).unwrap();
    r2.connect("inproc://flaky").unwrap();
    settle();

    req.send(Message::from("job")).unwrap();

    // r1 takes the request and dies without answering.
    assert_eq!(r1.recv().unwrap().body().as_ref(), b"job");
    r1.close().unwrap();

    // The retransmission lands on the surviving peer well before the
    // interval could fire.
    r2.set_option(SocketOption::RecvTimeout(Some(Duration::from_secs(2))))
        .unwrap();
    assert_eq!(r2.recv().unwrap().body().as_ref(), b"job");
    r2.send(Message::from("done")).unwrap();
    assert_eq!(req.recv().unwrap().body().as_ref(), b"done");

    ctx.terminate().unwrap();
}

#[test]
fn a_new_request_abandons_the_old_reply() {
    let ctx = test_ctx();
    let rep = ctx.socket(Protocol::Rep).unwrap();
    rep.bind("inproc://latest").unwrap();
    let req = ctx.socket(Protocol::Req).unwrap();
    req.connect("inproc://latest").unwrap();

    req.send(Message::from("first")).unwrap();
    assert_eq!(rep.recv().unwrap().body().as_ref(), b"first");

    // Requester moves on before the reply arrives.
    req.send(Message::from("second")).unwrap();
    rep.send(Message::from("stale-answer")).unwrap();

    assert_eq!(rep.recv().unwrap().body().as_ref(), b"second");
    rep.send(Message::from("fresh-answer")).unwrap();

    // Only the reply to the live request is delivered.
    assert_eq!(req.recv().unwrap().body().as_ref(), b"fresh-answer");

    ctx.terminate().unwrap();
}

#[test]
fn raw_reqrep_exposes_the_envelope() {
    let ctx = test_ctx();
    let xrep = ctx.socket(Protocol::XRep).unwrap();
    xrep.bind("inproc://raw").unwrap();
    let xreq = ctx.socket(Protocol::XReq).unwrap();
    xreq.connect("inproc://raw").unwrap();

    // Raw requesters manage their own id word.
    let mut request = Message::from("ping");
    request.push_header_word(0x8000_0042);
    xreq.send(request).unwrap();

    let mut seen = xrep.recv().unwrap();
    assert_eq!(seen.header_word_count(), 2);
    let route = seen.pop_header_word().unwrap();
    assert_eq!(seen.pop_header_word(), Some(0x8000_0042));

    let mut reply = Message::from("pong");
    reply.push_header_word(0x8000_0042);
    reply.push_header_word(route);
    xrep.send(reply).unwrap();

    let mut back = xreq.recv().unwrap();
    assert_eq!(back.pop_header_word(), Some(0x8000_0042));
    assert_eq!(back.body().as_ref(), b"pong");

    ctx.terminate().unwrap();
}
